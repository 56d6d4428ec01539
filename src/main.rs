fn main() {
    footfall_lib::run()
}
