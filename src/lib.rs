pub mod analytics;
pub mod cli;
pub mod db;
pub mod detection;
pub mod replay;
pub mod sampling;
pub mod settings;
pub mod tracking;
pub mod utils;

use clap::Parser;
use log::error;

use cli::Cli;

/// Binary entry point: parses arguments, runs the command on a Tokio
/// runtime, and exits non-zero on failure.
pub fn run() {
    utils::logging::init_logging(log::LevelFilter::Info);

    let cli = Cli::parse();
    log::debug!("footfall starting with data dir {}", cli.data_dir.display());

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("failed to start async runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(cli::execute(cli)) {
        error!("{err:#}");
        std::process::exit(1);
    }
}
