pub mod observations;

pub use observations::CorruptRowError;
