//! Logger setup and module-gated logging macros.
//!
//! Modules that log on every frame or flush define a flag and use the macros
//! below, so a noisy module can be silenced without touching `RUST_LOG`:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{log_debug, log_info};
//!
//! log_info!("session started");
//! ```

/// Initialises `env_logger` from `RUST_LOG`, falling back to `default_level`
/// when the variable is unset.
pub fn init_logging(default_level: log::LevelFilter) {
    let env = env_logger::Env::default().default_filter_or(default_level.as_str());
    // A second init (tests, embedding) keeps the first logger.
    let _ = env_logger::Builder::from_env(env).try_init();
}


/// Info log gated by the calling module's `ENABLE_LOGS` const.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Warn log gated by the calling module's `ENABLE_LOGS` const.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Error log gated by the calling module's `ENABLE_LOGS` const.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}

/// Debug log gated by the calling module's `ENABLE_LOGS` const. Used for
/// per-frame output.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}
