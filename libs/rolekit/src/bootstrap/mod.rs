//! Host bootstrap helpers: launch flags and logging.

pub mod cli;
pub mod logging;

pub use cli::{LaunchArgs, LaunchFlags, load_config};
pub use logging::{LogFormat, LoggingConfig, init_logging};
