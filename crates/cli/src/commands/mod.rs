pub mod backends;
pub mod config;
pub mod utils;

pub use backends::{handle_backend_command, BackendCommands};
pub use config::{handle_config_command, ConfigCommands};
