use std::fmt;

#[derive(Debug)]
pub enum CliError {
    Config(String),
    Io(String),
    Network(String),
    General(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
            Self::Network(msg) => write!(f, "Network error: {msg}"),
            Self::General(msg) => write!(f, "Error: {msg}"),
        }
    }
}

impl std::error::Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<walletgate_core::backend::BackendError> for CliError {
    fn from(error: walletgate_core::backend::BackendError) -> Self {
        Self::Network(error.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(error: serde_json::Error) -> Self {
        Self::General(error.to_string())
    }
}

pub type CliResult<T> = Result<T, CliError>;

pub fn print_success(message: &str) {
    println!("[SUCCESS] {message}");
}

pub fn print_error(message: &str) {
    eprintln!("[ERROR] {message}");
}

pub fn print_info(message: &str) {
    println!("[INFO] {message}");
}

/// Loads and validates a configuration file.
pub fn load_config(file: &str) -> CliResult<walletgate_core::config::AppConfig> {
    if !std::path::Path::new(file).exists() {
        return Err(CliError::Config(format!("File not found: {file}")));
    }
    let config = walletgate_core::config::AppConfig::from_file(file)
        .map_err(|e| CliError::Config(e.to_string()))?;
    config.validate().map_err(CliError::Config)?;
    Ok(config)
}
