use std::fmt;

#[derive(Debug)]
pub enum EngineError {
    /// CSV structural error at the ingest boundary.
    Csv(String),
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (out-of-range threshold, etc.).
    ConfigValidation(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Csv(msg) => write!(f, "csv error: {msg}"),
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}
