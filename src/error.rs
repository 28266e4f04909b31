use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChassisError>;

#[derive(Debug, Error)]
pub enum ChassisError {
    #[error("Configuration is invalid: {message}")]
    ConfigInvalid { message: String },

    #[error("Redirected configuration carries a further redirect: {target}")]
    RedirectChain { target: String },

    #[error("Unknown charm scheme: {scheme}")]
    UnknownScheme { scheme: u8 },

    #[error("Log file could not be opened: {path}: {source}")]
    LogOpen {
        path: String,
        source: std::io::Error,
    },

    #[error("Network initialization failed: {0}")]
    NetworkInit(String),

    #[error("Allocation failed while growing {what}")]
    Allocation { what: &'static str },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChassisError {
    pub fn config_invalid(msg: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            message: msg.into(),
        }
    }
}
