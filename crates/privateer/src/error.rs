use thiserror::Error;

fn quoted(items: &[String]) -> String {
    if items.is_empty() {
        return "(none)".into();
    }
    items
        .iter()
        .map(|x| format!("'{x}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("Invalid configuration '{name}', must be one of {}", quoted(.valid))]
    UnknownMachine { name: String, valid: Vec<String> },

    #[error("Unknown volume '{name}'; valid options: {}", quoted(.valid))]
    UnknownVolume { name: String, valid: Vec<String> },

    #[error("Invalid source '{given}': valid options: {}", quoted(.valid))]
    InvalidSource { given: String, valid: Vec<String> },

    #[error("Invalid {what} '{given}': valid options: {}", quoted(.valid))]
    InvalidChoice {
        what: &'static str,
        given: String,
        valid: Vec<String>,
    },

    #[error("Please provide a value for {what} (valid options: {})", quoted(.valid))]
    MissingChoice {
        what: &'static str,
        valid: Vec<String>,
    },

    #[error("'{volume}' is a local source, so 'source' must be empty")]
    Conflict { volume: String },

    #[error("'{name}' looks unconfigured")]
    NotConfigured { name: String },

    #[error("Configuration is for '{found}', not '{name}'")]
    IdentityMismatch { name: String, found: String },

    #[error("Container '{container}' for '{name}' already running")]
    AlreadyRunning { name: String, container: String },

    #[error("{display} failed (exit code {code}); see {container} logs for details")]
    Execution {
        display: String,
        container: String,
        code: i64,
    },

    #[error("Volume '{0}' already exists, please delete first")]
    VolumeExists(String),

    #[error("Input file '{0}' does not exist")]
    MissingInput(String),

    #[error("container runtime: {0}")]
    Runtime(String),

    #[error("secret store: {0}")]
    SecretStore(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn msg<M: Into<String>>(msg: M) -> Self {
        Self::Other(msg.into())
    }

    pub fn runtime<M: Into<String>>(msg: M) -> Self {
        Self::Runtime(msg.into())
    }

    pub fn secret_store<M: Into<String>>(msg: M) -> Self {
        Self::SecretStore(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
