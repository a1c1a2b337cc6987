use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Hierarchy error: {0}")]
    Hierarchy(#[from] oomprio_core::Error),

    #[error("Invalid group path: {0}")]
    InvalidPath(String),

    #[error("Unknown group: {0}")]
    UnknownGroup(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DaemonError>;
