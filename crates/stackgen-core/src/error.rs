use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    // ── Build options ──
    #[error("failed to read build options from {path}")]
    OptionsRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse build options at {path}")]
    OptionsParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to parse build options at {path}")]
    OptionsParseJson {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid service name {name:?}: {reason}")]
    InvalidServiceName { name: String, reason: &'static str },
}
