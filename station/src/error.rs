//! Errors the station binary's own layer (config, CLI, driver loop) can
//! raise, on top of whatever `gsm-l3` itself returns.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StationError {
    #[error("failed to read config file {path}: {source}")]
    ConfigFileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ConfigFileParsingError {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("core engine error: {0}")]
    Core(#[from] gsm_l3::CoreError),
}
