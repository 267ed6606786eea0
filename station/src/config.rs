//! On-disk station configuration: subscriber identity, RF/cipher
//! capabilities, and the demo driver's timing knobs.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::StationError;

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SupportedCiphersConfig {
    pub a5_1: bool,
    pub a5_2: bool,
    pub a5_3: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub imsi: String,
    pub tmsi: Option<u32>,
    pub debug_mode: bool,
    pub access_classes: u16,
    pub always_search_hplmn: bool,
    /// Home-PLMN periodic search timer base, in units of 360s.
    pub t6m_hplmn: u16,
    pub supported_ciphers: SupportedCiphersConfig,
    pub ms_txpwr_max_output_dbm: u8,
    /// ARFCNs the bundled fake L1 harness should report as visible cells,
    /// for driving the engine without real hardware.
    pub fake_arfcns: Vec<u16>,
    /// Seconds advanced per simulated tick.
    pub tick_secs: u32,
    /// How many ticks the demo driver runs before exiting.
    pub max_ticks: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            imsi: "001010000000001".to_string(),
            tmsi: None,
            debug_mode: false,
            access_classes: 0xffff,
            always_search_hplmn: false,
            t6m_hplmn: 30,
            supported_ciphers: SupportedCiphersConfig {
                a5_1: true,
                a5_2: false,
                a5_3: false,
            },
            ms_txpwr_max_output_dbm: 33,
            fake_arfcns: vec![42],
            tick_secs: 1,
            max_ticks: 120,
        }
    }
}

pub fn parse_config<P>(path: P) -> Result<Config, StationError>
where
    P: AsRef<std::path::Path>,
{
    let path_str = path.as_ref().display().to_string();
    match std::fs::read_to_string(&path) {
        Ok(contents) => {
            toml::from_str(&contents).map_err(|source| StationError::ConfigFileParsingError {
                path: path_str,
                source,
            })
        }
        Err(_) => {
            warn!("unable to read config file {path_str}, using default config");
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_default() {
        let config = parse_config("/nonexistent/path/gsm-l3-station.toml").unwrap();
        assert_eq!(config.imsi, Config::default().imsi);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("station.toml");
        std::fs::write(&path, "this is not valid toml =====").unwrap();
        assert!(parse_config(&path).is_err());
    }

    #[test]
    fn valid_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("station.toml");
        std::fs::write(&path, "imsi = \"001014000000099\"\ntick_secs = 5\n").unwrap();
        let config = parse_config(&path).unwrap();
        assert_eq!(config.imsi, "001014000000099");
        assert_eq!(config.tick_secs, 5);
    }
}
