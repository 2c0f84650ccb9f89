//! Ledger configuration.
//!
//! `~/.surety/config.toml` is optional, as is every key inside it. Missing
//! values fall back to the [`LedgerParams`] defaults. Money amounts are decimal
//! strings in whole units so they survive TOML's 64-bit integers.
//!
//! Only fees and the oracle index space can be set. The purchase cap, payout
//! multiplier, oracle quorum and bootstrap threshold are fixed, and a file that
//! tries to set them is rejected as an unknown section.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use surety_types::{AmountParseError, LedgerParams, ParamsError, Wei};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config at {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config at {}: {source}", .path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: SettingError,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. }
            | ConfigError::Parse { path, .. }
            | ConfigError::Invalid { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingError {
    #[error("`{key}`: {source}")]
    Amount {
        key: &'static str,
        #[source]
        source: AmountParseError,
    },
    #[error(transparent)]
    Params(#[from] ParamsError),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    fees: Option<RawFees>,
    oracles: Option<RawOracles>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFees {
    airline_funding: Option<String>,
    oracle_registration: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOracles {
    index_space: Option<u16>,
}

fn amount(key: &'static str, raw: Option<&str>, default: Wei) -> Result<Wei, SettingError> {
    match raw {
        Some(raw) => Wei::parse_units(raw).map_err(|source| SettingError::Amount { key, source }),
        None => Ok(default),
    }
}

impl RawConfig {
    fn resolve(self) -> Result<LedgerParams, SettingError> {
        let fees = self.fees.unwrap_or_default();
        let oracles = self.oracles.unwrap_or_default();

        let params = LedgerParams::new(
            amount(
                "fees.airline_funding",
                fees.airline_funding.as_deref(),
                LedgerParams::DEFAULT_FUNDING_FEE,
            )?,
            amount(
                "fees.oracle_registration",
                fees.oracle_registration.as_deref(),
                LedgerParams::DEFAULT_REGISTRATION_FEE,
            )?,
            oracles
                .index_space
                .unwrap_or(LedgerParams::DEFAULT_INDEX_SPACE),
        )?;
        Ok(params)
    }
}

/// Parses configuration text. `path` is only used for error reporting.
pub fn parse(content: &str, path: &Path) -> Result<LedgerParams, ConfigError> {
    let raw: RawConfig = toml::from_str(content).map_err(|source| {
        tracing::warn!("Failed to parse config at {}: {source}", path.display());
        ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        }
    })?;
    raw.resolve().map_err(|source| {
        tracing::warn!("Invalid config at {}: {source}", path.display());
        ConfigError::Invalid {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Loads parameters from `path`; a missing file yields the defaults.
pub fn load(path: &Path) -> Result<LedgerParams, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(LedgerParams::default());
        }
        Err(source) => {
            tracing::warn!("Failed to read config at {}: {source}", path.display());
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let params = parse(&content, path)?;
    tracing::debug!(path = %path.display(), ?params, "Config loaded");
    Ok(params)
}

/// Loads `~/.surety/config.toml`, or the defaults when there is no home directory.
pub fn load_default() -> Result<LedgerParams, ConfigError> {
    match config_path() {
        Some(path) => load(&path),
        None => Ok(LedgerParams::default()),
    }
}

#[must_use]
pub fn surety_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".surety"))
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    surety_dir().map(|dir| dir.join("config.toml"))
}
