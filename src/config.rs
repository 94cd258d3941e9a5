//! Server configuration.
//!
//! Settings come from three layers, later ones winning: built-in defaults,
//! `CIDER_*` environment variables, and command-line arguments.
//!
//! | Setting        | Env var                | Argument             | Default     |
//! |----------------|------------------------|----------------------|-------------|
//! | host           | `CIDER_ADDRESS`        | `-h`, `--host`       | `127.0.0.1` |
//! | port           | `CIDER_ADDRESS`        | `-p`, `--port`       | `6379`      |
//! | sweep interval | `CIDER_SWEEP_INTERVAL` | `--sweep-interval`   | `1` s       |
//! | stats interval | `CIDER_STATS_INTERVAL` | `--stats-interval`   | `60` s      |
//!
//! An interval of `0` disables the corresponding task.

use crate::{DEFAULT_HOST, DEFAULT_PORT};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 1;
pub const DEFAULT_STATS_INTERVAL_SECS: u64 = 60;

/// Errors from command-line parsing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("invalid value '{value}' for {flag}")]
    InvalidValue { flag: String, value: String },

    #[error("unknown argument: {0}")]
    UnknownArgument(String),
}

/// What the binary was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Serve(Config),
    Help,
    Version,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Seconds between expiry sweeps
    pub sweep_interval_secs: u64,
    /// Seconds between stats reports
    pub stats_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            stats_interval_secs: DEFAULT_STATS_INTERVAL_SECS,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var("CIDER_ADDRESS").ok().as_deref(),
            std::env::var("CIDER_SWEEP_INTERVAL").ok().as_deref(),
            std::env::var("CIDER_STATS_INTERVAL").ok().as_deref(),
        )
    }

    /// Unparsable values fall back to the defaults.
    fn from_vars(
        address: Option<&str>,
        sweep_interval: Option<&str>,
        stats_interval: Option<&str>,
    ) -> Self {
        let defaults = Self::default();
        let (host, port) = address
            .and_then(split_address)
            .unwrap_or((defaults.host, defaults.port));

        Self {
            host,
            port,
            sweep_interval_secs: sweep_interval
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.sweep_interval_secs),
            stats_interval_secs: stats_interval
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.stats_interval_secs),
        }
    }

    /// Applies command-line arguments (without the program name) on top of
    /// this configuration.
    pub fn apply_args<I, S>(mut self, args: I) -> Result<Invocation, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = args.into_iter().map(Into::<String>::into);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--host" | "-h" => {
                    self.host = args.next().ok_or(ConfigError::MissingValue(arg))?;
                }
                "--port" | "-p" => {
                    self.port = parse_value(&arg, args.next())?;
                }
                "--sweep-interval" => {
                    self.sweep_interval_secs = parse_value(&arg, args.next())?;
                }
                "--stats-interval" => {
                    self.stats_interval_secs = parse_value(&arg, args.next())?;
                }
                "--help" => return Ok(Invocation::Help),
                "--version" | "-v" => return Ok(Invocation::Version),
                _ => return Err(ConfigError::UnknownArgument(arg)),
            }
        }

        Ok(Invocation::Serve(self))
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Interval of the expiry sweep, or `None` when disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        interval(self.sweep_interval_secs)
    }

    /// Interval of the stats reporter, or `None` when disabled.
    pub fn stats_interval(&self) -> Option<Duration> {
        interval(self.stats_interval_secs)
    }
}

fn interval(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Splits `host:port`; the port is taken after the last colon.
fn split_address(address: &str) -> Option<(String, u16)> {
    let (host, port) = address.trim().rsplit_once(':')?;
    let port = port.parse().ok()?;
    (!host.is_empty()).then(|| (host.to_string(), port))
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<String>) -> Result<T, ConfigError> {
    let value = value.ok_or_else(|| ConfigError::MissingValue(flag.to_string()))?;
    value.parse().map_err(|_| ConfigError::InvalidValue {
        flag: flag.to_string(),
        value,
    })
}
