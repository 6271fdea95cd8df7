//! Runtime configuration — resolved entirely from environment variables
//! (spec §6.4). There is no config file: every knob the harness exposes is
//! read once, at process start, by [`RuntimeConfig::from_env`].

use std::path::PathBuf;

const DEFAULT_BUFFSIZE: usize = 2048;
const MAX_BUFFSIZE: usize = 1 << 19;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSink {
    Stdout,
    Stderr,
    File(PathBuf),
}

impl LogSink {
    fn parse(raw: &str) -> Self {
        match raw {
            "1" => LogSink::Stdout,
            "2" => LogSink::Stderr,
            path => LogSink::File(PathBuf::from(path)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// `LIB_LOG`. `None` means logging is disabled.
    pub log_sink: Option<LogSink>,
    /// `LIB_SEND_BUFFSIZE`.
    pub send_buffsize: usize,
    /// `LIB_RECV_BUFFSIZE`.
    pub recv_buffsize: usize,
    /// `LIB_NO_WAIT` — any value present selects Parallel dispatch.
    pub parallel_dispatch: bool,
    /// `LIB_EXIT_IMMEDIATE` — any value present selects `_exit`-style teardown.
    pub exit_immediate: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}={value:?} is not a valid positive integer")]
    InvalidBuffsize { var: &'static str, value: String },
    #[error("{var}={value} exceeds the maximum of {max}")]
    BuffsizeTooLarge {
        var: &'static str,
        value: usize,
        max: usize,
    },
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_sink: None,
            send_buffsize: DEFAULT_BUFFSIZE,
            recv_buffsize: DEFAULT_BUFFSIZE,
            parallel_dispatch: false,
            exit_immediate: false,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        config.log_sink = std::env::var("LIB_LOG").ok().map(|v| LogSink::parse(&v));

        if let Ok(v) = std::env::var("LIB_SEND_BUFFSIZE") {
            config.send_buffsize = parse_buffsize("LIB_SEND_BUFFSIZE", &v)?;
        }
        if let Ok(v) = std::env::var("LIB_RECV_BUFFSIZE") {
            config.recv_buffsize = parse_buffsize("LIB_RECV_BUFFSIZE", &v)?;
        }

        config.parallel_dispatch = std::env::var_os("LIB_NO_WAIT").is_some();
        config.exit_immediate = std::env::var_os("LIB_EXIT_IMMEDIATE").is_some();

        Ok(config)
    }
}

fn parse_buffsize(var: &'static str, raw: &str) -> Result<usize, ConfigError> {
    let value: usize = raw
        .parse()
        .ok()
        .filter(|&n: &usize| n > 0)
        .ok_or_else(|| ConfigError::InvalidBuffsize {
            var,
            value: raw.to_string(),
        })?;
    if value > MAX_BUFFSIZE {
        return Err(ConfigError::BuffsizeTooLarge {
            var,
            value,
            max: MAX_BUFFSIZE,
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_sink_parses_numeric_codes() {
        assert_eq!(LogSink::parse("1"), LogSink::Stdout);
        assert_eq!(LogSink::parse("2"), LogSink::Stderr);
        assert_eq!(
            LogSink::parse("/tmp/gurthang.log"),
            LogSink::File(PathBuf::from("/tmp/gurthang.log"))
        );
    }

    #[test]
    fn default_config_uses_serial_dispatch() {
        let config = RuntimeConfig::default();
        assert!(!config.parallel_dispatch);
        assert!(!config.exit_immediate);
        assert_eq!(config.send_buffsize, DEFAULT_BUFFSIZE);
    }

    #[test]
    fn parse_buffsize_rejects_zero_and_non_numeric() {
        assert!(parse_buffsize("LIB_SEND_BUFFSIZE", "0").is_err());
        assert!(parse_buffsize("LIB_SEND_BUFFSIZE", "nope").is_err());
        assert!(parse_buffsize("LIB_SEND_BUFFSIZE", "-4").is_err());
    }

    #[test]
    fn parse_buffsize_rejects_above_max() {
        let err = parse_buffsize("LIB_SEND_BUFFSIZE", &(MAX_BUFFSIZE + 1).to_string()).unwrap_err();
        assert!(matches!(err, ConfigError::BuffsizeTooLarge { .. }));
    }

    #[test]
    fn parse_buffsize_accepts_max() {
        assert_eq!(
            parse_buffsize("LIB_SEND_BUFFSIZE", &MAX_BUFFSIZE.to_string()).unwrap(),
            MAX_BUFFSIZE
        );
    }
}
