//! Mutator configuration, resolved from environment variables (spec §6.4).
//! Mirrors `gurthang_runtime::config::RuntimeConfig`'s env-only resolution
//! style, with its own `MUT_*` variable set.

use gurthang_runtime::config::LogSink;

const DEFAULT_FUZZ_MIN: u32 = 512;
const DEFAULT_FUZZ_MAX: u32 = 32768;

#[derive(Debug, Clone)]
pub struct MutatorConfig {
    /// `MUT_LOG`.
    pub log_sink: Option<LogSink>,
    /// `MUT_DEBUG` — requires `log_sink` to be set; otherwise ignored with a
    /// warning (there is nowhere else to log the warning to).
    pub debug: bool,
    /// `MUT_FUZZ_MIN`.
    pub fuzz_min: u32,
    /// `MUT_FUZZ_MAX`.
    pub fuzz_max: u32,
    /// `MUT_TRIM_MAX`. `None` means uncapped (`-1`).
    pub trim_max: Option<u32>,
    /// `MUT_DICT` — comma-separated dictionary file paths.
    pub dict_paths: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0}={1:?} is not a valid u32")]
    InvalidU32(&'static str, String),
    #[error("MUT_FUZZ_MIN ({0}) must be <= MUT_FUZZ_MAX ({1})")]
    FuzzRangeInverted(u32, u32),
    #[error("MUT_TRIM_MAX={0:?} is not a valid trim step count (expected a non-negative integer or -1)")]
    InvalidTrimMax(String),
}

impl Default for MutatorConfig {
    fn default() -> Self {
        Self {
            log_sink: None,
            debug: false,
            fuzz_min: DEFAULT_FUZZ_MIN,
            fuzz_max: DEFAULT_FUZZ_MAX,
            trim_max: None,
            dict_paths: Vec::new(),
        }
    }
}

impl MutatorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        config.log_sink = std::env::var("MUT_LOG").ok().map(|v| parse_log_sink(&v));

        config.debug = std::env::var_os("MUT_DEBUG").is_some();
        if config.debug && config.log_sink.is_none() {
            gurthang_runtime::logging::warn_debug_without_sink();
            config.debug = false;
        }

        if let Ok(v) = std::env::var("MUT_FUZZ_MIN") {
            config.fuzz_min = parse_u32("MUT_FUZZ_MIN", &v)?;
        }
        if let Ok(v) = std::env::var("MUT_FUZZ_MAX") {
            config.fuzz_max = parse_u32("MUT_FUZZ_MAX", &v)?;
        }
        if config.fuzz_min > config.fuzz_max {
            return Err(ConfigError::FuzzRangeInverted(config.fuzz_min, config.fuzz_max));
        }

        if let Ok(v) = std::env::var("MUT_TRIM_MAX") {
            config.trim_max = parse_trim_max(&v)?;
        }

        if let Ok(v) = std::env::var("MUT_DICT") {
            config.dict_paths = v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }

        Ok(config)
    }
}

fn parse_log_sink(raw: &str) -> LogSink {
    match raw {
        "1" => LogSink::Stdout,
        "2" => LogSink::Stderr,
        path => LogSink::File(std::path::PathBuf::from(path)),
    }
}

fn parse_u32(var: &'static str, raw: &str) -> Result<u32, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidU32(var, raw.to_string()))
}

fn parse_trim_max(raw: &str) -> Result<Option<u32>, ConfigError> {
    if raw == "-1" {
        return Ok(None);
    }
    raw.parse()
        .map(Some)
        .map_err(|_| ConfigError::InvalidTrimMax(raw.to_string()))
}
