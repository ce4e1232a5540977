use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, manager::ManagerOptions, retry::RetryPolicy, Result};

/// Credentials and session location for the MTProto client.
#[derive(Clone, Debug)]
pub struct TelegramCredentials {
    pub api_id: i32,
    pub api_hash: String,
    pub session_file: PathBuf,
}

#[derive(Clone, Debug)]
pub struct LogConfig {
    pub log_dir: PathBuf,
    /// `EnvFilter` directive for the console (overridden by `RUST_LOG`).
    pub console_level: String,
    /// `EnvFilter` directive for the main log file.
    pub file_level: String,
    /// Daily files kept before the oldest is removed.
    pub max_files: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            console_level: "info".to_string(),
            file_level: "debug".to_string(),
            max_files: 30,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RateLimitConfig {
    pub calls_per_second: f64,
    pub burst_size: usize,
    /// Slow down by 20% each time the server imposes a flood wait.
    pub adaptive: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            calls_per_second: 1.0,
            burst_size: 5,
            adaptive: true,
        }
    }
}

/// Typed configuration loaded from the environment (and `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    pub telegram: TelegramCredentials,
    pub exports_dir: PathBuf,
    pub logging: LogConfig,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryPolicy,

    // Operation defaults
    pub dialog_fetch_limit: usize,
    pub default_transfer_limit: usize,
    pub media_limit_per_chat: usize,
    pub max_file_size: u64,
    pub concurrent_downloads: usize,
    pub leave_delay: Duration,

    // HTTP
    pub api_host: String,
    pub api_port: u16,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let api_id = env_str("TELEGRAM_API_ID")
            .and_then(non_empty)
            .ok_or_else(|| {
                Error::Config("TELEGRAM_API_ID environment variable is required".to_string())
            })?;
        let api_id = api_id.trim().parse::<i32>().map_err(|_| {
            Error::Config(format!("TELEGRAM_API_ID must be an integer, got {api_id:?}"))
        })?;
        let api_hash = env_str("TELEGRAM_API_HASH")
            .and_then(non_empty)
            .ok_or_else(|| {
                Error::Config("TELEGRAM_API_HASH environment variable is required".to_string())
            })?;
        let session_file = env_path("TELEGRAM_SESSION_FILE")
            .unwrap_or_else(|| PathBuf::from("telegram_group_manager.session"));

        let exports_dir = env_path("EXPORTS_DIR").unwrap_or_else(|| PathBuf::from("exports"));

        let log_defaults = LogConfig::default();
        let logging = LogConfig {
            log_dir: env_path("LOG_DIR").unwrap_or(log_defaults.log_dir),
            console_level: env_str("CONSOLE_LOG_LEVEL")
                .and_then(non_empty)
                .map(|s| s.to_lowercase())
                .unwrap_or(log_defaults.console_level),
            file_level: env_str("FILE_LOG_LEVEL")
                .and_then(non_empty)
                .map(|s| s.to_lowercase())
                .unwrap_or(log_defaults.file_level),
            max_files: env_usize("LOG_MAX_FILES").unwrap_or(log_defaults.max_files),
        };

        let rl_defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            calls_per_second: env_f64("RATE_LIMIT_CALLS_PER_SECOND")
                .filter(|v| *v > 0.0)
                .unwrap_or(rl_defaults.calls_per_second),
            burst_size: env_usize("RATE_LIMIT_BURST_SIZE")
                .filter(|v| *v > 0)
                .unwrap_or(rl_defaults.burst_size),
            adaptive: env_bool("ENABLE_ADAPTIVE_RATE_LIMITING").unwrap_or(rl_defaults.adaptive),
        };

        let retry_defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: env_u32("RETRY_MAX_ATTEMPTS")
                .filter(|v| *v > 0)
                .unwrap_or(retry_defaults.max_attempts),
            base_delay: env_u64("RETRY_BASE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(retry_defaults.base_delay),
            exponential: retry_defaults.exponential,
            max_flood_wait: env_u64("MAX_FLOOD_WAIT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(retry_defaults.max_flood_wait),
        };

        let dialog_fetch_limit = env_usize("DIALOG_FETCH_LIMIT").unwrap_or(500);
        let default_transfer_limit = env_usize("DEFAULT_TRANSFER_LIMIT").unwrap_or(100);
        let media_limit_per_chat = env_usize("DEFAULT_LIMIT_PER_CHAT").unwrap_or(1000);
        let max_file_size = env_u64("MAX_FILE_SIZE").unwrap_or(1024 * 1024 * 1024);
        let concurrent_downloads = env_usize("CONCURRENT_DOWNLOADS").unwrap_or(3).max(1);
        let leave_delay = Duration::from_millis(env_u64("LEAVE_DELAY_MS").unwrap_or(1000));

        let api_host = env_str("API_HOST")
            .and_then(non_empty)
            .unwrap_or_else(|| "0.0.0.0".to_string());
        let api_port = env_str("API_PORT")
            .and_then(|s| s.trim().parse::<u16>().ok())
            .unwrap_or(8000);

        Ok(Self {
            telegram: TelegramCredentials {
                api_id,
                api_hash,
                session_file,
            },
            exports_dir,
            logging,
            rate_limit,
            retry,
            dialog_fetch_limit,
            default_transfer_limit,
            media_limit_per_chat,
            max_file_size,
            concurrent_downloads,
            leave_delay,
            api_host,
            api_port,
        })
    }

    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            dialog_limit: self.dialog_fetch_limit,
            default_transfer_limit: self.default_transfer_limit,
            media_limit_per_chat: self.media_limit_per_chat,
            max_file_size: self.max_file_size,
            concurrent_downloads: self.concurrent_downloads,
            leave_delay: self.leave_delay,
            retry: self.retry.clone(),
            ..ManagerOptions::default()
        }
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };
    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| parse_bool(&s))
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_f64(key: &str) -> Option<f64> {
    env_str(key).and_then(|s| s.trim().parse::<f64>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotenv_parsing_handles_quotes_comments_and_export() {
        let parsed = parse_dotenv(
            "# creds\nTELEGRAM_API_ID=123\nexport TELEGRAM_API_HASH=\"abc def\"\n\nBROKEN\n=novalue\nEXPORTS_DIR='out'\n",
        );
        assert_eq!(
            parsed,
            vec![
                ("TELEGRAM_API_ID".to_string(), "123".to_string()),
                ("TELEGRAM_API_HASH".to_string(), "abc def".to_string()),
                ("EXPORTS_DIR".to_string(), "out".to_string()),
            ]
        );
    }

    #[test]
    fn bool_values() {
        assert!(parse_bool("TRUE"));
        assert!(parse_bool(" on "));
        assert!(parse_bool("1"));
        assert!(!parse_bool("no"));
        assert!(!parse_bool(""));
    }

    #[test]
    fn defaults_match_documented_values() {
        let log = LogConfig::default();
        assert_eq!(log.log_dir, PathBuf::from("logs"));
        assert_eq!(log.console_level, "info");
        assert_eq!(log.file_level, "debug");

        let rl = RateLimitConfig::default();
        assert_eq!(rl.calls_per_second, 1.0);
        assert_eq!(rl.burst_size, 5);
        assert!(rl.adaptive);
    }
}
