//! Configuration — CLI flags, environment variables, config file.

use clap::Parser;
use std::fs;
use std::path::Path;

use crate::clock::DayZone;
use crate::daily::DEFAULT_KEEP_DAYS;

/// Proxystat — per-proxy traffic statistics for TCP tunnels
#[derive(Parser, Debug)]
#[command(name = "proxystat", version, about)]
pub struct Cli {
    /// Config file path
    #[arg(long, default_value = "proxystat.conf")]
    pub config: String,

    /// Proxy definitions file (TOML, [[proxy]] blocks)
    #[arg(long)]
    pub proxies: Option<String>,

    /// Default bind address for proxies without one
    #[arg(long)]
    pub listen_host: Option<String>,

    /// Admin API bind address
    #[arg(long)]
    pub admin_host: Option<String>,

    /// Admin API port
    #[arg(long)]
    pub admin_port: Option<u16>,

    /// Disable the admin API
    #[arg(long)]
    pub no_admin: bool,

    /// Number of daily buckets kept per proxy
    #[arg(long)]
    pub keep_days: Option<usize>,

    /// Calendar for day buckets
    #[arg(long, value_enum)]
    pub day_zone: Option<DayZone>,

    /// Log level
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_host: String,
    pub admin_host: String,
    pub admin_port: Option<u16>,
    pub proxies_file: Option<String>,
    pub daily_data_keep_days: usize,
    pub day_zone: DayZone,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_host: "0.0.0.0".into(),
            admin_host: "127.0.0.1".into(),
            admin_port: Some(7500),
            proxies_file: None,
            daily_data_keep_days: DEFAULT_KEEP_DAYS,
            day_zone: DayZone::Local,
            log_level: "info".into(),
        }
    }
}

impl Config {
    /// Load configuration: defaults → config file → env vars → CLI flags.
    pub fn load() -> Self {
        let cli = Cli::parse();
        let mut config = Config::default();

        // 1. Config file
        let config_path = Path::new(&cli.config);
        if config_path.exists() {
            if let Ok(content) = fs::read_to_string(config_path) {
                apply_config_file(&mut config, &content);
            }
        }

        // 2. Environment variables
        apply_env(&mut config, |key| std::env::var(key).ok());

        // 3. CLI flags (highest priority)
        apply_cli(&mut config, cli);

        config
    }

    /// Validate configuration. Returns an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.daily_data_keep_days == 0 {
            return Err("daily_data_keep_days must be >= 1".into());
        }
        if self.admin_port == Some(0) {
            return Err("admin_port must be > 0".into());
        }
        Ok(())
    }
}

fn apply_cli(config: &mut Config, cli: Cli) {
    if let Some(v) = cli.proxies {
        config.proxies_file = Some(v);
    }
    if let Some(v) = cli.listen_host {
        config.listen_host = v;
    }
    if let Some(v) = cli.admin_host {
        config.admin_host = v;
    }
    if let Some(v) = cli.admin_port {
        config.admin_port = Some(v);
    }
    if cli.no_admin {
        config.admin_port = None;
    }
    if let Some(v) = cli.keep_days {
        config.daily_data_keep_days = v;
    }
    if let Some(v) = cli.day_zone {
        config.day_zone = v;
    }
    if let Some(v) = cli.log_level {
        config.log_level = v;
    }
}

fn apply_config_file(config: &mut Config, content: &str) {
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let Some(eq_pos) = trimmed.find('=') else {
            continue;
        };

        let key = trimmed[..eq_pos].trim();
        let mut value = trimmed[eq_pos + 1..].trim().to_string();

        // Strip quotes
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            value = value[1..value.len() - 1].to_string();
        }

        match key {
            "listen_host" | "bind_addr" => config.listen_host = value,
            "admin_host" => config.admin_host = value,
            "admin_port" => {
                if matches!(value.as_str(), "off" | "none" | "") {
                    config.admin_port = None;
                } else if let Ok(v) = value.parse() {
                    config.admin_port = Some(v);
                }
            }
            "proxies" | "proxies_file" => config.proxies_file = Some(value),
            "daily_data_keep_days" | "keep_days" => {
                if let Ok(v) = value.parse() {
                    config.daily_data_keep_days = v;
                }
            }
            "day_zone" => {
                if let Ok(v) = value.parse() {
                    config.day_zone = v;
                }
            }
            "log_level" => config.log_level = value,
            _ => {}
        }
    }
}

fn apply_env<F>(config: &mut Config, var: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = var("PROXYSTAT_LISTEN_HOST") {
        config.listen_host = v;
    }
    if let Some(v) = var("PROXYSTAT_ADMIN_HOST") {
        config.admin_host = v;
    }
    if let Some(v) = var("PROXYSTAT_ADMIN_PORT") {
        if let Ok(p) = v.parse() {
            config.admin_port = Some(p);
        }
    }
    if let Some(v) = var("PROXYSTAT_PROXIES") {
        config.proxies_file = Some(v);
    }
    if let Some(v) = var("PROXYSTAT_KEEP_DAYS") {
        if let Ok(d) = v.parse() {
            config.daily_data_keep_days = d;
        }
    }
    if let Some(v) = var("PROXYSTAT_DAY_ZONE") {
        if let Ok(z) = v.parse() {
            config.day_zone = z;
        }
    }
    if let Some(v) = var("PROXYSTAT_LOG_LEVEL") {
        config.log_level = v;
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
