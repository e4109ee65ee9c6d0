use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use clap::Parser;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "blogpost", about = "Blog-post REST backend")]
pub struct FlatConfig {
    #[arg(long, env = "BIND_ADDR", default_value = "[::]:3000", help = "Address the HTTP server listens on")]
    bind_addr: SocketAddr,

    #[arg(long, env = "DATABASE_PATH", default_value = "blogpost.db.jsonl", help = "Path of the document store operation log")]
    database_path: PathBuf,

    #[arg(long, env = "BODY_LIMIT", default_value_t = 10 * 1024 * 1024, help = "Maximum request body size in bytes")]
    body_limit: usize,

    #[arg(long, env = "RATE_LIMIT_WINDOW", default_value = "15m", value_parser = humantime::parse_duration, help = "Rate limit window, e.g. 15m")]
    rate_limit_window: Duration,

    #[arg(long, env = "RATE_LIMIT_MAX", default_value_t = 100, help = "Requests allowed per client IP in one window")]
    rate_limit_max: u32,

    #[arg(long, env = "TRUST_PROXY", help = "Take the client IP from X-Forwarded-For")]
    trust_proxy: bool,

    #[arg(long, env = "LOG_LEVEL", default_value = "info", help = "Default log level")]
    log_level: Level,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db: DbConfiguration,
    pub api: ApiConfiguration,
    pub rate_limit: RateLimitConfiguration,
    pub log: LogConfiguration,
}

#[derive(Debug, Clone)]
pub struct DbConfiguration {
    pub database_path: PathBuf, // DATABASE_PATH
}

#[derive(Debug, Clone)]
pub struct ApiConfiguration {
    pub bind_addr: SocketAddr, // BIND_ADDR
    pub body_limit: usize, // BODY_LIMIT
}

#[derive(Debug, Clone)]
pub struct RateLimitConfiguration {
    pub window: Duration, // RATE_LIMIT_WINDOW
    pub max_requests: u32, // RATE_LIMIT_MAX
    pub trust_proxy: bool, // TRUST_PROXY
}

#[derive(Debug, Clone)]
pub struct LogConfiguration {
    pub level: Level, // LOG_LEVEL
}

impl Config {
    pub fn parse() -> Self {
        FlatConfig::parse().into()
    }
}

impl Default for RateLimitConfiguration {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(15 * 60),
            max_requests: 100,
            trust_proxy: false,
        }
    }
}

impl From<FlatConfig> for Config {
    fn from(value: FlatConfig) -> Self {
        Config {
            db: DbConfiguration {
                database_path: value.database_path,
            },
            api: ApiConfiguration {
                bind_addr: value.bind_addr,
                body_limit: value.body_limit,
            },
            rate_limit: RateLimitConfiguration {
                window: value.rate_limit_window,
                max_requests: value.rate_limit_max,
                trust_proxy: value.trust_proxy,
            },
            log: LogConfiguration {
                level: value.log_level,
            },
        }
    }
}
