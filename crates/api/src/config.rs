//! HTTP server settings.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use raffle_engine::config::{env_or, ConfigError};

use crate::auth::jwt::JwtConfig;

const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173";

/// Listener, browser access and operator token settings.
///
/// | Env Var                 | Default                 |
/// |-------------------------|-------------------------|
/// | `HOST`                  | `0.0.0.0`               |
/// | `PORT`                  | `3000`                  |
/// | `CORS_ORIGINS`          | `http://localhost:5173` |
/// | `REQUEST_TIMEOUT_SECS`  | `30`                    |
/// | `SHUTDOWN_TIMEOUT_SECS` | `30`                    |
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Checkout and back-office origins, comma separated in the environment.
    pub cors_origins: Vec<String>,
    pub request_timeout: Duration,
    /// Drain window for the alert dispatcher and event persistence once the
    /// listener stops.
    pub shutdown_timeout: Duration,
    pub jwt: JwtConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let origins: String = env_or("CORS_ORIGINS", DEFAULT_CORS_ORIGIN.to_string())?;
        Ok(Self {
            host: env_or("HOST", IpAddr::V4(Ipv4Addr::UNSPECIFIED))?,
            port: env_or("PORT", 3000)?,
            cors_origins: split_origins(&origins),
            request_timeout: Duration::from_secs(env_or("REQUEST_TIMEOUT_SECS", 30)?),
            shutdown_timeout: Duration::from_secs(env_or("SHUTDOWN_TIMEOUT_SECS", 30)?),
            jwt: JwtConfig::from_env(),
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_are_trimmed_and_blanks_dropped() {
        assert_eq!(
            split_origins(" https://pay.example.com ,,https://admin.example.com"),
            vec!["https://pay.example.com", "https://admin.example.com"]
        );
        assert!(split_origins(" , ").is_empty());
    }
}
