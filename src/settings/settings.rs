use anyhow::{Result, anyhow};
use config::{Config, File};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub database: Option<Database>,
    pub http: Http,
    pub log: Log,
    pub session: Session,
    #[serde(default)]
    pub cookie: Cookie,
}

#[derive(Debug, Deserialize)]
pub struct Database {
    pub dsn: String,
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub address: String,
    pub tls: Option<Tls>,
}

#[derive(Debug, Deserialize)]
pub struct Tls {
    pub cert_path: String,
    pub key_path: String,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

#[derive(Debug, Deserialize)]
pub struct Session {
    pub backend: String, // "memory" or "mysql"
    pub access_ttl: Option<String>,
    pub refresh_ttl: Option<String>,
    pub secret_bytes: Option<usize>,
    pub sweep_interval: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Cookie {
    #[serde(default = "default_cookie_path")]
    pub path: String,
    #[serde(default = "default_cookie_secure")]
    pub secure: bool,
}

impl Default for Cookie {
    fn default() -> Self {
        Cookie {
            path: default_cookie_path(),
            secure: default_cookie_secure(),
        }
    }
}

fn default_cookie_path() -> String {
    "/api/v1/auth".to_string()
}

fn default_cookie_secure() -> bool {
    true
}

const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(60 * 60);
const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);
const DEFAULT_SECRET_BYTES: usize = 32;

impl Session {
    pub fn access_ttl(&self) -> Result<Duration> {
        ttl_or(self.access_ttl.as_deref(), DEFAULT_ACCESS_TTL)
    }

    pub fn refresh_ttl(&self) -> Result<Duration> {
        ttl_or(self.refresh_ttl.as_deref(), DEFAULT_REFRESH_TTL)
    }

    pub fn sweep_interval(&self) -> Result<Duration> {
        ttl_or(self.sweep_interval.as_deref(), DEFAULT_SWEEP_INTERVAL)
    }

    pub fn secret_bytes(&self) -> usize {
        self.secret_bytes.unwrap_or(DEFAULT_SECRET_BYTES)
    }
}

fn ttl_or(raw: Option<&str>, default: Duration) -> Result<Duration> {
    match raw {
        Some(raw) => parse_ttl(raw),
        None => Ok(default),
    }
}

/// Accepts `30s` / `15m` / `12h` / `7d`, or a bare number of seconds.
pub fn parse_ttl(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    let (digits, unit_secs) = match raw.as_bytes().last().copied() {
        Some(b's') => (&raw[..raw.len() - 1], 1),
        Some(b'm') => (&raw[..raw.len() - 1], 60),
        Some(b'h') => (&raw[..raw.len() - 1], 60 * 60),
        Some(b'd') => (&raw[..raw.len() - 1], 24 * 60 * 60),
        _ => (raw, 1),
    };
    let count: u64 = digits
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid duration: {:?}", raw))?;
    Ok(Duration::from_secs(count * unit_secs))
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_unit_suffixes() {
        assert_eq!(parse_ttl("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_ttl("15m").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_ttl("12h").unwrap(), Duration::from_secs(43_200));
        assert_eq!(parse_ttl("7d").unwrap(), Duration::from_secs(604_800));
    }

    #[test]
    fn ttl_falls_back_to_raw_seconds() {
        assert_eq!(parse_ttl("3600").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_ttl(" 45 ").unwrap(), Duration::from_secs(45));
    }

    #[test]
    fn ttl_rejects_garbage() {
        assert!(parse_ttl("").is_err());
        assert!(parse_ttl("soon").is_err());
        assert!(parse_ttl("10w").is_err());
        assert!(parse_ttl("-5m").is_err());
    }

    #[test]
    fn ttl_defaults_apply_when_unset() {
        let session = Session {
            backend: "memory".to_string(),
            access_ttl: None,
            refresh_ttl: None,
            secret_bytes: None,
            sweep_interval: None,
        };
        assert_eq!(session.access_ttl().unwrap(), Duration::from_secs(3600));
        assert_eq!(
            session.refresh_ttl().unwrap(),
            Duration::from_secs(7 * 24 * 3600)
        );
        assert_eq!(session.secret_bytes(), 32);
    }
}
