use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

use heartout_api::JwtSettings;

/// Secrets that ship in sample configs and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "dev-secret-change-me",
    "change-me",
    "changeme",
    "secret",
    "your-secret-key",
];

const DEV_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub storage: StorageKind,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
    pub dev: bool,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub openai_model: Option<String>,
    pub stripe_secret_key: Option<String>,
    pub stripe_api_base: Option<String>,
    /// Registrations with these emails get the admin role.
    pub admin_emails: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let dev = matches!(get("HEARTOUT_DEV").as_deref(), Some("1" | "true"));

        let storage = match get("HEARTOUT_STORAGE").as_deref() {
            None | Some("sqlite") => StorageKind::Sqlite,
            Some("memory") => StorageKind::Memory,
            Some(other) => bail!("HEARTOUT_STORAGE must be 'sqlite' or 'memory', got '{}'", other),
        };

        let jwt_secret = match get("HEARTOUT_JWT_SECRET") {
            Some(secret) if dev => secret,
            Some(secret) => {
                if PLACEHOLDER_SECRETS.contains(&secret.as_str()) {
                    bail!("HEARTOUT_JWT_SECRET is a placeholder value; set a real secret or HEARTOUT_DEV=1");
                }
                secret
            }
            None if dev => DEV_SECRET.to_string(),
            None => bail!("HEARTOUT_JWT_SECRET is required (set HEARTOUT_DEV=1 to use a development secret)"),
        };

        let port = match get("HEARTOUT_PORT") {
            Some(port) => port.parse().context("HEARTOUT_PORT must be a port number")?,
            None => 3000,
        };
        let access_ttl_minutes = positive(get("HEARTOUT_ACCESS_TTL_MINUTES"), 60, "HEARTOUT_ACCESS_TTL_MINUTES")?;
        let refresh_ttl_days = positive(get("HEARTOUT_REFRESH_TTL_DAYS"), 30, "HEARTOUT_REFRESH_TTL_DAYS")?;

        Ok(Self {
            host: get("HEARTOUT_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            storage,
            db_path: PathBuf::from(get("HEARTOUT_DB_PATH").unwrap_or_else(|| "heartout.db".into())),
            jwt_secret,
            access_ttl_minutes,
            refresh_ttl_days,
            dev,
            openai_api_key: get("OPENAI_API_KEY"),
            openai_base_url: get("OPENAI_BASE_URL"),
            openai_model: get("OPENAI_MODEL"),
            stripe_secret_key: get("STRIPE_SECRET_KEY"),
            stripe_api_base: get("STRIPE_API_BASE"),
            admin_emails: get("HEARTOUT_ADMIN_EMAILS")
                .map(|list| {
                    list.split(',')
                        .map(str::trim)
                        .filter(|e| !e.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }

    pub fn jwt(&self) -> JwtSettings {
        JwtSettings {
            secret: self.jwt_secret.clone(),
            access_ttl: chrono::Duration::minutes(self.access_ttl_minutes),
            refresh_ttl: chrono::Duration::days(self.refresh_ttl_days),
        }
    }
}

fn positive(value: Option<String>, default: i64, key: &str) -> anyhow::Result<i64> {
    let Some(value) = value else {
        return Ok(default);
    };
    let n: i64 = value.parse().with_context(|| format!("{} must be a number", key))?;
    if n <= 0 {
        bail!("{} must be greater than zero", key);
    }
    Ok(n)
}
