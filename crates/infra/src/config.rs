//! Application configuration.
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. `stockledger.toml` in the working directory (optional)
//! 3. environment variables prefixed `STOCKLEDGER`, nested with `__`
//!    (`STOCKLEDGER__HTTP__BIND=0.0.0.0:8080`)

use anyhow::{Context, bail};
use config::{Config, Environment, File};
use serde::Deserialize;

pub use stockledger_observability::LogFormat;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Socket address the API listens on.
    pub bind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 shared secret.
    pub jwt_secret: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    #[serde(default)]
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    pub format: LogFormat,
}

impl AppConfig {
    /// Load from `stockledger.toml` and the process environment.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Some("stockledger"), Environment::with_prefix("STOCKLEDGER"))
    }

    fn load_from(file: Option<&str>, env: Environment) -> anyhow::Result<Self> {
        let mut builder = Config::builder()
            .set_default("http.bind", "0.0.0.0:8080")?
            .set_default("auth.jwt_secret", "")?
            .set_default("storage.backend", "memory")?
            .set_default("log.format", "json")?;
        if let Some(name) = file {
            builder = builder.add_source(File::with_name(name).required(false));
        }
        let cfg: AppConfig = builder
            .add_source(env.prefix_separator("__").separator("__").try_parsing(true))
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.auth.jwt_secret.trim().is_empty() {
            bail!("auth.jwt_secret must be set (STOCKLEDGER__AUTH__JWT_SECRET)");
        }
        if self.storage.backend == StorageBackend::Postgres
            && self.storage.database_url.as_deref().is_none_or(|u| u.trim().is_empty())
        {
            bail!("storage.database_url is required for the postgres backend");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let source: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Environment::with_prefix("STOCKLEDGER").source(Some(source))
    }

    #[test]
    fn defaults_apply_when_only_the_secret_is_set() {
        let cfg = AppConfig::load_from(None, env(&[("STOCKLEDGER__AUTH__JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(cfg.http.bind, "0.0.0.0:8080");
        assert_eq!(cfg.storage.backend, StorageBackend::Memory);
        assert_eq!(cfg.log.format, LogFormat::Json);
    }

    #[test]
    fn environment_overrides_nested_keys() {
        let cfg = AppConfig::load_from(
            None,
            env(&[
                ("STOCKLEDGER__AUTH__JWT_SECRET", "s3cret"),
                ("STOCKLEDGER__HTTP__BIND", "127.0.0.1:9000"),
                ("STOCKLEDGER__LOG__FORMAT", "pretty"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.http.bind, "127.0.0.1:9000");
        assert_eq!(cfg.log.format, LogFormat::Pretty);
    }

    #[test]
    fn missing_secret_is_rejected() {
        assert!(AppConfig::load_from(None, env(&[])).is_err());
    }

    #[test]
    fn postgres_needs_a_database_url() {
        let err = AppConfig::load_from(
            None,
            env(&[
                ("STOCKLEDGER__AUTH__JWT_SECRET", "s3cret"),
                ("STOCKLEDGER__STORAGE__BACKEND", "postgres"),
            ]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("database_url"));
    }
}
