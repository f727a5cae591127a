use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::schema::{FieldValidator, ValidatorOverride};

/// Fields that receive the site's password length bounds
const PASSWORD_FIELDS: [&str; 2] = ["password", "passwordc"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub schema: SchemaConfig,
    pub password: PasswordConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Holds `user_fields.yaml`, `group_fields.yaml` and `requests/*.yaml`
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordConfig {
    pub min_length: usize,
    pub max_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
            },
            schema: SchemaConfig {
                dir: PathBuf::from("schema"),
            },
            password: PasswordConfig {
                min_length: 8,
                max_length: 100,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let config = Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or(defaults.database.url),
            },
            schema: SchemaConfig {
                dir: env::var("PROFILE_SCHEMA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.schema.dir),
            },
            password: PasswordConfig {
                min_length: env_usize("PASSWORD_MIN_LENGTH", defaults.password.min_length)?,
                max_length: env_usize("PASSWORD_MAX_LENGTH", defaults.password.max_length)?,
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.password.min_length > self.password.max_length {
            anyhow::bail!(
                "PASSWORD_MIN_LENGTH ({}) exceeds PASSWORD_MAX_LENGTH ({})",
                self.password.min_length,
                self.password.max_length
            );
        }
        Ok(())
    }

    /// Site-configured validator parameters injected during schema merges
    pub fn validator_overrides(&self) -> Vec<ValidatorOverride> {
        PASSWORD_FIELDS
            .iter()
            .map(|field| {
                ValidatorOverride::new(
                    field,
                    FieldValidator::length(
                        Some(self.password.min_length),
                        Some(self.password.max_length),
                    ),
                )
            })
            .collect()
    }
}

fn env_usize(name: &str, default: usize) -> anyhow::Result<usize> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a non-negative integer, got '{}'", name, raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_overrides() {
        let config = Config::default();
        let overrides = config.validator_overrides();
        assert_eq!(overrides.len(), 2);
        assert_eq!(overrides[0].field, "password");
        assert_eq!(
            overrides[0].validator,
            FieldValidator::length(Some(8), Some(100))
        );
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let mut config = Config::default();
        config.password.min_length = 200;
        assert!(config.validate().is_err());
    }
}
