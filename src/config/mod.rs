use std::env;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_CLERK_API_URL: &str = "https://api.clerk.com";

/// Variables that must be present and non-empty before the server may start.
/// Checked in this order; the first missing one is reported.
pub const REQUIRED_VARS: [&str; 6] = [
    "MONGO_URI",
    "CLERK_SECRET_KEY",
    "CLOUDINARY_CLOUD_NAME",
    "CLOUDINARY_API_KEY",
    "CLOUDINARY_API_SECRET",
    "ARCJET_KEY",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid PORT value '{0}': expected a number between 0 and 65535")]
    InvalidPort(String),
}

/// Immutable settings snapshot taken once at startup and passed down by `Arc`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub port: u16,
    pub mongo_uri: Secret,
    pub clerk: ClerkConfig,
    pub cloudinary: CloudinaryConfig,
    pub arcjet_key: Secret,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Environment {
    Development,
    Test,
    Staging,
    Production,
}

#[derive(Debug, Clone)]
pub struct ClerkConfig {
    pub publishable_key: Option<String>,
    pub secret_key: Secret,
    /// PEM-encoded RSA public key for verifying session tokens without the JWKS endpoint.
    pub jwt_key: Option<Secret>,
    pub api_url: String,
}

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: Secret,
    pub api_secret: Secret,
}

/// String wrapper that keeps credentials out of `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl Environment {
    fn parse(value: Option<&str>) -> Self {
        match value {
            Some("production") | Some("prod") => Environment::Production,
            Some("staging") | Some("stage") => Environment::Staging,
            Some("test") => Environment::Test,
            _ => Environment::Development,
        }
    }
}

impl AppConfig {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup. Empty values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        for name in REQUIRED_VARS {
            if get(name).is_none() {
                return Err(ConfigError::MissingVar(name));
            }
        }

        let required = |name: &'static str| get(name).ok_or(ConfigError::MissingVar(name));

        let port = match get("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(raw.clone()))?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            environment: Environment::parse(get("NODE_ENV").as_deref()),
            port,
            mongo_uri: Secret::new(required("MONGO_URI")?),
            clerk: ClerkConfig {
                publishable_key: get("CLERK_PUBLISHABLE_KEY"),
                secret_key: Secret::new(required("CLERK_SECRET_KEY")?),
                jwt_key: get("CLERK_JWT_KEY").map(Secret::new),
                api_url: get("CLERK_API_URL")
                    .map(|url| url.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_CLERK_API_URL.to_string()),
            },
            cloudinary: CloudinaryConfig {
                cloud_name: required("CLOUDINARY_CLOUD_NAME")?,
                api_key: Secret::new(required("CLOUDINARY_API_KEY")?),
                api_secret: Secret::new(required("CLOUDINARY_API_SECRET")?),
            },
            arcjet_key: Secret::new(required("ARCJET_KEY")?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn complete_env() -> HashMap<&'static str, String> {
        HashMap::from([
            ("MONGO_URI", "mongodb://127.0.0.1:27017/app".to_string()),
            ("CLERK_SECRET_KEY", "sk_test_abc".to_string()),
            ("CLOUDINARY_CLOUD_NAME", "demo".to_string()),
            ("CLOUDINARY_API_KEY", "123456".to_string()),
            ("CLOUDINARY_API_SECRET", "cloud-secret".to_string()),
            ("ARCJET_KEY", "ajkey_xyz".to_string()),
        ])
    }

    fn load(vars: &HashMap<&'static str, String>) -> Result<AppConfig, ConfigError> {
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn applies_defaults_for_optional_vars() {
        let config = load(&complete_env()).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.environment, Environment::Development);
        assert!(config.clerk.publishable_key.is_none());
        assert!(config.clerk.jwt_key.is_none());
        assert_eq!(config.clerk.api_url, DEFAULT_CLERK_API_URL);
    }

    #[test]
    fn reads_optional_overrides() {
        let mut vars = complete_env();
        vars.insert("PORT", "8081".to_string());
        vars.insert("NODE_ENV", "production".to_string());
        vars.insert("CLERK_PUBLISHABLE_KEY", "pk_test_1".to_string());
        vars.insert("CLERK_API_URL", "http://localhost:9999/".to_string());

        let config = load(&vars).unwrap();
        assert_eq!(config.port, 8081);
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.clerk.publishable_key.as_deref(), Some("pk_test_1"));
        assert_eq!(config.clerk.api_url, "http://localhost:9999");
    }

    #[test]
    fn each_missing_required_var_is_named() {
        for name in REQUIRED_VARS {
            let mut vars = complete_env();
            vars.remove(name);
            assert_eq!(load(&vars).unwrap_err(), ConfigError::MissingVar(name));
        }
    }

    #[test]
    fn empty_required_var_counts_as_missing() {
        let mut vars = complete_env();
        vars.insert("ARCJET_KEY", String::new());
        let err = load(&vars).unwrap_err();
        assert_eq!(err.to_string(), "Missing required environment variable: ARCJET_KEY");
    }

    #[test]
    fn rejects_non_numeric_port() {
        let mut vars = complete_env();
        vars.insert("PORT", "http".to_string());
        assert_eq!(load(&vars).unwrap_err(), ConfigError::InvalidPort("http".to_string()));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = load(&complete_env()).unwrap();
        let dump = format!("{:?}", config);
        assert!(!dump.contains("sk_test_abc"));
        assert!(!dump.contains("cloud-secret"));
        assert!(dump.contains("demo"));
    }
}
