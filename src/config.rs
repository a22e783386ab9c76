use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub ingest: IngestConfig,
    pub encryption: EncryptionConfig,
    pub database: DatabaseConfig,
    pub rate_limit: RateLimitConfig,
    pub tracking_tokens: TrackingTokenConfig,
    pub cors: CorsConfig,
    pub logging: LoggingConfig,
    /// "development" or "production"; controls error verbosity and CORS defaults.
    pub environment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Admin API key checked against the X-API-Key header. Empty means the
    /// admin surface runs open (a warning is logged on every request).
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Shared secret checked against the X-Ingest-Key header. Unlike the
    /// admin key, an empty value rejects every ingestion request.
    pub key: String,
    pub rpm: u32,
    pub burst: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionConfig {
    /// Master secret for provider credential encryption at rest.
    pub master_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub rpm: u32,
    pub burst: u32,
    /// Paths that bypass rate limiting, matched exactly or by prefix.
    pub exempt_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingTokenConfig {
    /// Entropy length of generated tracking token secrets (16-40).
    pub length: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins; empty means permissive (development only).
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5001,
            },
            auth: AuthConfig {
                api_key: String::new(),
            },
            ingest: IngestConfig {
                key: String::new(),
                rpm: 60,
                burst: 60,
            },
            encryption: EncryptionConfig {
                master_key: String::new(),
            },
            database: DatabaseConfig {
                url: "sqlite://cost_guardian.db?mode=rwc".to_string(),
            },
            rate_limit: RateLimitConfig {
                rpm: 60,
                burst: 60,
                exempt_paths: vec!["/ping".to_string(), "/dashboard".to_string()],
            },
            tracking_tokens: TrackingTokenConfig { length: 22 },
            cors: CorsConfig {
                allowed_origins: vec![],
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
            environment: "development".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder =
            ConfigBuilder::builder().add_source(config::Config::try_from(&Config::default())?);

        if Path::new("config.yaml").exists() {
            builder = builder.add_source(File::with_name("config"));
        }

        builder = builder.add_source(
            Environment::with_prefix("GUARDIAN")
                .prefix_separator("_")
                .separator("__"),
        );

        builder.build()?.try_deserialize()
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder =
            ConfigBuilder::builder().add_source(config::Config::try_from(&Config::default())?);

        if path.as_ref().exists() {
            builder = builder.add_source(File::from(path.as_ref()));
        }

        builder = builder.add_source(
            Environment::with_prefix("GUARDIAN")
                .prefix_separator("_")
                .separator("__"),
        );

        builder.build()?.try_deserialize()
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5001);
        assert!(config.auth.api_key.is_empty());
        assert!(config.ingest.key.is_empty());
        assert_eq!(config.rate_limit.rpm, 60);
        assert_eq!(config.rate_limit.burst, 60);
        assert_eq!(
            config.rate_limit.exempt_paths,
            vec!["/ping".to_string(), "/dashboard".to_string()]
        );
        assert_eq!(config.ingest.rpm, 60);
        assert_eq!(config.tracking_tokens.length, 22);
        assert!(!config.is_production());
    }

    #[test]
    fn test_config_builder_with_env() {
        let env_source = Environment::with_prefix("GUARDIAN")
            .prefix_separator("_")
            .separator("__");

        let builder = ConfigBuilder::builder()
            .add_source(config::Config::try_from(&Config::default()).unwrap())
            .add_source(env_source);

        assert!(builder.build().is_ok());
    }

    #[test]
    fn test_config_load_from_yaml_file() {
        let yaml_content = r#"
server:
  host: "127.0.0.1"
  port: 4000
auth:
  api_key: "admin-secret"
ingest:
  key: "ingest-secret"
  rpm: 120
  burst: 30
encryption:
  master_key: "master-secret"
rate_limit:
  rpm: 90
environment: "production"
"#;

        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = Config::load_from_file(temp_file.path()).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.auth.api_key, "admin-secret");
        assert_eq!(config.ingest.key, "ingest-secret");
        assert_eq!(config.ingest.rpm, 120);
        assert_eq!(config.ingest.burst, 30);
        assert_eq!(config.encryption.master_key, "master-secret");
        assert_eq!(config.rate_limit.rpm, 90);
        // Untouched fields keep their defaults
        assert_eq!(config.rate_limit.burst, 60);
        assert!(config.is_production());
    }

    #[test]
    fn test_config_load_nonexistent_file() {
        let config = Config::load_from_file("nonexistent.yaml").unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5001);
    }
}
