use serde::Deserialize;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default)]
    pub oauth2: OAuth2Config,
    /// Accounts checked by the password grant when no other `AuthCheck` is wired in.
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

/// Settings handed to the grant engine at construction.
#[derive(Clone, Debug, Deserialize)]
pub struct OAuth2Config {
    /// Reject token requests that did not arrive over TLS.
    #[serde(default = "default_true")]
    pub require_ssl: bool,
    /// Honour `X-Forwarded-Proto: https` from a TLS-terminating proxy.
    #[serde(default)]
    pub trust_forwarded_proto: bool,
    /// Access token lifetime in seconds
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime: i64,
    /// Refresh token lifetime in seconds
    #[serde(default = "default_refresh_token_lifetime")]
    pub refresh_token_lifetime: i64,
    /// Authorization code lifetime in seconds
    #[serde(default = "default_authorization_code_lifetime")]
    pub authorization_code_lifetime: i64,
    #[serde(default)]
    pub kdf: KdfConfig,
}

impl Default for OAuth2Config {
    fn default() -> Self {
        Self {
            require_ssl: true,
            trust_forwarded_proto: false,
            access_token_lifetime: default_access_token_lifetime(),
            refresh_token_lifetime: default_refresh_token_lifetime(),
            authorization_code_lifetime: default_authorization_code_lifetime(),
            kdf: KdfConfig::default(),
        }
    }
}

/// Argon2id parameters used to derive client secret hashes.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct KdfConfig {
    /// Memory cost in KiB
    #[serde(default = "default_memory_cost")]
    pub memory_cost: u32,
    /// Number of passes
    #[serde(default = "default_time_cost")]
    pub time_cost: u32,
    /// Degree of parallelism (lanes)
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
    /// Derived hash length in bytes
    #[serde(default = "default_output_len")]
    pub output_len: usize,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            memory_cost: default_memory_cost(),
            time_cost: default_time_cost(),
            parallelism: default_parallelism(),
            output_len: default_output_len(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct UserConfig {
    pub username: String,
    /// Argon2 PHC string, see `manage-clients hash-password`.
    pub password_hash: String,
    pub user_id: i64,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_true() -> bool {
    true
}

fn default_access_token_lifetime() -> i64 {
    3600
}

fn default_refresh_token_lifetime() -> i64 {
    86400 * 7
}

fn default_authorization_code_lifetime() -> i64 {
    600
}

fn default_memory_cost() -> u32 {
    argon2::Params::DEFAULT_M_COST
}

fn default_time_cost() -> u32 {
    argon2::Params::DEFAULT_T_COST
}

fn default_parallelism() -> u32 {
    argon2::Params::DEFAULT_P_COST
}

fn default_output_len() -> usize {
    argon2::Params::DEFAULT_OUTPUT_LEN
}

impl AppConfig {
    /// Check invariants serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let oauth2 = &self.oauth2;
        for (name, value) in [
            ("oauth2.access_token_lifetime", oauth2.access_token_lifetime),
            ("oauth2.refresh_token_lifetime", oauth2.refresh_token_lifetime),
            (
                "oauth2.authorization_code_lifetime",
                oauth2.authorization_code_lifetime,
            ),
        ] {
            if value <= 0 {
                return Err(ConfigError::Validation(format!("{name} must be > 0")));
            }
        }

        argon2::Params::new(
            oauth2.kdf.memory_cost,
            oauth2.kdf.time_cost,
            oauth2.kdf.parallelism,
            Some(oauth2.kdf.output_len),
        )
        .map_err(|e| ConfigError::Validation(format!("oauth2.kdf: {e}")))?;

        Ok(())
    }
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Any variable matching the key path separated by double underscores
/// (e.g. `OAUTH2__REQUIRE_SSL`) overrides the file value.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from("config.yaml")
}

pub fn load_config_from(path: &str) -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name(path))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

/// Convenience helper for binaries wanting the panic-on-error behaviour.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".into(),
            listen_addr: default_listen_addr(),
            oauth2: OAuth2Config::default(),
            users: vec![],
        }
    }

    #[test]
    fn defaults_match_protocol_lifetimes() {
        let cfg = OAuth2Config::default();
        assert!(cfg.require_ssl);
        assert!(!cfg.trust_forwarded_proto);
        assert_eq!(cfg.access_token_lifetime, 3600);
        assert_eq!(cfg.authorization_code_lifetime, 600);
        assert_eq!(cfg.kdf.memory_cost, 19 * 1024);
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(minimal().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_lifetime() {
        let mut cfg = minimal();
        cfg.oauth2.authorization_code_lifetime = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("authorization_code_lifetime"));
    }

    #[test]
    fn validate_rejects_unusable_kdf() {
        let mut cfg = minimal();
        cfg.oauth2.kdf.parallelism = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }
}
