use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub token: TokenConfig,
    pub invite: InviteConfig,
    pub mfa: MfaConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
    pub bootstrap: Option<BootstrapConfig>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub signing_secret: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
    pub mfa_token_expiry_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InviteConfig {
    pub ttl_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MfaConfig {
    pub issuer: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub login_per_minute: u32,
    pub register_per_minute: u32,
    pub mfa_per_minute: u32,
    pub default_per_minute: u32,
}

/// First-run superadmin account, seeded only when the users table has
/// no matching account.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    pub superadmin_email: String,
    pub superadmin_password: String,
}

impl IdentityConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let bootstrap = match (
            env::var("BOOTSTRAP_SUPERADMIN_EMAIL"),
            env::var("BOOTSTRAP_SUPERADMIN_PASSWORD"),
        ) {
            (Ok(superadmin_email), Ok(superadmin_password)) => Some(BootstrapConfig {
                superadmin_email,
                superadmin_password,
            }),
            _ => None,
        };

        let config = IdentityConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("identity-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", Some("10"), is_prod)?,
            },
            redis: RedisConfig {
                url: get_env("REDIS_URL", None, is_prod)?,
            },
            token: TokenConfig {
                signing_secret: get_env("TOKEN_SIGNING_SECRET", None, true)?,
                access_token_expiry_minutes: parse_env(
                    "ACCESS_TOKEN_EXPIRY_MINUTES",
                    Some("15"),
                    is_prod,
                )?,
                refresh_token_expiry_days: parse_env(
                    "REFRESH_TOKEN_EXPIRY_DAYS",
                    Some("7"),
                    is_prod,
                )?,
                mfa_token_expiry_minutes: parse_env("MFA_TOKEN_EXPIRY_MINUTES", Some("5"), is_prod)?,
            },
            invite: InviteConfig {
                ttl_hours: parse_env("INVITE_TTL_HOURS", Some("24"), is_prod)?,
            },
            mfa: MfaConfig {
                issuer: get_env("MFA_ISSUER", Some("docs-platform"), is_prod)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect(),
            },
            rate_limit: RateLimitConfig {
                login_per_minute: parse_env("RATE_LIMIT_LOGIN_PER_MINUTE", Some("5"), is_prod)?,
                register_per_minute: parse_env("RATE_LIMIT_REGISTER_PER_MINUTE", Some("3"), is_prod)?,
                mfa_per_minute: parse_env("RATE_LIMIT_MFA_PER_MINUTE", Some("5"), is_prod)?,
                default_per_minute: parse_env("RATE_LIMIT_DEFAULT_PER_MINUTE", Some("20"), is_prod)?,
            },
            bootstrap,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.token.signing_secret.len() < 32 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "TOKEN_SIGNING_SECRET must be at least 32 characters"
            )));
        }

        if self.token.access_token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "ACCESS_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.token.refresh_token_expiry_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "REFRESH_TOKEN_EXPIRY_DAYS must be positive"
            )));
        }

        if self.token.mfa_token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "MFA_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }

        if !(24..=168).contains(&self.invite.ttl_hours) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "INVITE_TTL_HOURS must be between 24 and 168"
            )));
        }

        if self.environment == Environment::Prod
            && self.security.allowed_origins.iter().any(|o| o == "*")
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Wildcard CORS origin not allowed in production"
            )));
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: Option<&str>, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, default, is_prod)?.parse().map_err(|e: T::Err| {
        AppError::ConfigError(anyhow::anyhow!("{} is not valid: {}", key, e))
    })
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
