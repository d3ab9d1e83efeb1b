// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! All configuration is read from environment variables at startup.
//! [`AppConfig::from_lookup`] accepts any lookup function so tests never
//! touch the process environment.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `APP_ENVIRONMENT` | `Development`, `Local`, `Test` or `Production` | `Production` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Directory holding the database and generated keys | `./data` |
//! | `BASE_URL` | Public URL used in email links | `http://localhost:8080` |
//! | `APPLICATION_NAME` | API name, also the introspection client id | `communications-api` |
//! | `AUTH_AUTHORITY` | OpenID Connect issuer URL | Optional |
//! | `AUTH_METADATA_ADDRESS` | Explicit discovery document URL | Optional |
//! | `AUTH_AUDIENCE` | Required `aud` for external tokens | Optional |
//! | `AUTH_API_SECRET` | Introspection client secret | empty |
//! | `AUTH_ROLE_MAP` | Path to the role → privileges JSON map | `config/role-map.json` |
//! | `AUTH_REQUIRE_HTTPS_METADATA` | Refuse non-HTTPS discovery | `true` |
//! | `JWT_SECRET` | HS256 secret for locally issued tokens (≥ 32 bytes) | Optional |
//! | `JWT_ISSUER` | `iss` of locally issued tokens | `APPLICATION_NAME` |
//! | `JWT_AUDIENCE` | `aud` of locally issued tokens | Optional |
//! | `JWT_EXPIRATION_MINUTES` | Lifetime of locally issued tokens | `60` |
//! | `IDENTITY_PASSWORD_REQUIRED_LENGTH` | Minimum password length | `6` |
//! | `IDENTITY_PASSWORD_REQUIRE_DIGIT` | | `true` |
//! | `IDENTITY_PASSWORD_REQUIRE_LOWERCASE` | | `true` |
//! | `IDENTITY_PASSWORD_REQUIRE_UPPERCASE` | | `true` |
//! | `IDENTITY_PASSWORD_REQUIRE_NON_ALPHANUMERIC` | | `true` |
//! | `IDENTITY_PASSWORD_REQUIRED_UNIQUE_CHARS` | | `1` |
//! | `IDENTITY_LOCKOUT_MAX_FAILED_ATTEMPTS` | Failures before lockout | `5` |
//! | `IDENTITY_LOCKOUT_DAYS` | Lockout duration, 1 to 36500 | `1` |
//! | `EMAIL_FROM_ADDRESS` | Sender address | `noreply@localhost` |
//! | `EMAIL_FROM_NAME` | Sender display name | `APPLICATION_NAME` |
//! | `EMAIL_PICKUP_DIRECTORY` | Where `.eml` files go without SMTP | `$DATA_DIR/mail` |
//! | `SMTP_HOST` | SMTP relay; enables SMTP delivery | Optional |
//! | `SMTP_PORT` | | `587` |
//! | `SMTP_USERNAME` / `SMTP_PASSWORD` | Relay credentials | Optional |
//! | `SMTP_TLS` | Use TLS to the relay | `true` |
//! | `CORS_ORIGINS` | Comma-separated allowed origins | `http://localhost:3000` |
//! | `RATE_LIMIT_RULES` | `endpoint=period=limit` rules separated by `;` | `*=1s=2;*=15m=100;*=12h=1000;*=7d=10000` |
//! | `RATE_LIMIT_ENABLE_ENDPOINT` | Count per endpoint | `false` |
//! | `RATE_LIMIT_STACK_BLOCKED` | Count rejected requests | `false` |
//! | `RATE_LIMIT_IP_WHITELIST` | Comma-separated addresses | empty |
//! | `RATE_LIMIT_ENDPOINT_WHITELIST` | Comma-separated endpoint patterns | empty |
//! | `RATE_LIMIT_REAL_IP_HEADER` | Client address header | `X-Real-IP` |
//! | `RATE_LIMIT_HTTP_STATUS` | Status for blocked requests | `429` |
//! | `RATE_LIMIT_QUOTA_MESSAGE` | Body for blocked requests | built from the rule |
//! | `DATA_PROTECTION_KEY` | Base64 32-byte master key | generated in `DATA_DIR` |
//! | `SEED_ADMIN_EMAIL` / `SEED_ADMIN_PASSWORD` | Admin created at startup | Optional |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use axum::http::StatusCode;

use crate::auth::AuthSettings;
use crate::identity::{
    JwtSettings, LockoutOptions, PasswordPolicy, MAX_LOCKOUT_DAYS, MIN_SECRET_LENGTH,
};
use crate::notifications::{EmailSettings, EmailTransportSettings};
use crate::rate_limit::{RateLimitOptions, RateLimitRule};

pub const APP_ENVIRONMENT_ENV: &str = "APP_ENVIRONMENT";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const BASE_URL_ENV: &str = "BASE_URL";
pub const APPLICATION_NAME_ENV: &str = "APPLICATION_NAME";

pub const AUTH_AUTHORITY_ENV: &str = "AUTH_AUTHORITY";
pub const AUTH_METADATA_ADDRESS_ENV: &str = "AUTH_METADATA_ADDRESS";
pub const AUTH_AUDIENCE_ENV: &str = "AUTH_AUDIENCE";
pub const AUTH_API_SECRET_ENV: &str = "AUTH_API_SECRET";
pub const AUTH_ROLE_MAP_ENV: &str = "AUTH_ROLE_MAP";
pub const AUTH_REQUIRE_HTTPS_METADATA_ENV: &str = "AUTH_REQUIRE_HTTPS_METADATA";

pub const JWT_SECRET_ENV: &str = "JWT_SECRET";
pub const JWT_ISSUER_ENV: &str = "JWT_ISSUER";
pub const JWT_AUDIENCE_ENV: &str = "JWT_AUDIENCE";
pub const JWT_EXPIRATION_MINUTES_ENV: &str = "JWT_EXPIRATION_MINUTES";

pub const PASSWORD_REQUIRED_LENGTH_ENV: &str = "IDENTITY_PASSWORD_REQUIRED_LENGTH";
pub const PASSWORD_REQUIRE_DIGIT_ENV: &str = "IDENTITY_PASSWORD_REQUIRE_DIGIT";
pub const PASSWORD_REQUIRE_LOWERCASE_ENV: &str = "IDENTITY_PASSWORD_REQUIRE_LOWERCASE";
pub const PASSWORD_REQUIRE_UPPERCASE_ENV: &str = "IDENTITY_PASSWORD_REQUIRE_UPPERCASE";
pub const PASSWORD_REQUIRE_NON_ALPHANUMERIC_ENV: &str = "IDENTITY_PASSWORD_REQUIRE_NON_ALPHANUMERIC";
pub const PASSWORD_REQUIRED_UNIQUE_CHARS_ENV: &str = "IDENTITY_PASSWORD_REQUIRED_UNIQUE_CHARS";
pub const LOCKOUT_MAX_FAILED_ATTEMPTS_ENV: &str = "IDENTITY_LOCKOUT_MAX_FAILED_ATTEMPTS";
pub const LOCKOUT_DAYS_ENV: &str = "IDENTITY_LOCKOUT_DAYS";

pub const EMAIL_FROM_ADDRESS_ENV: &str = "EMAIL_FROM_ADDRESS";
pub const EMAIL_FROM_NAME_ENV: &str = "EMAIL_FROM_NAME";
pub const EMAIL_PICKUP_DIRECTORY_ENV: &str = "EMAIL_PICKUP_DIRECTORY";
pub const SMTP_HOST_ENV: &str = "SMTP_HOST";
pub const SMTP_PORT_ENV: &str = "SMTP_PORT";
pub const SMTP_USERNAME_ENV: &str = "SMTP_USERNAME";
pub const SMTP_PASSWORD_ENV: &str = "SMTP_PASSWORD";
pub const SMTP_TLS_ENV: &str = "SMTP_TLS";

pub const CORS_ORIGINS_ENV: &str = "CORS_ORIGINS";

pub const RATE_LIMIT_RULES_ENV: &str = "RATE_LIMIT_RULES";
pub const RATE_LIMIT_ENABLE_ENDPOINT_ENV: &str = "RATE_LIMIT_ENABLE_ENDPOINT";
pub const RATE_LIMIT_STACK_BLOCKED_ENV: &str = "RATE_LIMIT_STACK_BLOCKED";
pub const RATE_LIMIT_IP_WHITELIST_ENV: &str = "RATE_LIMIT_IP_WHITELIST";
pub const RATE_LIMIT_ENDPOINT_WHITELIST_ENV: &str = "RATE_LIMIT_ENDPOINT_WHITELIST";
pub const RATE_LIMIT_REAL_IP_HEADER_ENV: &str = "RATE_LIMIT_REAL_IP_HEADER";
pub const RATE_LIMIT_HTTP_STATUS_ENV: &str = "RATE_LIMIT_HTTP_STATUS";
pub const RATE_LIMIT_QUOTA_MESSAGE_ENV: &str = "RATE_LIMIT_QUOTA_MESSAGE";

pub const DATA_PROTECTION_KEY_ENV: &str = "DATA_PROTECTION_KEY";
pub const SEED_ADMIN_EMAIL_ENV: &str = "SEED_ADMIN_EMAIL";
pub const SEED_ADMIN_PASSWORD_ENV: &str = "SEED_ADMIN_PASSWORD";

pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

const DEFAULT_APPLICATION_NAME: &str = "communications-api";
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be set together with {1}")]
    Incomplete(&'static str, &'static str),
}

impl ConfigError {
    fn invalid(name: &'static str, value: &str, reason: impl fmt::Display) -> Self {
        Self::Invalid {
            name,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Hosting environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Local,
    Test,
    Production,
}

impl Environment {
    pub fn shows_api_docs(self) -> bool {
        !matches!(self, Self::Production)
    }

    pub fn uses_hsts(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" => Ok(Self::Development),
            "local" => Ok(Self::Local),
            "test" => Ok(Self::Test),
            "production" => Ok(Self::Production),
            _ => Err("expected Development, Local, Test or Production".to_string()),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Development => "Development",
            Self::Local => "Local",
            Self::Test => "Test",
            Self::Production => "Production",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default)]
pub struct IdentityOptions {
    pub password: PasswordPolicy,
    pub lockout: LockoutOptions,
}

#[derive(Clone)]
pub struct SeedAdmin {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for SeedAdmin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeedAdmin")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    /// Public URL of this service, without a trailing slash
    pub base_url: String,
    pub application_name: String,
    pub auth: AuthSettings,
    /// Local token issuer; login is disabled without it
    pub jwt: Option<JwtSettings>,
    pub identity: IdentityOptions,
    pub email: EmailSettings,
    pub cors_origins: Vec<String>,
    pub rate_limit: RateLimitOptions,
    /// Base64 master key for data protection
    pub data_protection_key: Option<String>,
    pub seed_admin: Option<SeedAdmin>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let environment = vars.parse_or(APP_ENVIRONMENT_ENV, Environment::Production)?;
        let server = ServerConfig {
            host: vars.string_or(HOST_ENV, "0.0.0.0"),
            port: vars.parse_or(PORT_ENV, 8080u16)?,
            data_dir: PathBuf::from(vars.string_or(DATA_DIR_ENV, "./data")),
        };
        let base_url = vars
            .string_or(BASE_URL_ENV, &format!("http://localhost:{}", server.port))
            .trim_end_matches('/')
            .to_string();
        let application_name = vars.string_or(APPLICATION_NAME_ENV, DEFAULT_APPLICATION_NAME);

        let auth = Self::auth_settings(&vars, &application_name)?;
        let jwt = Self::jwt_settings(&vars, &application_name)?;
        let identity = Self::identity_options(&vars)?;
        let email = Self::email_settings(&vars, &application_name, &server)?;
        let rate_limit = Self::rate_limit_options(&vars)?;

        let seed_admin = match (
            vars.string(SEED_ADMIN_EMAIL_ENV),
            vars.string(SEED_ADMIN_PASSWORD_ENV),
        ) {
            (Some(email), Some(password)) => Some(SeedAdmin { email, password }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(ConfigError::Incomplete(
                    SEED_ADMIN_EMAIL_ENV,
                    SEED_ADMIN_PASSWORD_ENV,
                ))
            }
            (None, Some(_)) => {
                return Err(ConfigError::Incomplete(
                    SEED_ADMIN_PASSWORD_ENV,
                    SEED_ADMIN_EMAIL_ENV,
                ))
            }
        };

        Ok(Self {
            environment,
            server,
            base_url,
            application_name,
            auth,
            jwt,
            identity,
            email,
            cors_origins: vars.list(CORS_ORIGINS_ENV, ',', DEFAULT_CORS_ORIGINS),
            rate_limit,
            data_protection_key: vars.string(DATA_PROTECTION_KEY_ENV),
            seed_admin,
        })
    }

    fn auth_settings<F>(vars: &Vars<F>, application_name: &str) -> Result<AuthSettings, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AuthSettings::default();
        let role_map = vars.string_or(AUTH_ROLE_MAP_ENV, &defaults.role_map);
        Ok(AuthSettings {
            application_name: application_name.to_string(),
            authority: vars.string(AUTH_AUTHORITY_ENV),
            metadata_address: vars.string(AUTH_METADATA_ADDRESS_ENV),
            audience: vars.string(AUTH_AUDIENCE_ENV),
            api_secret: vars.string_or(AUTH_API_SECRET_ENV, ""),
            role_map,
            require_https_metadata: vars.bool_or(AUTH_REQUIRE_HTTPS_METADATA_ENV, true)?,
            ..defaults
        })
    }

    fn jwt_settings<F>(
        vars: &Vars<F>,
        application_name: &str,
    ) -> Result<Option<JwtSettings>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(secret) = vars.string(JWT_SECRET_ENV) else {
            return Ok(None);
        };
        if secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::invalid(
                JWT_SECRET_ENV,
                "<redacted>",
                format!("must be at least {MIN_SECRET_LENGTH} bytes"),
            ));
        }
        let minutes: u64 = vars.parse_or(JWT_EXPIRATION_MINUTES_ENV, 60)?;
        if minutes == 0 {
            return Err(ConfigError::invalid(JWT_EXPIRATION_MINUTES_ENV, "0", "must be positive"));
        }
        Ok(Some(JwtSettings {
            secret,
            issuer: vars.string_or(JWT_ISSUER_ENV, application_name),
            audience: vars.string(JWT_AUDIENCE_ENV),
            expiration: Duration::from_secs(minutes * 60),
        }))
    }

    fn identity_options<F>(vars: &Vars<F>) -> Result<IdentityOptions, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let password_defaults = PasswordPolicy::default();
        let password = PasswordPolicy {
            required_length: vars
                .parse_or(PASSWORD_REQUIRED_LENGTH_ENV, password_defaults.required_length)?,
            require_digit: vars
                .bool_or(PASSWORD_REQUIRE_DIGIT_ENV, password_defaults.require_digit)?,
            require_lowercase: vars
                .bool_or(PASSWORD_REQUIRE_LOWERCASE_ENV, password_defaults.require_lowercase)?,
            require_uppercase: vars
                .bool_or(PASSWORD_REQUIRE_UPPERCASE_ENV, password_defaults.require_uppercase)?,
            require_non_alphanumeric: vars.bool_or(
                PASSWORD_REQUIRE_NON_ALPHANUMERIC_ENV,
                password_defaults.require_non_alphanumeric,
            )?,
            required_unique_chars: vars.parse_or(
                PASSWORD_REQUIRED_UNIQUE_CHARS_ENV,
                password_defaults.required_unique_chars,
            )?,
        };

        let lockout_defaults = LockoutOptions::default();
        let lockout_days: i64 = vars.parse_or(
            LOCKOUT_DAYS_ENV,
            lockout_defaults.lockout_duration.num_days(),
        )?;
        if !(1..=MAX_LOCKOUT_DAYS).contains(&lockout_days) {
            return Err(ConfigError::invalid(
                LOCKOUT_DAYS_ENV,
                &lockout_days.to_string(),
                format!("must be between 1 and {MAX_LOCKOUT_DAYS}"),
            ));
        }
        let lockout = LockoutOptions {
            max_failed_attempts: vars.parse_or(
                LOCKOUT_MAX_FAILED_ATTEMPTS_ENV,
                lockout_defaults.max_failed_attempts,
            )?,
            lockout_duration: chrono::Duration::days(lockout_days),
        };

        Ok(IdentityOptions { password, lockout })
    }

    fn email_settings<F>(
        vars: &Vars<F>,
        application_name: &str,
        server: &ServerConfig,
    ) -> Result<EmailSettings, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let transport = match vars.string(SMTP_HOST_ENV) {
            Some(host) => EmailTransportSettings::Smtp {
                host,
                port: vars.parse_or(SMTP_PORT_ENV, 587u16)?,
                username: vars.string(SMTP_USERNAME_ENV),
                password: vars.string(SMTP_PASSWORD_ENV),
                tls: vars.bool_or(SMTP_TLS_ENV, true)?,
            },
            None => EmailTransportSettings::PickupDirectory(
                vars.string(EMAIL_PICKUP_DIRECTORY_ENV)
                    .map(PathBuf::from)
                    .unwrap_or_else(|| server.data_dir.join("mail")),
            ),
        };
        Ok(EmailSettings {
            from_address: vars.string_or(EMAIL_FROM_ADDRESS_ENV, "noreply@localhost"),
            from_name: vars.string_or(EMAIL_FROM_NAME_ENV, application_name),
            transport,
        })
    }

    fn rate_limit_options<F>(vars: &Vars<F>) -> Result<RateLimitOptions, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = RateLimitOptions::default();
        let general_rules = match vars.string(RATE_LIMIT_RULES_ENV) {
            Some(rules) => rules
                .split(';')
                .map(str::trim)
                .filter(|rule| !rule.is_empty())
                .map(|rule| {
                    RateLimitRule::parse(rule)
                        .map_err(|e| ConfigError::invalid(RATE_LIMIT_RULES_ENV, rule, e))
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => defaults.general_rules,
        };

        let status: u16 = vars.parse_or(
            RATE_LIMIT_HTTP_STATUS_ENV,
            defaults.http_status_code.as_u16(),
        )?;
        let http_status_code = StatusCode::from_u16(status)
            .map_err(|e| ConfigError::invalid(RATE_LIMIT_HTTP_STATUS_ENV, &status.to_string(), e))?;

        Ok(RateLimitOptions {
            general_rules,
            ip_whitelist: vars.list(RATE_LIMIT_IP_WHITELIST_ENV, ',', ""),
            endpoint_whitelist: vars.list(RATE_LIMIT_ENDPOINT_WHITELIST_ENV, ',', ""),
            real_ip_header: vars.string_or(RATE_LIMIT_REAL_IP_HEADER_ENV, &defaults.real_ip_header),
            enable_endpoint_rate_limiting: vars.bool_or(
                RATE_LIMIT_ENABLE_ENDPOINT_ENV,
                defaults.enable_endpoint_rate_limiting,
            )?,
            stack_blocked_requests: vars
                .bool_or(RATE_LIMIT_STACK_BLOCKED_ENV, defaults.stack_blocked_requests)?,
            http_status_code,
            quota_exceeded_message: vars.string(RATE_LIMIT_QUOTA_MESSAGE_ENV),
            counter_capacity: defaults.counter_capacity,
        })
    }
}

/// Typed access to a variable lookup. Blank values count as unset.
struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string_or(&self, name: &str, default: &str) -> String {
        self.string(name).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.string(name) {
            Some(value) => value
                .parse()
                .map_err(|e| ConfigError::invalid(name, &value, e)),
            None => Ok(default),
        }
    }

    fn bool_or(&self, name: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.string(name) {
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                _ => Err(ConfigError::invalid(name, &value, "expected true/false/1/0")),
            },
            None => Ok(default),
        }
    }

    fn list(&self, name: &str, separator: char, default: &str) -> Vec<String> {
        self.string(name)
            .unwrap_or_else(|| default.to_string())
            .split(separator)
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config(&[]).unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.server.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.auth.role_map, "config/role-map.json");
        assert!(config.auth.require_https_metadata);
        assert!(config.jwt.is_none());
        assert_eq!(config.identity.password.required_length, 6);
        assert_eq!(config.identity.lockout.max_failed_attempts, 5);
        assert_eq!(config.rate_limit.general_rules.len(), 4);
        assert_eq!(config.cors_origins, vec!["http://localhost:3000"]);
        assert!(matches!(
            config.email.transport,
            EmailTransportSettings::PickupDirectory(ref dir) if dir.ends_with("mail")
        ));
        assert!(config.seed_admin.is_none());
    }

    #[test]
    fn parses_overrides() {
        let config = config(&[
            ("APP_ENVIRONMENT", "development"),
            ("PORT", "9000"),
            ("BASE_URL", "https://comms.example.com/"),
            ("AUTH_AUTHORITY", "https://idp.example.com"),
            ("AUTH_REQUIRE_HTTPS_METADATA", "0"),
            ("JWT_SECRET", "0123456789abcdef0123456789abcdef"),
            ("JWT_EXPIRATION_MINUTES", "15"),
            ("IDENTITY_PASSWORD_REQUIRE_DIGIT", "false"),
            ("IDENTITY_LOCKOUT_DAYS", "2"),
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_PORT", "2525"),
            ("CORS_ORIGINS", "https://a.example.com, https://b.example.com"),
            ("RATE_LIMIT_RULES", "*=1s=5; post:/v1/subscribe=1m=3"),
            ("RATE_LIMIT_ENABLE_ENDPOINT", "true"),
            ("SEED_ADMIN_EMAIL", "admin@example.com"),
            ("SEED_ADMIN_PASSWORD", "Passw0rd!"),
        ])
        .unwrap();

        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.base_url, "https://comms.example.com");
        assert_eq!(config.auth.authority.as_deref(), Some("https://idp.example.com"));
        assert!(!config.auth.require_https_metadata);

        let jwt = config.jwt.unwrap();
        assert_eq!(jwt.issuer, "communications-api");
        assert_eq!(jwt.expiration, Duration::from_secs(15 * 60));

        assert!(!config.identity.password.require_digit);
        assert_eq!(config.identity.lockout.lockout_duration, chrono::Duration::days(2));
        assert!(matches!(
            config.email.transport,
            EmailTransportSettings::Smtp { port: 2525, tls: true, .. }
        ));
        assert_eq!(config.cors_origins.len(), 2);
        assert_eq!(config.rate_limit.general_rules[1].endpoint, "post:/v1/subscribe");
        assert!(config.rate_limit.enable_endpoint_rate_limiting);
        assert_eq!(config.seed_admin.unwrap().email, "admin@example.com");
    }

    #[test]
    fn invalid_values_name_the_variable() {
        assert!(matches!(
            config(&[("PORT", "http")]),
            Err(ConfigError::Invalid { name: "PORT", .. })
        ));
        assert!(matches!(
            config(&[("SMTP_HOST", "smtp"), ("SMTP_TLS", "maybe")]),
            Err(ConfigError::Invalid { name: "SMTP_TLS", .. })
        ));
        assert!(matches!(
            config(&[("APP_ENVIRONMENT", "Staging")]),
            Err(ConfigError::Invalid { name: "APP_ENVIRONMENT", .. })
        ));
        assert!(matches!(
            config(&[("RATE_LIMIT_RULES", "*=1x=5")]),
            Err(ConfigError::Invalid { name: "RATE_LIMIT_RULES", .. })
        ));
    }

    #[test]
    fn oversized_durations_are_config_errors() {
        assert!(matches!(
            config(&[("RATE_LIMIT_RULES", "*=200000000000d=5")]),
            Err(ConfigError::Invalid { name: "RATE_LIMIT_RULES", .. })
        ));
        assert!(matches!(
            config(&[("RATE_LIMIT_RULES", "*=100000000d=5")]),
            Err(ConfigError::Invalid { name: "RATE_LIMIT_RULES", .. })
        ));
        assert!(matches!(
            config(&[("IDENTITY_LOCKOUT_DAYS", "200000000000")]),
            Err(ConfigError::Invalid { name: "IDENTITY_LOCKOUT_DAYS", .. })
        ));
        assert!(matches!(
            config(&[("IDENTITY_LOCKOUT_DAYS", "0")]),
            Err(ConfigError::Invalid { name: "IDENTITY_LOCKOUT_DAYS", .. })
        ));
        assert!(config(&[("IDENTITY_LOCKOUT_DAYS", "36500")]).is_ok());
    }

    #[test]
    fn short_jwt_secret_is_rejected() {
        assert!(matches!(
            config(&[("JWT_SECRET", "too-short")]),
            Err(ConfigError::Invalid { name: "JWT_SECRET", .. })
        ));
    }

    #[test]
    fn seed_admin_needs_both_values() {
        assert_eq!(
            config(&[("SEED_ADMIN_EMAIL", "admin@example.com")]).unwrap_err(),
            ConfigError::Incomplete("SEED_ADMIN_EMAIL", "SEED_ADMIN_PASSWORD")
        );
    }

    #[test]
    fn environment_controls_docs_and_hsts() {
        assert!(Environment::Development.shows_api_docs());
        assert!(Environment::Test.shows_api_docs());
        assert!(!Environment::Production.shows_api_docs());
        assert!(Environment::Production.uses_hsts());
        assert!(!Environment::Local.uses_hsts());
    }
}
