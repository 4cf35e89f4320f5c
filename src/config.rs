//! Environment-derived runtime settings.
//!
//! Every setting has a default, so `Settings::from_env()` succeeds in a bare
//! environment. Durations accept human-readable strings ("10m", "1h", "14d").

use crate::errors::ConfigError;
use anyhow::Result;
use url::Url;

/// External base URL used to build device verification URIs
#[derive(Clone)]
pub struct ExternalBase(String);

/// Authorization-code lifetime
#[derive(Clone)]
pub struct AuthCodeTtl(chrono::Duration);

/// Access-token lifetime
#[derive(Clone)]
pub struct AccessTokenTtl(chrono::Duration);

/// Refresh-token lifetime
#[derive(Clone)]
pub struct RefreshTokenTtl(chrono::Duration);

/// Device-code lifetime
#[derive(Clone)]
pub struct DeviceCodeTtl(chrono::Duration);

/// Minimum device polling interval advertised to clients
#[derive(Clone)]
pub struct DevicePollInterval(std::time::Duration);

/// Cadence of the background expiry sweeper
#[derive(Clone)]
pub struct SweepInterval(std::time::Duration);

/// Runtime settings for the engine and the ledgers
#[derive(Clone)]
pub struct Settings {
    pub external_base: ExternalBase,
    pub auth_code_ttl: AuthCodeTtl,
    pub access_token_ttl: AccessTokenTtl,
    pub refresh_token_ttl: RefreshTokenTtl,
    pub device_code_ttl: DeviceCodeTtl,
    pub device_poll_interval: DevicePollInterval,
    pub sweep_interval: SweepInterval,
}

impl Settings {
    /// Create settings from environment variables, with defaults.
    pub fn from_env() -> Result<Self> {
        let external_base: ExternalBase =
            default_env("EXTERNAL_BASE", "http://localhost:8080").try_into()?;
        let auth_code_ttl: AuthCodeTtl = default_env("AUTH_CODE_TTL", "10m").try_into()?;
        let access_token_ttl: AccessTokenTtl = default_env("ACCESS_TOKEN_TTL", "1h").try_into()?;
        let refresh_token_ttl: RefreshTokenTtl =
            default_env("REFRESH_TOKEN_TTL", "14d").try_into()?;
        let device_code_ttl: DeviceCodeTtl = default_env("DEVICE_CODE_TTL", "10m").try_into()?;
        let device_poll_interval: DevicePollInterval =
            default_env("DEVICE_POLL_INTERVAL", "5s").try_into()?;
        let sweep_interval: SweepInterval = default_env("SWEEP_INTERVAL", "30s").try_into()?;

        Ok(Self {
            external_base,
            auth_code_ttl,
            access_token_ttl,
            refresh_token_ttl,
            device_code_ttl,
            device_poll_interval,
            sweep_interval,
        })
    }
}

fn default_env(name: &str, default_value: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default_value.to_string())
}

fn parse_chrono_duration(value: String) -> Result<chrono::Duration> {
    let duration = duration_str::parse(&value)
        .map_err(|e| ConfigError::DurationParsingFailed(value.clone(), e.to_string()))?;
    Ok(chrono::Duration::from_std(duration)?)
}

impl TryFrom<String> for ExternalBase {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Url::parse(&value)
            .map_err(|e| ConfigError::ExternalBaseInvalid(value.clone(), e.to_string()))?;
        Ok(Self(value.trim_end_matches('/').to_string()))
    }
}

impl AsRef<str> for ExternalBase {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AuthCodeTtl {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ok(Self(parse_chrono_duration(value)?))
    }
}

impl AsRef<chrono::Duration> for AuthCodeTtl {
    fn as_ref(&self) -> &chrono::Duration {
        &self.0
    }
}

impl TryFrom<String> for AccessTokenTtl {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ok(Self(parse_chrono_duration(value)?))
    }
}

impl AsRef<chrono::Duration> for AccessTokenTtl {
    fn as_ref(&self) -> &chrono::Duration {
        &self.0
    }
}

impl TryFrom<String> for RefreshTokenTtl {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ok(Self(parse_chrono_duration(value)?))
    }
}

impl AsRef<chrono::Duration> for RefreshTokenTtl {
    fn as_ref(&self) -> &chrono::Duration {
        &self.0
    }
}

impl TryFrom<String> for DeviceCodeTtl {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ok(Self(parse_chrono_duration(value)?))
    }
}

impl AsRef<chrono::Duration> for DeviceCodeTtl {
    fn as_ref(&self) -> &chrono::Duration {
        &self.0
    }
}

impl TryFrom<String> for DevicePollInterval {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let duration = duration_str::parse(&value)
            .map_err(|e| ConfigError::DurationParsingFailed(value.clone(), e.to_string()))?;
        Ok(Self(duration))
    }
}

impl DevicePollInterval {
    pub fn as_secs(&self) -> u64 {
        self.0.as_secs()
    }
}

impl TryFrom<String> for SweepInterval {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let duration = duration_str::parse(&value)
            .map_err(|e| ConfigError::DurationParsingFailed(value.clone(), e.to_string()))?;
        Ok(Self(duration))
    }
}

impl AsRef<std::time::Duration> for SweepInterval {
    fn as_ref(&self) -> &std::time::Duration {
        &self.0
    }
}

impl From<&Settings> for crate::oauth::engine::EngineSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            external_base: settings.external_base.as_ref().to_string(),
            access_token_ttl: *settings.access_token_ttl.as_ref(),
            refresh_token_ttl: *settings.refresh_token_ttl.as_ref(),
            device_poll_interval: settings.device_poll_interval.as_secs(),
        }
    }
}
