use std::{path::PathBuf, time::Duration};

use serde::Deserialize;

fn default_api_url() -> String {
    "https://emea.lightify-api.com".to_string()
}

fn default_token_path() -> PathBuf {
    PathBuf::from("token.txt")
}

fn default_token_refresh_interval_hours() -> u64 {
    48
}

fn default_manufacturer() -> String {
    "OSRAM Lightify".to_string()
}

fn default_state_topic() -> String {
    "homekit/lightify/{id}".to_string()
}

fn default_set_topic() -> String {
    "homekit/lightify/{id}/set".to_string()
}

#[derive(Clone, Deserialize, Debug)]
pub struct LightifySettings {
    pub client_id: String,
    pub client_secret: String,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// File holding the current OAuth2 refresh token
    #[serde(default = "default_token_path")]
    pub token_path: PathBuf,

    #[serde(default = "default_token_refresh_interval_hours")]
    pub token_refresh_interval_hours: u64,

    /// PEM encoded CA certificate(s) to trust instead of the bundled webpki roots
    pub ca_cert: Option<String>,
}

impl LightifySettings {
    /// Refresh period, which must be at least one hour and fit a `Duration`.
    pub fn token_refresh_interval(&self) -> Result<Duration, config::ConfigError> {
        if self.token_refresh_interval_hours == 0 {
            return Err(config::ConfigError::Message(
                "lightify.token_refresh_interval_hours must be greater than 0".to_string(),
            ));
        }

        self.token_refresh_interval_hours
            .checked_mul(60 * 60)
            .map(Duration::from_secs)
            .ok_or_else(|| {
                config::ConfigError::Message(format!(
                    "lightify.token_refresh_interval_hours is too large: {}",
                    self.token_refresh_interval_hours
                ))
            })
    }
}

#[derive(Clone, Deserialize, Debug)]
pub struct AccessoryHostSettings {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,

    #[serde(default = "default_manufacturer")]
    pub manufacturer: String,

    #[serde(default = "default_state_topic")]
    pub state_topic: String,

    #[serde(default = "default_set_topic")]
    pub set_topic: String,
}

#[derive(Clone, Deserialize, Debug)]
pub struct Settings {
    pub lightify: LightifySettings,
    pub accessory_host: AccessoryHostSettings,
}

fn parse_settings(config: config::Config) -> Result<Settings, config::ConfigError> {
    let settings = config.try_deserialize::<Settings>()?;
    settings.lightify.token_refresh_interval()?;

    Ok(settings)
}

pub fn read_settings() -> Result<Settings, config::ConfigError> {
    let config = config::Config::builder()
        .add_source(config::File::with_name("Settings").required(false))
        .add_source(
            config::Environment::with_prefix("HOMEKIT_LIGHTIFY")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    parse_settings(config)
}
