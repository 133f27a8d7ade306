use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use tracing::{info, warn};

pub struct Config {
    pub port: u16,
    pub hub: String,
    pub edges_path: Option<PathBuf>,
    pub directory_path: Option<PathBuf>,
    pub identity_url: Option<String>,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: setting("CARPOOL_PORT", "3030"),
            hub: setting("CARPOOL_HUB", "USB"),
            edges_path: optional("CARPOOL_EDGES").map(PathBuf::from),
            directory_path: optional("CARPOOL_DIRECTORY").map(PathBuf::from),
            identity_url: optional("CARPOOL_IDENTITY_URL"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3030,
            hub: "USB".to_string(),
            edges_path: None,
            directory_path: None,
            identity_url: None,
        }
    }
}

/// reads `key`, falling back to `default` when unset. a value that does not
/// parse stops startup.
fn setting<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} unset, falling back to {default}");
        default.to_string()
    });

    match parse_setting(key, &raw) {
        Ok(value) => value,
        Err(message) => {
            warn!("{message}");
            panic!("Cannot start with {message}");
        }
    }
}

fn parse_setting<T: FromStr>(key: &str, raw: &str) -> Result<T, String>
where
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|e| format!("{key}='{raw}' ({e})"))
}

fn optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => {
            info!("{key} not set, skipping");
            None
        }
    }
}
