use std::{fs, path::Path, time::Duration};

use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_bind: String,
    pub request_timeout_secs: i64,
    pub event_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8443".into(),
            request_timeout_secs: 60,
            event_capacity: 256,
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(Path::new("server.toml")) {
        apply_file_overrides(&mut settings, &raw);
    }
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());

    settings
}

/// Applies `server.toml` values. Integers may be written bare or quoted;
/// unreadable values keep the previous setting.
pub(crate) fn apply_file_overrides(settings: &mut Settings, raw: &str) {
    let table = match toml::from_str::<toml::Table>(raw) {
        Ok(table) => table,
        Err(error) => {
            debug!(%error, "ignoring unreadable server.toml");
            return;
        }
    };

    if let Some(v) = table.get("bind_addr").and_then(toml::Value::as_str) {
        settings.server_bind = v.to_string();
    }
    if let Some(v) = table.get("request_timeout_secs").and_then(integer_value) {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = table
        .get("event_capacity")
        .and_then(integer_value)
        .and_then(|v| usize::try_from(v).ok())
    {
        settings.event_capacity = v;
    }
}

pub(crate) fn apply_env_overrides(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = var("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = var("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.trim().parse::<i64>() {
            settings.request_timeout_secs = parsed;
        }
    }

    if let Some(v) = var("APP__EVENT_CAPACITY") {
        if let Ok(parsed) = v.trim().parse::<usize>() {
            settings.event_capacity = parsed;
        }
    }
}

fn integer_value(value: &toml::Value) -> Option<i64> {
    match value {
        toml::Value::Integer(v) => Some(*v),
        toml::Value::String(v) => v.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTimeout {
    pub duration: Duration,
    /// Set when the configured value had to be corrected.
    pub warning: Option<String>,
}

/// Validates the configured request timeout. Negative values are clamped to
/// zero and reported, never fatal.
pub fn request_timeout(secs: i64) -> RequestTimeout {
    match u64::try_from(secs) {
        Ok(secs) => RequestTimeout {
            duration: Duration::from_secs(secs),
            warning: None,
        },
        Err(_) => RequestTimeout {
            duration: Duration::ZERO,
            warning: Some(format!(
                "request_timeout_secs must be 0 or greater (got {secs}); requests will expire immediately"
            )),
        },
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
