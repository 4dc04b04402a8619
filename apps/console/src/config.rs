use std::{collections::HashMap, fs, path::Path};

pub const CONFIG_FILE: &str = "console.toml";

const ENV_PREFIX: &str = "APP__";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub lookup_debounce_ms: Option<u64>,
    pub page_size: u32,
    pub default_domain: Option<String>,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8080/kadai/api".into(),
            request_timeout_secs: 10,
            lookup_debounce_ms: None,
            page_size: 9,
            default_domain: None,
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    /// Applies one named setting. Unknown keys and unparsable values leave
    /// the current value in place.
    fn apply(&mut self, key: &str, value: &str) {
        let value = value.trim();
        match key {
            "api_base_url" if !value.is_empty() => self.api_base_url = value.to_string(),
            "request_timeout_secs" => {
                if let Ok(parsed) = value.parse::<u64>() {
                    self.request_timeout_secs = parsed;
                }
            }
            "lookup_debounce_ms" => {
                if let Ok(parsed) = value.parse::<u64>() {
                    self.lookup_debounce_ms = Some(parsed);
                }
            }
            "page_size" => {
                if let Ok(parsed) = value.parse::<u32>() {
                    if parsed > 0 {
                        self.page_size = parsed;
                    }
                }
            }
            "default_domain" => {
                self.default_domain = (!value.is_empty()).then(|| value.to_string());
            }
            "log_filter" if !value.is_empty() => self.log_filter = value.to_string(),
            _ => {}
        }
    }
}

const KEYS: [&str; 6] = [
    "api_base_url",
    "request_timeout_secs",
    "lookup_debounce_ms",
    "page_size",
    "default_domain",
    "log_filter",
];

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(CONFIG_FILE), |name| std::env::var(name).ok())
}

/// Defaults, then the flat toml table at `path`, then `APP__*` variables
/// resolved through `env`.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        apply_file(&mut settings, &raw);
    }

    for key in KEYS {
        if let Some(value) = env(&format!("{ENV_PREFIX}{}", key.to_ascii_uppercase())) {
            settings.apply(key, &value);
        }
    }

    settings
}

fn apply_file(settings: &mut Settings, raw: &str) {
    let Ok(table) = toml::from_str::<HashMap<String, toml::Value>>(raw) else {
        return;
    };
    for key in KEYS {
        match table.get(key) {
            Some(toml::Value::String(value)) => settings.apply(key, value),
            Some(toml::Value::Integer(value)) => settings.apply(key, &value.to_string()),
            _ => {}
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
