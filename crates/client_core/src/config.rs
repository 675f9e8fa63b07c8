use std::{collections::HashMap, fs, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use url::Url;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8080/api";
pub const DEFAULT_CONFIG_FILE: &str = "catalyst.toml";
pub const DEFAULT_SESSION_FILE: &str = ".catalyst/session.json";

const SIGN_IN_PATH: &str = "/auth/signin";
const SIGN_OUT_PATH: &str = "/auth/signout";
const RESOLVE_PATH: &str = "/logical-seed-key/resolve";

/// Fully qualified backend endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub sign_in: String,
    pub sign_out: String,
    pub resolve: String,
    pub github_auth_start: Option<String>,
}

impl Endpoints {
    pub fn from_base(backend_url: &str) -> Self {
        let base = backend_url.trim_end_matches('/');
        Self {
            sign_in: format!("{base}{SIGN_IN_PATH}"),
            sign_out: format!("{base}{SIGN_OUT_PATH}"),
            resolve: format!("{base}{RESOLVE_PATH}"),
            github_auth_start: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub backend_url: String,
    pub sign_in_url: Option<String>,
    pub sign_out_url: Option<String>,
    pub resolve_url: Option<String>,
    pub github_auth_start_url: Option<String>,
    pub status_clear_delay_secs: u64,
    pub popup_poll_interval_ms: u64,
    pub session_file: PathBuf,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.into(),
            sign_in_url: None,
            sign_out_url: None,
            resolve_url: None,
            github_auth_start_url: None,
            status_clear_delay_secs: 5,
            popup_poll_interval_ms: 1_000,
            session_file: PathBuf::from(DEFAULT_SESSION_FILE),
        }
    }
}

impl ClientSettings {
    pub fn endpoints(&self) -> Endpoints {
        let mut endpoints = Endpoints::from_base(&self.backend_url);
        if let Some(v) = &self.sign_in_url {
            endpoints.sign_in = v.clone();
        }
        if let Some(v) = &self.sign_out_url {
            endpoints.sign_out = v.clone();
        }
        if let Some(v) = &self.resolve_url {
            endpoints.resolve = v.clone();
        }
        endpoints.github_auth_start = self.github_auth_start_url.clone();
        endpoints
    }

    pub fn status_clear_delay(&self) -> Duration {
        Duration::from_secs(self.status_clear_delay_secs)
    }

    pub fn popup_poll_interval(&self) -> Duration {
        Duration::from_millis(self.popup_poll_interval_ms.max(1))
    }

    pub fn validate(&self) -> Result<()> {
        let parsed = Url::parse(&self.backend_url)
            .with_context(|| format!("invalid backend url '{}'", self.backend_url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!(
                "backend url '{}' must use http or https",
                self.backend_url
            );
        }
        for url in [
            &self.sign_in_url,
            &self.sign_out_url,
            &self.resolve_url,
            &self.github_auth_start_url,
        ]
        .into_iter()
        .flatten()
        {
            Url::parse(url).with_context(|| format!("invalid endpoint url '{url}'"))?;
        }
        Ok(())
    }

    fn apply(&mut self, key: &str, value: String) {
        match key {
            "backend_url" => self.backend_url = value,
            "sign_in_url" => self.sign_in_url = Some(value),
            "sign_out_url" => self.sign_out_url = Some(value),
            "resolve_url" => self.resolve_url = Some(value),
            "github_auth_start_url" => self.github_auth_start_url = Some(value),
            "status_clear_delay_secs" => {
                if let Ok(parsed) = value.parse() {
                    self.status_clear_delay_secs = parsed;
                }
            }
            "popup_poll_interval_ms" => {
                if let Ok(parsed) = value.parse() {
                    self.popup_poll_interval_ms = parsed;
                }
            }
            "session_file" => self.session_file = PathBuf::from(value),
            _ => tracing::debug!(key, "ignoring unknown settings key"),
        }
    }
}

const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("CATALYST_BACKEND_URL", "backend_url"),
    ("APP__BACKEND_URL", "backend_url"),
    ("CATALYST_SIGN_IN_URL", "sign_in_url"),
    ("CATALYST_SIGN_OUT_URL", "sign_out_url"),
    ("CATALYST_RESOLVE_URL", "resolve_url"),
    ("CATALYST_GITHUB_AUTH_START_URL", "github_auth_start_url"),
    ("APP__GITHUB_AUTH_START_URL", "github_auth_start_url"),
    ("CATALYST_STATUS_CLEAR_DELAY_SECS", "status_clear_delay_secs"),
    ("CATALYST_POPUP_POLL_INTERVAL_MS", "popup_poll_interval_ms"),
    ("CATALYST_SESSION_FILE", "session_file"),
];

/// Defaults, then the optional settings file, then environment overrides.
pub fn load_settings(config_file: Option<PathBuf>) -> Result<ClientSettings> {
    let mut settings = ClientSettings::default();

    let path = config_file.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    if let Ok(raw) = fs::read_to_string(&path) {
        apply_file(&mut settings, &raw)
            .with_context(|| format!("failed to parse settings file '{}'", path.display()))?;
    }

    for (var, key) in ENV_OVERRIDES {
        if let Ok(v) = std::env::var(var) {
            settings.apply(key, v);
        }
    }

    settings.validate()?;
    Ok(settings)
}

fn apply_file(settings: &mut ClientSettings, raw: &str) -> Result<()> {
    let file_cfg = toml::from_str::<HashMap<String, toml::Value>>(raw)?;
    for (key, value) in file_cfg {
        let value = match value {
            toml::Value::String(s) => s,
            toml::Value::Integer(i) => i.to_string(),
            other => other.to_string(),
        };
        settings.apply(&key, value);
    }
    Ok(())
}
