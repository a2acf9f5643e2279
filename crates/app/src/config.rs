use std::path::PathBuf;

/// Default application origin used in e-mail links.
pub const DEFAULT_REDIRECT_URL: &str = "http://localhost:3000";

/// Default location of the preference file.
pub const DEFAULT_PREFS_PATH: &str = ".keepmd/preferences.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Where notes and accounts live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    /// A hosted project reached over HTTP and WebSocket.
    Hosted { url: String, anon_key: String },
    /// An in-process backend seeded with the configured account.
    Offline,
}

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub email: String,
    pub password: String,
    pub prefs_path: PathBuf,
    /// Directory to write a markdown export into after loading.
    pub export_dir: Option<PathBuf>,
    pub redirect_url: String,
    pub log_json: bool,
}

impl AppConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var               | Default                            |
    /// |-----------------------|------------------------------------|
    /// | `KEEPMD_URL`          | required unless `KEEPMD_OFFLINE=1` |
    /// | `KEEPMD_ANON_KEY`     | required unless `KEEPMD_OFFLINE=1` |
    /// | `KEEPMD_EMAIL`        | required                           |
    /// | `KEEPMD_PASSWORD`     | required                           |
    /// | `KEEPMD_OFFLINE`      | `0`                                |
    /// | `KEEPMD_PREFS_PATH`   | `.keepmd/preferences.json`         |
    /// | `KEEPMD_EXPORT_DIR`   | unset                              |
    /// | `KEEPMD_REDIRECT_URL` | `http://localhost:3000`            |
    /// | `KEEPMD_LOG_JSON`     | `0`                                |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &'static str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &'static str| var(name).ok_or(ConfigError::Missing(name));

        let offline = parse_flag("KEEPMD_OFFLINE", var("KEEPMD_OFFLINE"))?;
        let backend = if offline {
            BackendConfig::Offline
        } else {
            let url = required("KEEPMD_URL")?;
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid {
                    var: "KEEPMD_URL",
                    value: url,
                    reason: "expected an http(s) URL",
                });
            }
            BackendConfig::Hosted {
                url,
                anon_key: required("KEEPMD_ANON_KEY")?,
            }
        };

        Ok(Self {
            backend,
            email: required("KEEPMD_EMAIL")?,
            password: required("KEEPMD_PASSWORD")?,
            prefs_path: var("KEEPMD_PREFS_PATH")
                .unwrap_or_else(|| DEFAULT_PREFS_PATH.into())
                .into(),
            export_dir: var("KEEPMD_EXPORT_DIR").map(PathBuf::from),
            redirect_url: var("KEEPMD_REDIRECT_URL")
                .unwrap_or_else(|| DEFAULT_REDIRECT_URL.into()),
            log_json: parse_flag("KEEPMD_LOG_JSON", var("KEEPMD_LOG_JSON"))?,
        })
    }
}

fn parse_flag(var: &'static str, value: Option<String>) -> Result<bool, ConfigError> {
    let Some(value) = value else {
        return Ok(false);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value,
            reason: "expected a boolean",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn hosted_config_with_defaults() {
        let config = load(&[
            ("KEEPMD_URL", "https://abc.example.co"),
            ("KEEPMD_ANON_KEY", "anon"),
            ("KEEPMD_EMAIL", "ada@example.com"),
            ("KEEPMD_PASSWORD", "secret1"),
        ])
        .unwrap();

        assert_eq!(
            config.backend,
            BackendConfig::Hosted {
                url: "https://abc.example.co".into(),
                anon_key: "anon".into(),
            }
        );
        assert_eq!(config.prefs_path, PathBuf::from(DEFAULT_PREFS_PATH));
        assert_eq!(config.redirect_url, DEFAULT_REDIRECT_URL);
        assert!(config.export_dir.is_none());
        assert!(!config.log_json);
    }

    #[test]
    fn offline_needs_no_project() {
        let config = load(&[
            ("KEEPMD_OFFLINE", "1"),
            ("KEEPMD_EMAIL", "ada@example.com"),
            ("KEEPMD_PASSWORD", "secret1"),
            ("KEEPMD_EXPORT_DIR", "/tmp/out"),
            ("KEEPMD_LOG_JSON", "true"),
        ])
        .unwrap();

        assert_eq!(config.backend, BackendConfig::Offline);
        assert_eq!(config.export_dir, Some(PathBuf::from("/tmp/out")));
        assert!(config.log_json);
    }

    #[test]
    fn missing_and_invalid_values_are_errors() {
        assert_matches!(
            load(&[("KEEPMD_EMAIL", "a@b.c"), ("KEEPMD_PASSWORD", "x")]),
            Err(ConfigError::Missing("KEEPMD_URL"))
        );
        assert_matches!(
            load(&[("KEEPMD_OFFLINE", "1"), ("KEEPMD_EMAIL", "a@b.c")]),
            Err(ConfigError::Missing("KEEPMD_PASSWORD"))
        );
        assert_matches!(
            load(&[("KEEPMD_OFFLINE", "maybe")]),
            Err(ConfigError::Invalid { var: "KEEPMD_OFFLINE", .. })
        );
        assert_matches!(
            load(&[("KEEPMD_URL", "abc.example.co"), ("KEEPMD_ANON_KEY", "k")]),
            Err(ConfigError::Invalid { var: "KEEPMD_URL", .. })
        );
    }
}
