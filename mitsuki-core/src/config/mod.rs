mod loader;
mod substitute;
pub mod value;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

pub use value::{ConfigValue, FromConfigValue};

/// Environment-variable prefix for configuration fallback keys.
///
/// `MITSUKI_SERVER_PORT` maps to the key `server.port`.
pub const ENV_PREFIX: &str = "MITSUKI";

/// Environment variable selecting the active profile.
pub const PROFILE_VAR: &str = "MITSUKI_PROFILE";

/// Framework-bundled defaults, lowest precedence of all sources.
const DEFAULTS_YAML: &str = r#"
mitsuki:
  server:
    host: 127.0.0.1
    port: 8080
  scheduler:
    enabled: false
    grace-period-ms: 5000
"#;

/// Error type for configuration operations.
#[derive(Debug)]
pub enum ConfigError {
    /// The requested key was not found in the configuration.
    NotFound(String),
    /// The value could not be converted to the requested type.
    TypeMismatch { key: String, expected: &'static str },
    /// An I/O or YAML parsing error occurred while loading config files.
    Load(String),
    /// A profile file was explicitly required but does not exist.
    MissingProfileFile(String),
    /// A `${...}` placeholder referenced a key that is absent and has no default.
    UnresolvedPlaceholder(String),
    /// Placeholder expansion ran into a cycle (or exceeded the depth bound).
    CircularPlaceholder(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NotFound(key) => write!(f, "Config key not found: {key}"),
            ConfigError::TypeMismatch { key, expected } => {
                write!(f, "Config type mismatch for '{key}': expected {expected}")
            }
            ConfigError::Load(msg) => write!(f, "Config load error: {msg}"),
            ConfigError::MissingProfileFile(path) => {
                write!(f, "Required profile configuration file not found: {path}")
            }
            ConfigError::UnresolvedPlaceholder(key) => {
                write!(f, "Unresolvable placeholder '${{{key}}}' (no default given)")
            }
            ConfigError::CircularPlaceholder(chain) => {
                write!(f, "Circular placeholder substitution: {chain}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Identity of the source that supplied a configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Framework-bundled defaults document.
    Defaults,
    /// Environment variable fallback (the variable name is recorded).
    Environment(String),
    /// The base `application.yaml` (path recorded).
    ApplicationFile(String),
    /// A profile overlay `application-<profile>.yaml` (path recorded).
    ProfileFile(String),
    /// Set programmatically via [`ConfigStore::set`].
    Programmatic,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Defaults => write!(f, "defaults"),
            Source::Environment(var) => write!(f, "environment ({var})"),
            Source::ApplicationFile(path) => write!(f, "application-file ({path})"),
            Source::ProfileFile(path) => write!(f, "profile-file ({path})"),
            Source::Programmatic => write!(f, "programmatic"),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: ConfigValue,
    source: Source,
}

/// Builder for loading a [`ConfigStore`] from layered sources.
///
/// Sources are applied in ascending precedence: bundled defaults, then
/// `MITSUKI_*` environment variables, then `application.yaml`, then the
/// profile overlay. A higher source overwrites (and re-attributes) keys
/// set by a lower one.
pub struct ConfigLoader {
    dir: PathBuf,
    profile: Option<String>,
    require_profile_file: bool,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            dir: PathBuf::from("."),
            profile: None,
            require_profile_file: false,
        }
    }

    /// Directory containing the `application.yaml` files (default: cwd).
    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    /// Fallback profile if [`PROFILE_VAR`] is unset. Empty string = base only.
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Fail with [`ConfigError::MissingProfileFile`] if the profile overlay
    /// file does not exist. By default its absence is tolerated.
    pub fn require_profile_file(mut self) -> Self {
        self.require_profile_file = true;
        self
    }

    pub fn load(self) -> Result<ConfigStore, ConfigError> {
        let profile = std::env::var(PROFILE_VAR)
            .ok()
            .filter(|p| !p.is_empty())
            .or(self.profile)
            .unwrap_or_default();

        let mut entries: HashMap<String, Entry> = HashMap::new();

        // 1. Framework defaults.
        let mut defaults = HashMap::new();
        loader::load_yaml_str(DEFAULTS_YAML, &mut defaults)?;
        for (key, value) in defaults {
            entries.insert(
                key,
                Entry {
                    value,
                    source: Source::Defaults,
                },
            );
        }

        // 2. `.env` files populate the process environment without
        //    overwriting variables that are already set.
        let _ = dotenvy::dotenv();
        if !profile.is_empty() {
            let _ = dotenvy::from_filename(format!(".env.{profile}"));
        }

        // 3. Environment fallback: MITSUKI_SERVER_PORT -> server.port.
        let env_prefix = format!("{ENV_PREFIX}_");
        for (var, raw) in std::env::vars() {
            if var == PROFILE_VAR || !var.starts_with(&env_prefix) {
                continue;
            }
            let key = var[env_prefix.len()..].to_lowercase().replace('_', ".");
            if key.is_empty() {
                continue;
            }
            entries.insert(
                key,
                Entry {
                    value: ConfigValue::String(raw),
                    source: Source::Environment(var),
                },
            );
        }

        // 4. Base application file.
        let base_path = self.dir.join("application.yaml");
        Self::overlay_file(&base_path, &mut entries, |p| Source::ApplicationFile(p))?;

        // 5. Profile overlay.
        if !profile.is_empty() {
            let profile_path = self.dir.join(format!("application-{profile}.yaml"));
            let loaded =
                Self::overlay_file(&profile_path, &mut entries, |p| Source::ProfileFile(p))?;
            if self.require_profile_file && !loaded {
                return Err(ConfigError::MissingProfileFile(
                    profile_path.display().to_string(),
                ));
            }
        }

        Ok(ConfigStore { entries, profile })
    }

    fn overlay_file(
        path: &Path,
        entries: &mut HashMap<String, Entry>,
        source: impl Fn(String) -> Source,
    ) -> Result<bool, ConfigError> {
        let mut values = HashMap::new();
        let loaded = loader::load_yaml_file(path, &mut values)?;
        if loaded {
            let src = source(path.display().to_string());
            for (key, value) in values {
                entries.insert(
                    key,
                    Entry {
                        value,
                        source: src.clone(),
                    },
                );
            }
        }
        Ok(loaded)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// The merged application configuration.
///
/// Write-once: built by [`ConfigLoader`] (plus programmatic [`set`] calls
/// before startup completes) and read-only thereafter. Every key records the
/// provenance of the source that supplied its final value.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    entries: HashMap<String, Entry>,
    profile: String,
}

impl ConfigStore {
    /// Load configuration from the current directory with the profile taken
    /// from [`PROFILE_VAR`].
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Create a config from a YAML string (useful for testing).
    pub fn from_yaml_str(yaml: &str, profile: &str) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        loader::load_yaml_str(yaml, &mut values)?;
        let entries = values
            .into_iter()
            .map(|(key, value)| {
                (
                    key,
                    Entry {
                        value,
                        source: Source::ApplicationFile("<inline>".to_string()),
                    },
                )
            })
            .collect();
        Ok(ConfigStore {
            entries,
            profile: profile.to_string(),
        })
    }

    /// Create an empty config (useful for testing).
    pub fn empty() -> Self {
        ConfigStore {
            entries: HashMap::new(),
            profile: String::new(),
        }
    }

    /// Set a value programmatically. Programmatic values win over every
    /// file or environment source and are attributed accordingly.
    pub fn set(&mut self, key: &str, value: impl Into<ConfigValue>) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.into(),
                source: Source::Programmatic,
            },
        );
    }

    /// Get a typed value for the given dot-separated key.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if the key does not exist, or
    /// `ConfigError::TypeMismatch` if the value cannot be converted.
    pub fn get<V: FromConfigValue>(&self, key: &str) -> Result<V, ConfigError> {
        let entry = self
            .entries
            .get(key)
            .ok_or_else(|| ConfigError::NotFound(key.to_string()))?;
        V::from_config_value(&entry.value, key)
    }

    /// Get a typed value, returning a default if the key is missing.
    ///
    /// A present-but-uncoercible value still surfaces as an error.
    pub fn get_or<V: FromConfigValue>(&self, key: &str, default: V) -> Result<V, ConfigError> {
        match self.get(key) {
            Ok(v) => Ok(v),
            Err(ConfigError::NotFound(_)) => Ok(default),
            Err(e) => Err(e),
        }
    }

    /// Raw access to the stored value for a key.
    pub fn raw(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.get(key).map(|e| &e.value)
    }

    /// Check whether a key exists in the config.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// The active profile name. Empty string means base only.
    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Which source supplied the final value for `key`.
    pub fn provenance_of(&self, key: &str) -> Option<&Source> {
        self.entries.get(key).map(|e| &e.source)
    }

    /// Provenance for every key in the final configuration.
    pub fn provenance(&self) -> HashMap<String, Source> {
        self.entries
            .iter()
            .map(|(k, e)| (k.clone(), e.source.clone()))
            .collect()
    }

    /// Resolve `${key}` and `${key:default}` placeholders in a template.
    pub fn substitute(&self, template: &str) -> Result<String, ConfigError> {
        substitute::expand(template, &|key: &str| {
            self.entries.get(key).and_then(|e| e.value.render())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_store_has_nothing() {
        let config = ConfigStore::empty();
        assert!(config.get::<String>("nope").is_err());
        assert_eq!(config.profile(), "");
    }

    #[test]
    fn set_and_get() {
        let mut config = ConfigStore::empty();
        config.set("app.name", "demo");
        assert_eq!(config.get::<String>("app.name").unwrap(), "demo");
        assert_eq!(
            config.provenance_of("app.name"),
            Some(&Source::Programmatic)
        );
    }

    #[test]
    fn get_or_default() {
        let config = ConfigStore::empty();
        assert_eq!(config.get_or("missing", 42i64).unwrap(), 42);
    }

    #[test]
    fn get_or_still_rejects_bad_coercion() {
        let mut config = ConfigStore::empty();
        config.set("port", "eight");
        assert!(config.get_or("port", 80i64).is_err());
    }

    #[test]
    fn substitute_against_store() {
        let mut config = ConfigStore::empty();
        config.set("server.port", 9000i64);
        assert_eq!(
            config.substitute("http://localhost:${server.port}").unwrap(),
            "http://localhost:9000"
        );
    }

    #[test]
    fn substitute_missing_without_default_errors() {
        let config = ConfigStore::empty();
        assert!(matches!(
            config.substitute("${a.b}"),
            Err(ConfigError::UnresolvedPlaceholder(_))
        ));
        assert_eq!(config.substitute("${a.b:x}").unwrap(), "x");
    }

    #[test]
    fn from_yaml_str_flattens() {
        let config = ConfigStore::from_yaml_str("server:\n  host: 0.0.0.0\n", "test").unwrap();
        assert_eq!(config.get::<String>("server.host").unwrap(), "0.0.0.0");
        assert_eq!(config.profile(), "test");
    }
}
