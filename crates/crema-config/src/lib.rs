//! Shared configuration for crema hosts.
//!
//! TOML profiles, token resolution (env + keyring + plaintext), and
//! translation to `crema_core::MachineConfig`. The CLI layers its flag
//! overrides on top of this.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crema_core::{MachineConfig, MachineModel, SyncConfig, TlsVerification};

/// Keyring service name; entries are keyed `<profile>/token`.
pub const KEYRING_SERVICE: &str = "crema";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no token configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named explicitly.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named machine profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Profile names, sorted.
    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default)]
    pub insecure: bool,

    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            insecure: false,
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_poll_interval() -> u64 {
    30
}

/// A named machine profile.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// Gateway base URL (cloud gateway or local bridge).
    pub url: String,

    pub serial_number: String,

    /// Machine model (`GS3 AV`, `GS3 MP`, `Linea Mini`, `Micra`).
    pub model: MachineModel,

    /// Display name; defaults to the serial number.
    pub machine_name: Option<String>,

    /// Bearer token (plaintext; prefer keyring or `token_env`).
    pub token: Option<String>,

    /// Environment variable holding the bearer token.
    pub token_env: Option<String>,

    /// Open the websocket push channel in long-running commands.
    #[serde(default)]
    pub use_push_channel: bool,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override timeout.
    pub timeout: Option<u64>,
}

impl Profile {
    pub fn new(url: impl Into<String>, serial_number: impl Into<String>, model: MachineModel) -> Self {
        Self {
            url: url.into(),
            serial_number: serial_number.into(),
            model,
            machine_name: None,
            token: None,
            token_env: None,
            use_push_channel: false,
            poll_interval_secs: default_poll_interval(),
            ca_cert: None,
            insecure: None,
            timeout: None,
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "crema", "crema").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("crema");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the default file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path`, layered under `CREMA_*` environment variables.
///
/// Nested keys use a double underscore: `CREMA_DEFAULTS__TIMEOUT=10`,
/// `CREMA_PROFILES__HOME__URL=http://...`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("CREMA_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file is missing or unreadable.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_else(|e| {
        tracing::debug!(error = %e, "using default configuration");
        Config::default()
    })
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution ────────────────────────────────────────────────

/// Resolve the bearer token: `token_env` → keyring → plaintext.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    resolve_token_with(profile, profile_name, |name| std::env::var(name).ok())
}

/// Like [`resolve_token`], with an injectable environment lookup.
pub fn resolve_token_with(
    profile: &Profile,
    profile_name: &str,
    lookup_env: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    // 1. Profile's token_env → env var lookup
    if let Some(ref env_name) = profile.token_env {
        if let Some(val) = lookup_env(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name)) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref token) = profile.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store a token in the system keyring for `profile_name`.
pub fn store_token(profile_name: &str, token: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name))?;
    entry.set_password(token)?;
    Ok(())
}

fn keyring_user(profile_name: &str) -> String {
    format!("{profile_name}/token")
}

// ── Profile → MachineConfig ─────────────────────────────────────────

/// Build a `MachineConfig` from a profile, with no flag overrides.
///
/// A missing token is not an error: local bridges may run without auth.
pub fn profile_to_machine_config(
    profile: &Profile,
    profile_name: &str,
) -> Result<MachineConfig, ConfigError> {
    let url: url::Url = profile.url.parse().map_err(|_| ConfigError::Validation {
        field: "url".into(),
        reason: format!("invalid URL: {}", profile.url),
    })?;

    if profile.serial_number.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "serial_number".into(),
            reason: "must not be empty".into(),
        });
    }

    let token = match resolve_token(profile, profile_name) {
        Ok(token) => Some(token),
        Err(ConfigError::NoCredentials { .. }) => None,
        Err(e) => return Err(e),
    };

    let tls = if profile.insecure.unwrap_or(false) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    let mut config = MachineConfig::new(url, profile.serial_number.clone(), profile.model);
    config.machine_name.clone_from(&profile.machine_name);
    config.token = token;
    config.tls = tls;
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or_else(default_timeout));
    config.sync = SyncConfig {
        poll_interval: Duration::from_secs(profile.poll_interval_secs),
        use_push_channel: profile.use_push_channel,
        ..SyncConfig::default()
    };
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    const SAMPLE: &str = r#"
default_profile = "kitchen"

[defaults]
output = "json"
timeout = 10

[profiles.kitchen]
url = "https://gw.example.com"
serial_number = "GS012345"
model = "GS3 AV"
machine_name = "Kitchen"
token = "plain-token"
use_push_channel = true
poll_interval_secs = 15

[profiles.bridge]
url = "http://192.168.1.40:8081"
serial_number = "LM012345"
model = "lm"
insecure = true
"#;

    fn write_sample(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        path
    }

    #[test]
    fn loads_profiles_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&write_sample(&dir)).unwrap();

        assert_eq!(cfg.default_profile.as_deref(), Some("kitchen"));
        assert_eq!(cfg.defaults.output, "json");
        assert_eq!(cfg.profile_names(), vec!["bridge", "kitchen"]);

        let bridge = &cfg.profiles["bridge"];
        assert_eq!(bridge.model, MachineModel::LineaMini);
        assert_eq!(bridge.poll_interval_secs, 30);
        assert!(!bridge.use_push_channel);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(cfg.default_profile.as_deref(), Some("default"));
        assert_eq!(cfg.defaults.timeout, 30);
        assert!(cfg.profiles.is_empty());
    }

    #[test]
    fn save_then_load_keeps_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        let mut profile = Profile::new("http://10.0.0.2", "MR000001", MachineModel::LineaMicra);
        profile.token_env = Some("MICRA_TOKEN".into());
        cfg.profiles.insert("micra".into(), profile);

        save_config_to(&cfg, &path).unwrap();
        let loaded = load_config_from(&path).unwrap();

        let micra = &loaded.profiles["micra"];
        assert_eq!(micra.model, MachineModel::LineaMicra);
        assert_eq!(micra.token_env.as_deref(), Some("MICRA_TOKEN"));
    }

    #[test]
    fn token_env_wins_over_plaintext() {
        let mut profile = Profile::new("http://10.0.0.2", "GS1", MachineModel::Gs3Av);
        profile.token = Some("plain".into());
        profile.token_env = Some("GS_TOKEN".into());

        let token = resolve_token_with(&profile, "crema-test-env-wins", |name| {
            (name == "GS_TOKEN").then(|| "from-env".to_string())
        })
        .unwrap();

        assert_eq!(token.expose_secret(), "from-env");
    }

    #[test]
    fn unset_token_env_falls_back_to_plaintext() {
        let mut profile = Profile::new("http://10.0.0.2", "GS1", MachineModel::Gs3Av);
        profile.token = Some("plain".into());
        profile.token_env = Some("GS_TOKEN".into());

        let token = resolve_token_with(&profile, "crema-test-fallback", |_| None).unwrap();

        assert_eq!(token.expose_secret(), "plain");
    }

    #[test]
    fn profile_translates_to_machine_config() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&write_sample(&dir)).unwrap();

        let machine = profile_to_machine_config(&cfg.profiles["kitchen"], "kitchen").unwrap();
        assert_eq!(machine.serial_number, "GS012345");
        assert_eq!(machine.display_name(), "Kitchen");
        assert_eq!(machine.model, MachineModel::Gs3Av);
        assert!(machine.token.is_some());
        assert!(machine.sync.use_push_channel);
        assert_eq!(machine.sync.poll_interval, Duration::from_secs(15));
        assert_eq!(machine.tls, TlsVerification::SystemDefaults);

        let bridge = profile_to_machine_config(&cfg.profiles["bridge"], "bridge").unwrap();
        assert_eq!(bridge.tls, TlsVerification::DangerAcceptInvalid);
    }

    #[test]
    fn invalid_url_is_rejected() {
        let profile = Profile::new("not a url", "GS1", MachineModel::Gs3Av);
        let err = profile_to_machine_config(&profile, "broken").unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "url"));
    }
}
