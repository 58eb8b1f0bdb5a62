//! Flag-aware resolution of the active machine.
//!
//! Profiles live in `crema-config`; this layer applies `--url`,
//! `--serial`, `--model`, `--token`, `--insecure` and `--timeout` on top
//! and falls back to flags alone when no profile exists.

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crema_config::Config;
use crema_core::{MachineConfig, MachineModel, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build a `MachineConfig` from the config file, profile, and CLI overrides.
pub fn build_machine_config(global: &GlobalOpts) -> Result<MachineConfig, CliError> {
    let cfg = crema_config::load_config_or_default();
    build_machine_config_from(global, &cfg)
}

pub fn build_machine_config_from(
    global: &GlobalOpts,
    cfg: &Config,
) -> Result<MachineConfig, CliError> {
    let profile_name = active_profile_name(global, cfg);

    if let Some(profile) = cfg.profiles.get(&profile_name) {
        let mut config = crema_config::profile_to_machine_config(profile, &profile_name)?;
        apply_overrides(&mut config, global)?;
        return Ok(config);
    }

    // An explicitly named profile that doesn't exist is an error, not a fallback.
    if global.profile.is_some() {
        return Err(CliError::ProfileNotFound {
            name: profile_name,
            available: available_profiles(cfg),
        });
    }

    // No profile -- build from CLI flags / env vars alone
    let (Some(url), Some(serial), Some(model)) = (
        global.url.as_deref(),
        global.serial.as_deref(),
        global.model.as_deref(),
    ) else {
        return Err(CliError::NoConfig {
            path: crema_config::config_path().display().to_string(),
        });
    };

    let mut config = MachineConfig::new(parse_url(url)?, serial, parse_model(model)?);
    config.tls = if global.insecure || cfg.defaults.insecure {
        TlsVerification::DangerAcceptInvalid
    } else {
        TlsVerification::SystemDefaults
    };
    config.token = global.token.clone().map(SecretString::from);
    config.timeout = Duration::from_secs(global.timeout);
    Ok(config)
}

fn apply_overrides(config: &mut MachineConfig, global: &GlobalOpts) -> Result<(), CliError> {
    if let Some(ref url) = global.url {
        config.url = parse_url(url)?;
    }
    if let Some(ref serial) = global.serial {
        config.serial_number.clone_from(serial);
    }
    if let Some(ref model) = global.model {
        config.model = parse_model(model)?;
    }
    if let Some(ref token) = global.token {
        config.token = Some(SecretString::from(token.clone()));
    }
    if global.insecure {
        config.tls = TlsVerification::DangerAcceptInvalid;
    }
    config.timeout = Duration::from_secs(global.timeout);
    Ok(())
}

pub fn parse_model(raw: &str) -> Result<MachineModel, CliError> {
    MachineModel::from_str(raw.trim()).map_err(|_| CliError::Validation {
        field: "model".into(),
        reason: format!("unknown model '{raw}' (expected GS3 AV, GS3 MP, Linea Mini or Micra)"),
    })
}

fn parse_url(raw: &str) -> Result<url::Url, CliError> {
    raw.parse().map_err(|_| CliError::Validation {
        field: "url".into(),
        reason: format!("invalid URL: {raw}"),
    })
}

fn available_profiles(cfg: &Config) -> String {
    let names = cfg.profile_names();
    if names.is_empty() {
        "(none)".into()
    } else {
        names.join(", ")
    }
}
