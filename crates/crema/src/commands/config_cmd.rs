//! Config subcommand handlers.

use dialoguer::{Confirm, Input, Select};
use strum::IntoEnumIterator;

use crema_config::{Config, Profile};
use crema_core::MachineModel;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "********";

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        // ── Path ────────────────────────────────────────────────────
        ConfigCommand::Path => {
            println!("{}", crema_config::config_path().display());
            Ok(())
        }

        // ── Init: interactive wizard ────────────────────────────────
        ConfigCommand::Init => init(),

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let mut cfg = crema_config::load_config_or_default();
            redact(&mut cfg);
            let out = output::render_single(
                &global.output,
                &cfg,
                |c| serde_yaml::to_string(c).unwrap_or_default(),
                |c| c.profile_names().join("\n"),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Set <key> <value> ───────────────────────────────────────
        ConfigCommand::Set { key, value } => {
            let mut cfg = crema_config::load_config_or_default();
            let profile_name = config::active_profile_name(global, &cfg);

            if !cfg.profiles.contains_key(&profile_name) {
                return Err(CliError::ProfileNotFound {
                    name: profile_name,
                    available: available(&cfg),
                });
            }
            if let Some(profile) = cfg.profiles.get_mut(&profile_name) {
                set_value(profile, &key, value)?;
            }

            crema_config::save_config(&cfg)?;
            eprintln!("✓ Set {key} on profile '{profile_name}'");
            Ok(())
        }

        // ── Profiles ────────────────────────────────────────────────
        ConfigCommand::Profiles => {
            let cfg = crema_config::load_config_or_default();
            let default = cfg.default_profile.as_deref().unwrap_or("default");
            if cfg.profiles.is_empty() {
                eprintln!("No profiles configured. Run: crema config init");
            } else {
                for name in cfg.profile_names() {
                    let marker = if name == default { " *" } else { "" };
                    println!("{name}{marker}");
                }
            }
            Ok(())
        }

        // ── SetToken ────────────────────────────────────────────────
        ConfigCommand::SetToken => {
            let cfg = crema_config::load_config_or_default();
            let profile_name = config::active_profile_name(global, &cfg);

            if !cfg.profiles.contains_key(&profile_name) {
                return Err(CliError::ProfileNotFound {
                    name: profile_name,
                    available: available(&cfg),
                });
            }

            let token = rpassword::prompt_password(format!("Token for '{profile_name}': "))?;
            if token.is_empty() {
                return Err(CliError::Validation {
                    field: "token".into(),
                    reason: "token cannot be empty".into(),
                });
            }
            crema_config::store_token(&profile_name, &token)?;
            eprintln!("✓ Token stored in system keyring for profile '{profile_name}'");
            Ok(())
        }
    }
}

fn init() -> Result<(), CliError> {
    let config_path = crema_config::config_path();
    eprintln!("crema configuration wizard");
    eprintln!("   Config path: {}\n", config_path.display());

    let mut cfg = crema_config::load_config_or_default();

    let profile_name: String = Input::new()
        .with_prompt("Profile name")
        .default("default".into())
        .interact_text()?;

    let url: String = Input::new()
        .with_prompt("Gateway URL")
        .default("https://gw-lmz.lamarzocco.io".into())
        .validate_with(|input: &String| -> Result<(), String> {
            input
                .parse::<url::Url>()
                .map(|_| ())
                .map_err(|e| format!("invalid URL: {e}"))
        })
        .interact_text()?;

    let serial_number: String = Input::new()
        .with_prompt("Machine serial number")
        .interact_text()?;

    let models: Vec<MachineModel> = MachineModel::iter().collect();
    let model_names: Vec<String> = models.iter().map(ToString::to_string).collect();
    let model_index = Select::new()
        .with_prompt("Machine model")
        .items(&model_names)
        .default(0)
        .interact()?;
    let model = models.get(model_index).copied().unwrap_or(MachineModel::Gs3Av);

    let machine_name: String = Input::new()
        .with_prompt("Display name (optional)")
        .allow_empty(true)
        .interact_text()?;

    let use_push_channel = Confirm::new()
        .with_prompt("Use the push channel for live updates?")
        .default(true)
        .interact()?;

    let mut profile = Profile::new(url, serial_number, model);
    profile.use_push_channel = use_push_channel;
    if !machine_name.trim().is_empty() {
        profile.machine_name = Some(machine_name);
    }

    let token = rpassword::prompt_password("Bearer token (empty for none): ")?;
    if !token.is_empty() {
        let store_choices = &[
            "Store in system keyring (recommended)",
            "Save to config file (plaintext)",
        ];
        let store_selection = Select::new()
            .with_prompt("Where to store the token?")
            .items(store_choices)
            .default(0)
            .interact()?;
        if store_selection == 0 {
            crema_config::store_token(&profile_name, &token)?;
            eprintln!("   ✓ Token stored in system keyring");
        } else {
            profile.token = Some(token);
        }
    }

    let make_default = cfg.profiles.is_empty()
        || Confirm::new()
            .with_prompt(format!("Make '{profile_name}' the default profile?"))
            .default(true)
            .interact()?;
    if make_default {
        cfg.default_profile = Some(profile_name.clone());
    }
    cfg.profiles.insert(profile_name.clone(), profile);

    crema_config::save_config(&cfg)?;

    eprintln!("\n✓ Configuration written to {}", config_path.display());
    eprintln!("  Profile: {profile_name}");
    eprintln!("\n  Test it: crema status --profile {profile_name}");
    Ok(())
}

/// Apply one `config set` assignment to a profile.
fn set_value(profile: &mut Profile, key: &str, value: String) -> Result<(), CliError> {
    match key {
        "url" => {
            value.parse::<url::Url>().map_err(|_| CliError::Validation {
                field: "url".into(),
                reason: format!("invalid URL: {value}"),
            })?;
            profile.url = value;
        }
        "serial_number" | "serial-number" | "serial" => profile.serial_number = value,
        "model" => profile.model = config::parse_model(&value)?,
        "machine_name" | "machine-name" | "name" => profile.machine_name = Some(value),
        "token_env" | "token-env" => profile.token_env = Some(value),
        "use_push_channel" | "use-push-channel" | "push" => {
            profile.use_push_channel = parse_bool("use_push_channel", &value)?;
        }
        "poll_interval_secs" | "poll-interval-secs" | "poll_interval" => {
            profile.poll_interval_secs = parse_secs("poll_interval_secs", &value)?;
        }
        "insecure" => profile.insecure = Some(parse_bool("insecure", &value)?),
        "timeout" => profile.timeout = Some(parse_secs("timeout", &value)?),
        "ca_cert" | "ca-cert" => profile.ca_cert = Some(value.into()),
        other => {
            return Err(CliError::Validation {
                field: other.into(),
                reason: format!(
                    "unknown config key '{other}'. Valid keys: url, serial_number, model, \
                     machine_name, token_env, use_push_channel, poll_interval_secs, insecure, \
                     timeout, ca_cert"
                ),
            });
        }
    }
    Ok(())
}

fn parse_bool(field: &str, value: &str) -> Result<bool, CliError> {
    value.parse().map_err(|_| CliError::Validation {
        field: field.into(),
        reason: "must be 'true' or 'false'".into(),
    })
}

fn parse_secs(field: &str, value: &str) -> Result<u64, CliError> {
    value.parse().map_err(|_| CliError::Validation {
        field: field.into(),
        reason: "must be a number (seconds)".into(),
    })
}

fn redact(cfg: &mut Config) {
    for profile in cfg.profiles.values_mut() {
        if profile.token.is_some() {
            profile.token = Some(REDACTED.into());
        }
    }
}

fn available(cfg: &Config) -> String {
    let names = cfg.profile_names();
    if names.is_empty() {
        "(none)".into()
    } else {
        names.join(", ")
    }
}
