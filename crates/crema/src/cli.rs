//! Clap derive structures for the `crema` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// crema -- monitor and control La Marzocco espresso machines
#[derive(Debug, Parser)]
#[command(
    name = "crema",
    version,
    about = "Monitor and control La Marzocco espresso machines",
    long_about = "Reads machine status from a La Marzocco gateway (cloud or local bridge),\n\
        toggles machine switches, and streams live updates over the\n\
        gateway's push channel.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Machine profile to use
    #[arg(long, short = 'p', env = "CREMA_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Gateway URL (overrides profile)
    #[arg(long, short = 'u', env = "CREMA_URL", global = true)]
    pub url: Option<String>,

    /// Machine serial number (overrides profile)
    #[arg(long, short = 's', env = "CREMA_SERIAL", global = true)]
    pub serial: Option<String>,

    /// Machine model: "GS3 AV", "GS3 MP", "Linea Mini" (lm), "Micra" (lmu)
    #[arg(long, short = 'm', env = "CREMA_MODEL", global = true)]
    pub model: Option<String>,

    /// Bearer token
    #[arg(long, env = "CREMA_TOKEN", global = true, hide_env = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "CREMA_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "CREMA_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, env = "CREMA_TIMEOUT", default_value = "30", global = true)]
    pub timeout: u64,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain `key=value` lines (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the current machine status
    #[command(alias = "st")]
    Status(StatusArgs),

    /// Stream status changes until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// List and toggle machine switches
    #[command(alias = "sw")]
    Switches(SwitchesArgs),

    /// Show binary sensors (water reservoir, brew activity)
    Sensors,

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  STATUS / WATCH
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Only show these properties (repeatable)
    #[arg(long)]
    pub key: Vec<String>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Open the push channel for real-time deltas (brew activity)
    #[arg(long)]
    pub push: bool,

    /// Seconds between full pulls (defaults to the profile's interval)
    #[arg(long, short = 'i')]
    pub interval: Option<u64>,

    /// Only show these properties (repeatable)
    #[arg(long)]
    pub key: Vec<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  SWITCHES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct SwitchesArgs {
    #[command(subcommand)]
    pub command: SwitchesCommand,
}

#[derive(Debug, Subcommand)]
pub enum SwitchesCommand {
    /// List the switches this machine offers, with their state
    #[command(alias = "ls")]
    List,

    /// Turn a switch on
    On {
        /// Switch name: main, auto_on_off, prebrew, preinfusion, steam_boiler_enable
        name: String,
    },

    /// Turn a switch off
    Off {
        /// Switch name: main, auto_on_off, prebrew, preinfusion, steam_boiler_enable
        name: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Display the current configuration (tokens redacted)
    Show,

    /// Create a config file with guided setup
    Init,

    /// Set a value on the active profile
    Set {
        /// Profile key (url, serial_number, model, machine_name, token_env,
        /// use_push_channel, poll_interval_secs, insecure, timeout, ca_cert)
        key: String,

        /// Value to set
        value: String,
    },

    /// List configured profiles
    Profiles,

    /// Store a bearer token in the system keyring (for --profile or the default)
    SetToken,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
