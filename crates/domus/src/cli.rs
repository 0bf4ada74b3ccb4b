//! Clap derive structures for the `domus` CLI.
//!
//! Defines the command tree, global flags, and shared value types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use domus_core::Preset;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// domus -- feedback-first home automation from the command line
#[derive(Debug, Parser)]
#[command(
    name = "domus",
    version,
    about = "Control and watch home devices from the command line",
    long_about = "Switch lights and sockets, move window blinds, and watch what the hardware reports.\n\n\
        Displayed state always comes from device feedback; commands are\n\
        tracked until the device confirms them.",
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
    /// Profile to use
    #[arg(long, short = 'p', env = "DOMUS_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Realtime database URL (overrides profile)
    #[arg(long, env = "DOMUS_DATABASE_URL", global = true)]
    pub database_url: Option<String>,

    /// Project API key (overrides profile)
    #[arg(long, env = "DOMUS_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Sign-in email (overrides profile)
    #[arg(long, short = 'e', env = "DOMUS_EMAIL", global = true)]
    pub email: Option<String>,

    /// Sign-in password (prefer the keyring: `domus config set-password`)
    #[arg(long, env = "DOMUS_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "DOMUS_OUTPUT",
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

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "DOMUS_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
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
    /// Plain text, one value per line (scripting)
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
    /// List and control devices
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Stream device state, liveness, and alerts until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Inspect or initialize the shared settings document
    Settings(SettingsArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  DEVICES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// Show every device with its reported state
    #[command(alias = "ls")]
    List,

    /// Flip a switch
    Toggle {
        /// Device id, control key, or label
        device: String,

        #[command(flatten)]
        wait: WaitArgs,
    },

    /// Move a slider to a percentage
    Set {
        /// Device id, control key, or label
        device: String,

        /// Target position (0-100)
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        percent: u8,

        #[command(flatten)]
        wait: WaitArgs,
    },

    /// Move a slider to a stored preset position
    Preset {
        /// Device id, control key, or label
        device: String,

        /// Which preset to apply
        preset: PresetArg,

        #[command(flatten)]
        wait: WaitArgs,
    },

    /// Turn every switch off
    AllOff,
}

#[derive(Debug, Args)]
pub struct WaitArgs {
    /// Return as soon as the command is written
    #[arg(long)]
    pub no_wait: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PresetArg {
    Open,
    Half,
    Close,
}

impl From<PresetArg> for Preset {
    fn from(arg: PresetArg) -> Self {
        match arg {
            PresetArg::Open => Self::Open,
            PresetArg::Half => Self::Half,
            PresetArg::Close => Self::Close,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  WATCH
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Write logs to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  SETTINGS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct SettingsArgs {
    #[command(subcommand)]
    pub command: SettingsCommand,
}

#[derive(Debug, Subcommand)]
pub enum SettingsCommand {
    /// Print the effective settings (stored document or defaults)
    Show,

    /// Write the default settings document if none is stored
    Init {
        /// Overwrite an existing document
        #[arg(long)]
        force: bool,
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
    /// Create or update a profile with guided setup
    Init,

    /// Display the resolved configuration (secrets masked)
    Show,

    /// Print the config file location
    Path,

    /// Store the active profile's password in the system keyring
    SetPassword,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
