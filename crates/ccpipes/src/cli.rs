//! Clap derive structures for the `ccpipes` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use ccpipes_config::Defaults;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// ccpipes -- inspect and edit ComputerCraft pipe factories
#[derive(Debug, Parser)]
#[command(
    name = "ccpipes",
    version,
    about = "Inspect and edit ccpipes factories from the command line",
    long_about = "Works on factory snapshots offline (apply patches, diff, plan merges)\n\
        or live through a session relay.",
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
    /// Relay profile to use
    #[arg(long, short = 'p', env = "CCPIPES_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Output format [default: table, or `defaults.output` from config]
    #[arg(
        id = "output",
        long = "output",
        short = 'o',
        env = "CCPIPES_OUTPUT",
        value_name = "FORMAT",
        global = true
    )]
    output_flag: Option<OutputFormat>,

    /// When to use color output [default: auto, or `defaults.color` from config]
    #[arg(id = "color", long = "color", value_name = "WHEN", global = true)]
    color_flag: Option<ColorMode>,

    /// Effective output format, see [`GlobalOpts::apply_defaults`].
    #[arg(skip)]
    pub output: OutputFormat,

    #[arg(skip)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Seconds to wait for the relay before giving up
    #[arg(long, env = "CCPIPES_TIMEOUT", default_value = "30", global = true)]
    pub timeout: u64,
}

impl GlobalOpts {
    /// Settle `output` and `color`: a flag or environment variable wins, then
    /// the config file's `[defaults]`, then the built-in default.
    pub fn apply_defaults(&mut self, defaults: &Defaults) {
        self.output = self
            .output_flag
            .clone()
            .unwrap_or_else(|| config_default("output", &defaults.output));
        self.color = self
            .color_flag
            .clone()
            .unwrap_or_else(|| config_default("color", &defaults.color));
    }
}

fn config_default<T: ValueEnum + Default>(key: &str, value: &str) -> T {
    T::from_str(value, true).unwrap_or_else(|_| {
        tracing::warn!(key, value, "ignoring invalid value in config defaults");
        T::default()
    })
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    #[default]
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

#[derive(Debug, Clone, Default, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    #[default]
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Apply patch files to a factory snapshot
    Apply(ApplyArgs),

    /// Compare two factory snapshots
    Diff(DiffArgs),

    /// Plan a merge of machines or groups
    #[command(alias = "merge")]
    Combine(CombineArgs),

    /// List groups with their owning machine
    #[command(alias = "g")]
    Groups(GroupsArgs),

    /// Connect to a relay session and sync the factory
    Connect(ConnectArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Offline snapshot commands ────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ApplyArgs {
    /// Factory snapshot (JSON file, or - for stdin)
    pub factory: PathBuf,

    /// Patch files, applied in order. Each holds one delta or an array of deltas.
    #[arg(required = true)]
    pub patches: Vec<PathBuf>,
}

#[derive(Debug, Args)]
pub struct DiffArgs {
    /// Snapshot before
    pub old: PathBuf,

    /// Snapshot after
    pub new: PathBuf,

    /// Print the raw delta instead of a change summary
    #[arg(long)]
    pub delta: bool,
}

#[derive(Debug, Args)]
pub struct GroupsArgs {
    /// Factory snapshot (JSON file, or - for stdin)
    pub factory: PathBuf,

    /// Only groups owned by this machine
    #[arg(long, short = 'm')]
    pub machine: Option<String>,
}

#[derive(Debug, Args)]
pub struct CombineArgs {
    #[command(subcommand)]
    pub command: CombineCommand,
}

#[derive(Debug, Subcommand)]
pub enum CombineCommand {
    /// Merge source machines into a target machine
    Machines(CombineTargetArgs),

    /// Merge source groups into a target group
    Groups(CombineTargetArgs),
}

#[derive(Debug, Args)]
pub struct CombineTargetArgs {
    /// Factory snapshot (JSON file, or - for stdin)
    #[arg(long, short = 'f')]
    pub factory: PathBuf,

    /// ID of the entity that survives the merge
    #[arg(long, short = 't')]
    pub into: String,

    /// IDs of the entities merged into the target
    #[arg(required = true)]
    pub sources: Vec<String>,
}

// ── Live relay commands ──────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConnectArgs {
    /// Relay URL (overrides profile)
    #[arg(long, short = 'r', env = "CCPIPES_RELAY")]
    pub relay: Option<String>,

    /// Session to join (overrides profile)
    #[arg(long, short = 's', env = "CCPIPES_SESSION")]
    pub session: Option<String>,

    /// Keep running and print factory events until interrupted
    #[arg(long, short = 'w')]
    pub watch: bool,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Display current resolved configuration
    Show,

    /// List configured profiles
    Profiles,

    /// Add or update a profile
    Set {
        /// Profile name
        name: String,

        /// Relay WebSocket URL
        #[arg(long)]
        relay: Option<String>,

        /// Session to join on connect
        #[arg(long)]
        session: Option<String>,
    },

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> GlobalOpts {
        let mut argv = vec!["ccpipes"];
        argv.extend_from_slice(args);
        argv.extend_from_slice(&["groups", "factory.json"]);
        Cli::try_parse_from(argv).unwrap().global
    }

    fn defaults(output: &str, color: &str) -> Defaults {
        Defaults {
            output: output.into(),
            color: color.into(),
            ..Defaults::default()
        }
    }

    #[test]
    fn config_defaults_fill_unset_flags() {
        let mut global = parse(&[]);
        global.apply_defaults(&defaults("json-compact", "never"));
        assert_eq!(global.output, OutputFormat::JsonCompact);
        assert_eq!(global.color, ColorMode::Never);
    }

    #[test]
    fn flags_override_config_defaults() {
        let mut global = parse(&["-o", "plain", "--color", "always"]);
        global.apply_defaults(&defaults("json", "never"));
        assert_eq!(global.output, OutputFormat::Plain);
        assert_eq!(global.color, ColorMode::Always);
    }

    #[test]
    fn invalid_config_default_falls_back() {
        let mut global = parse(&[]);
        global.apply_defaults(&defaults("xml", "sometimes"));
        assert_eq!(global.output, OutputFormat::Table);
        assert_eq!(global.color, ColorMode::Auto);
    }
}
