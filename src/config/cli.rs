use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

use crate::domain::{posts::PostId, spaces::SpaceId};

/// Command-line arguments for the Canopy binary.
#[derive(Debug, Parser)]
#[command(
    name = "canopy",
    version,
    about = "Inspect and reorganise a Canopy space archive"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "CANOPY_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl CliArgs {
    pub fn overrides(&self) -> &RuntimeOverrides {
        match &self.command {
            Command::Tree(args) => &args.overrides,
            Command::Audit(args) => &args.overrides,
            Command::MoveSpace(args) => &args.overrides,
            Command::MovePost(args) => &args.overrides,
        }
    }
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print the space tree with direct and recursive post counts.
    Tree(TreeArgs),
    /// Verify cached counters and the hierarchy index against the archive.
    Audit(AuditArgs),
    /// Reparent a space together with its subtree.
    #[command(name = "move-space")]
    MoveSpace(MoveSpaceArgs),
    /// Refile a post under another space.
    #[command(name = "move-post")]
    MovePost(MovePostArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct RuntimeOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the maximum number of nesting levels for spaces.
    #[arg(long = "spaces-max-depth", value_name = "LEVELS")]
    pub spaces_max_depth: Option<u8>,

    /// Toggle the consistency audit that runs after the cache is loaded.
    #[arg(
        long = "cache-audit-on-load",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_audit_on_load: Option<bool>,
}

#[derive(Debug, Args, Clone)]
pub struct TreeArgs {
    #[command(flatten)]
    pub overrides: RuntimeOverrides,

    /// Archive to load.
    #[arg(value_name = "ARCHIVE", value_hint = ValueHint::FilePath)]
    pub archive: PathBuf,

    /// Print the tree as JSON.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub json: bool,
}

#[derive(Debug, Args, Clone)]
pub struct AuditArgs {
    #[command(flatten)]
    pub overrides: RuntimeOverrides,

    /// Archive to load.
    #[arg(value_name = "ARCHIVE", value_hint = ValueHint::FilePath)]
    pub archive: PathBuf,

    /// Print the audit report as JSON.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub json: bool,
}

#[derive(Debug, Args, Clone)]
pub struct MoveSpaceArgs {
    #[command(flatten)]
    pub overrides: RuntimeOverrides,

    /// Archive to load.
    #[arg(value_name = "ARCHIVE", value_hint = ValueHint::FilePath)]
    pub archive: PathBuf,

    /// Space to move.
    #[arg(long = "space", value_name = "ID")]
    pub space: SpaceId,

    /// New parent; omit to promote the space to a root.
    #[arg(long = "parent", value_name = "ID")]
    pub parent: Option<SpaceId>,

    /// Write the resulting archive here.
    #[arg(long = "output", value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct MovePostArgs {
    #[command(flatten)]
    pub overrides: RuntimeOverrides,

    /// Archive to load.
    #[arg(value_name = "ARCHIVE", value_hint = ValueHint::FilePath)]
    pub archive: PathBuf,

    /// Post to move.
    #[arg(long = "post", value_name = "ID")]
    pub post: PostId,

    /// Destination space.
    #[arg(long = "space", value_name = "ID")]
    pub space: SpaceId,

    /// Write the resulting archive here.
    #[arg(long = "output", value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,
}
