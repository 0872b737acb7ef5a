use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sl",
    version,
    about = "SpecLedger: declare, lock and cross-reference specification dependencies"
)]
pub struct Cli {
    /// Run as if started in this directory
    #[arg(short = 'C', long = "dir", global = true, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Manage declared dependencies and the lockfile
    Deps(DepsArgs),
    /// Check references in specification documents
    Refs(RefsArgs),
    /// Inspect or clear the snapshot cache
    Cache(CacheArgs),
    Version,
}

#[derive(Args, Debug)]
pub struct DepsArgs {
    #[command(subcommand)]
    pub cmd: DepsCmd,
}

#[derive(Subcommand, Debug)]
pub enum DepsCmd {
    /// Declare a dependency
    Add(DepsAddArgs),
    /// List declared dependencies and their lock state
    List(DepsListArgs),
    /// Remove a dependency by URL or alias
    Remove(DepsRemoveArgs),
    /// Resolve every dependency and write the lockfile
    Resolve(DepsResolveArgs),
    /// Check that the lockfile covers the manifest
    Verify,
}

#[derive(Args, Debug, Clone)]
pub struct DepsAddArgs {
    /// Git repository URL (https://, http:// or git@)
    #[arg(value_name = "URL")]
    pub url: String,

    /// Branch, tag or ref
    #[arg(value_name = "VERSION", default_value = "main")]
    pub version: String,

    /// Path to the spec file inside the repository
    #[arg(value_name = "SPEC_PATH", conflicts_with = "detect")]
    pub spec_path: Option<String>,

    /// Short name for inline references (spec.<alias>#<section>)
    #[arg(long)]
    pub alias: Option<String>,

    /// Read the spec path from the dependency's own SpecLedger manifest
    #[arg(long)]
    pub detect: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DepsListArgs {
    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DepsRemoveArgs {
    /// Repository URL or alias
    #[arg(value_name = "URL_OR_ALIAS")]
    pub target: String,
}

#[derive(Args, Debug, Clone)]
pub struct DepsResolveArgs {
    /// Always clone; the cache is still refreshed
    #[arg(long)]
    pub no_cache: bool,

    /// Report every failing dependency instead of stopping at the first
    #[arg(long)]
    pub keep_going: bool,

    /// Concurrent fetches
    #[arg(long, short = 'j', value_name = "N")]
    pub jobs: Option<usize>,
}

#[derive(Args, Debug)]
pub struct RefsArgs {
    #[command(subcommand)]
    pub cmd: RefsCmd,
}

#[derive(Subcommand, Debug)]
pub enum RefsCmd {
    /// Validate inline references against the locked aliases
    Validate(RefsValidateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RefsValidateArgs {
    /// Documents to check (default: every *.md under specs/)
    #[arg(value_name = "FILES")]
    pub files: Vec<PathBuf>,

    /// Glob selecting documents when no FILES are given
    #[arg(long, default_value = "**/*.md")]
    pub include: String,

    /// Emit JSON instead of file:line:col lines
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub cmd: CacheCmd,
}

#[derive(Subcommand, Debug)]
pub enum CacheCmd {
    /// List cached snapshots
    List,
    /// Remove every cached snapshot
    Clear,
}
