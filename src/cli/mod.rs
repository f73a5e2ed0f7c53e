//! Command-line surface and dispatch.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use crate::config::Preferences;
use crate::core::ForgeError;
use crate::pipeline::{self, RunOptions};
use crate::watch;

/// Assemble deployable component recipes from scripts, archives, and
/// descriptor fragments, then hand them to the fleet agent.
#[derive(Parser, Debug)]
#[command(name = "fleetforge", version, about, long_about = None)]
pub struct Cli {
    /// Input files, `key=value` parameter overrides, or a bare
    /// `<platform>:<name>` token
    pub inputs: Vec<String>,

    /// Print the deploy command instead of running it
    #[arg(long)]
    pub dry_run: bool,

    /// Deployment group for the created component
    #[arg(short, long)]
    pub group: Option<String>,

    /// Orchestration agent installation root (overrides FLEET_ROOT_PATH)
    #[arg(long, value_name = "DIR")]
    pub root_path: Option<String>,

    /// Object-storage bucket named in the artifact location reference
    #[arg(long)]
    pub bucket: Option<String>,

    /// Directory of templates shadowing the built-in ones
    #[arg(long, value_name = "DIR")]
    pub template_dir: Option<PathBuf>,

    /// Upload the archive and recipe after assembly
    #[arg(long)]
    pub upload: bool,

    /// Publish endpoint; implies --upload
    #[arg(long, value_name = "ENDPOINT")]
    pub to: Option<String>,

    /// Tail and classify the agent's logs (after the run, or alone when no
    /// inputs are given)
    #[arg(short, long)]
    pub watch: bool,

    /// Debug logging and full error chains
    #[arg(short, long)]
    pub verbose: bool,

    /// Directory the `<name>/recipes` and `<name>/artifacts` trees go under
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub workspace: PathBuf,
}

impl Cli {
    fn run_options(&self) -> RunOptions {
        RunOptions {
            inputs: self.inputs.clone(),
            dry_run: self.dry_run,
            group: self.group.clone(),
            root_path: self.expanded_root_path(),
            bucket: self.bucket.clone(),
            template_dir: self.template_dir.clone(),
            upload: self.upload,
            endpoint: self.to.clone(),
            workspace: self.workspace.clone(),
        }
    }

    fn expanded_root_path(&self) -> Option<String> {
        self.root_path.as_deref().map(|p| shellexpand::tilde(p).into_owned())
    }
}

pub async fn execute(cli: Cli) -> Result<()> {
    let prefs = Preferences::load();
    if !cli.inputs.is_empty() {
        pipeline::run(&cli.run_options(), &prefs).await?;
    } else if !cli.watch {
        return Err(ForgeError::MissingInput.into());
    }
    if cli.watch {
        let root = cli
            .expanded_root_path()
            .or_else(|| prefs.expanded_root_path())
            .or_else(|| std::env::var("FLEET_ROOT_PATH").ok())
            .unwrap_or_else(|| "/opt/fleet".to_string());
        watch::watch(&PathBuf::from(root).join("logs")).await?;
    }
    Ok(())
}
