//! `mirror profile list|add|remove`

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use mirror_core::{config, DailySchedule, ProfileName, SyncProfile};

#[derive(Subcommand, Debug)]
pub enum ProfileCommand {
    /// List configured profiles.
    List,

    /// Add a profile.
    Add(AddArgs),

    /// Remove a profile. Its synced files stay in the repository.
    Remove {
        name: String,
    },
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Profile name (e.g. "main", "beta").
    pub name: String,

    /// Archive repository URL (anything `git clone` accepts).
    #[arg(long)]
    pub source: String,

    /// Local git work tree that receives the mirror.
    #[arg(long)]
    pub repo: PathBuf,

    /// Directory inside the repository to replace on every sync.
    #[arg(long)]
    pub target: PathBuf,

    /// Branch to push to.
    #[arg(long)]
    pub branch: Option<String>,

    /// Remote to push to.
    #[arg(long)]
    pub remote: Option<String>,

    /// Branch or tag of the archive to fetch (default: its default branch).
    #[arg(long = "ref", value_name = "REF")]
    pub git_ref: Option<String>,

    /// Daily run time, HH:MM UTC.
    #[arg(long)]
    pub schedule: Option<DailySchedule>,

    /// Extra push attempts after a rejection.
    #[arg(long)]
    pub push_retries: Option<u32>,

    /// Commit message template; supports {target}, {source}, {revision}.
    #[arg(long)]
    pub message: Option<String>,
}

pub fn run(home: &Path, cmd: ProfileCommand) -> Result<()> {
    match cmd {
        ProfileCommand::List => list(home),
        ProfileCommand::Add(args) => add(home, args),
        ProfileCommand::Remove { name } => remove(home, &name),
    }
}

fn list(home: &Path) -> Result<()> {
    let profiles = config::list_profiles_at(home).context("failed to load config")?;
    if profiles.is_empty() {
        println!("No profiles configured.");
        println!("Run: mirror profile add <name> --source <url> --repo <path> --target <dir>");
        return Ok(());
    }

    for p in &profiles {
        println!("{}", p.name);
        println!("  source:   {}", p.source.url);
        if let Some(git_ref) = &p.source.git_ref {
            println!("  ref:      {git_ref}");
        }
        println!("  target:   {}", p.target_path().display());
        println!("  push to:  {}/{}", p.remote, p.branch);
        println!("  schedule: daily {} UTC", p.schedule);
    }
    Ok(())
}

fn add(home: &Path, args: AddArgs) -> Result<()> {
    let repo = args
        .repo
        .canonicalize()
        .with_context(|| format!("cannot resolve repository path '{}'", args.repo.display()))?;

    let mut profile = SyncProfile::new(args.name, args.source, repo, args.target);
    profile.source.git_ref = args.git_ref;
    if let Some(branch) = args.branch {
        profile.branch = branch;
    }
    if let Some(remote) = args.remote {
        profile.remote = remote;
    }
    if let Some(schedule) = args.schedule {
        profile.schedule = schedule;
    }
    if let Some(retries) = args.push_retries {
        profile.push_retries = retries;
    }
    if let Some(message) = args.message {
        profile.commit_message = message;
    }

    let name = profile.name.clone();
    let profile = config::add_profile_at(home, profile)
        .with_context(|| format!("failed to add profile '{name}'"))?;
    println!(
        "✓ Added profile '{}': {} → {} ({}/{}, daily {} UTC)",
        profile.name,
        profile.source.url,
        profile.target_path().display(),
        profile.remote,
        profile.branch,
        profile.schedule
    );
    Ok(())
}

fn remove(home: &Path, name: &str) -> Result<()> {
    let removed = config::remove_profile_at(home, &ProfileName::from(name))
        .with_context(|| format!("failed to remove profile '{name}'"))?;
    println!("✓ Removed profile '{}'", removed.name);
    Ok(())
}
