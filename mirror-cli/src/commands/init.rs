//! `mirror init`

use std::path::Path;

use anyhow::{Context, Result};

use mirror_core::config;

pub fn run(home: &Path) -> Result<()> {
    let path = config::config_path_at(home);
    let existed = path.exists();
    let cfg = config::init_at(home)
        .with_context(|| format!("failed to initialize {}", path.display()))?;

    if existed {
        println!(
            "✓ Config already present at {} ({} profile(s))",
            path.display(),
            cfg.profiles.len()
        );
    } else {
        println!("✓ Created {}", path.display());
        println!("  Next: mirror profile add <name> --source <url> --repo <path> --target <dir>");
    }
    Ok(())
}
