//! Clean command - remove working directories and partial archives.

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use std::path::PathBuf;

use sdo_core::config::{Config, ConfigLoader};
use sdo_core::Packager;

#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Output directory to clean (defaults to the configured one)
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,
}

pub fn execute(args: CleanArgs) -> Result<i32> {
    let output_dir = match args.output {
        Some(dir) => dir,
        None => {
            let loader = ConfigLoader::new(true);
            Config::load(&loader)
                .context("Failed to load configuration")?
                .settings
                .output_dir
        }
    };

    let removed = Packager::new(&output_dir)
        .cleanup_stale()
        .with_context(|| format!("Failed to clean {}", output_dir.display()))?;

    if removed == 0 {
        println!("{} Nothing to clean in {}", style("Info:").cyan(), output_dir.display());
    } else {
        println!(
            "{} Removed {} stale entries from {}",
            style("Success:").green().bold(),
            removed,
            output_dir.display()
        );
    }
    Ok(0)
}
