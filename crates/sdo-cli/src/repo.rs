//! Repo command - manage the ordered repository list.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use console::style;

use sdo_core::config::{Config, ConfigLoader, RepoKind, RepoName, Repository, RepositoryList};

#[derive(Subcommand, Debug)]
pub enum RepoCommands {
    /// Show repositories in scan order
    List,

    /// Append a repository (or change the type of an existing one)
    Add {
        /// Repository as OWNER/NAME or a github.com URL
        name: RepoName,

        /// encrypted, decrypted or branch
        #[arg(long = "type", value_name = "TYPE")]
        kind: RepoKind,
    },

    /// Remove a repository
    Remove { name: RepoName },

    /// Include a repository in scans
    Select { name: RepoName },

    /// Exclude a repository from scans without removing it
    Deselect { name: RepoName },
}

pub fn execute(command: RepoCommands) -> Result<i32> {
    let loader = ConfigLoader::new(true);
    let mut config = Config::load(&loader).context("Failed to load configuration")?;

    let message = apply(&mut config.repositories, command)?;
    match message {
        Some(message) => {
            config
                .save_repositories(&loader)
                .with_context(|| format!("Failed to write {}", loader.repositories_path().display()))?;
            println!("{} {}", style("Success:").green().bold(), message);
        }
        None => print_list(&config.repositories),
    }
    Ok(0)
}

/// Apply a change to the list. Returns the confirmation to print, or `None`
/// for read-only commands.
fn apply(list: &mut RepositoryList, command: RepoCommands) -> Result<Option<String>> {
    let message = match command {
        RepoCommands::List => return Ok(None),
        RepoCommands::Add { name, kind } => {
            let message = format!("Added {} ({})", name, kind);
            list.add(Repository::new(name, kind));
            message
        }
        RepoCommands::Remove { name } => {
            if !list.remove(&name) {
                bail!("Repository {} is not configured", name);
            }
            format!("Removed {}", name)
        }
        RepoCommands::Select { name } => {
            if !list.set_selected(&name, true) {
                bail!("Repository {} is not configured", name);
            }
            format!("Selected {}", name)
        }
        RepoCommands::Deselect { name } => {
            if !list.set_selected(&name, false) {
                bail!("Repository {} is not configured", name);
            }
            format!("Deselected {}", name)
        }
    };
    Ok(Some(message))
}

fn print_list(list: &RepositoryList) {
    if list.is_empty() {
        println!("{} No repositories configured.", style("Info:").cyan());
        return;
    }

    for (index, repo) in list.iter().enumerate() {
        let mark = if repo.selected {
            style("[x]").green()
        } else {
            style("[ ]").dim()
        };
        println!("{:>3}. {} {:<40} {}", index + 1, mark, repo.name.to_string(), repo.kind);
    }
}
