//! Download command - resolve identifiers and write their archives.

use anyhow::{bail, Context, Result};
use clap::Args;
use console::style;
use std::path::PathBuf;
use std::sync::Arc;

use sdo_core::config::{Config, ConfigLoader, RepoName, Repository, Settings};
use sdo_core::{
    BatchOutcome, Cancellation, Endpoints, HttpClient, Job, Mode, Packager, Pipeline, Remote,
    Resolver,
};

use crate::output::Reporter;

#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Identifiers to resolve, optionally with a game name (ID=NAME)
    #[arg(value_name = "ID[=NAME]", required = true)]
    pub ids: Vec<String>,

    /// Game name for the archive (single identifier only)
    #[arg(long)]
    pub name: Option<String>,

    /// Require a key/config file before accepting a repository
    #[arg(long, overrides_with = "no_strict")]
    pub strict: bool,

    /// Accept any repository that has the branch
    #[arg(long, overrides_with = "strict")]
    pub no_strict: bool,

    /// GitHub token for this run
    #[arg(long, value_name = "TOKEN", conflicts_with = "no_token")]
    pub token: Option<String>,

    /// Do not send the configured GitHub token
    #[arg(long)]
    pub no_token: bool,

    /// Output directory for archives
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Only scan these configured repositories (can be used multiple times)
    #[arg(long = "repo", value_name = "OWNER/NAME")]
    pub repos: Vec<RepoName>,

    /// Disable the progress spinner
    #[arg(long)]
    pub no_progress: bool,
}

/// Fold per-run flags into the loaded settings.
fn apply_flags(settings: &mut Settings, args: &DownloadArgs) {
    if args.strict {
        settings.strict_validation = true;
    }
    if args.no_strict {
        settings.strict_validation = false;
    }
    if let Some(token) = &args.token {
        settings.github_token = Some(token.clone());
        settings.use_github_token = true;
    }
    if args.no_token {
        settings.use_github_token = false;
    }
    if let Some(output) = &args.output {
        settings.output_dir = output.clone();
    }
}

fn repositories_for_run(config: &Config, requested: &[RepoName]) -> Result<Vec<Repository>> {
    if requested.is_empty() {
        return Ok(config.repositories.selected());
    }

    for name in requested {
        if config.repositories.get(name).is_none() {
            bail!("Repository {} is not configured (add it with `sdo repo add`)", name);
        }
    }
    Ok(config.repositories.restricted_to(requested).selected())
}

fn parse_jobs(args: &DownloadArgs) -> Result<(Vec<Job>, Vec<String>)> {
    if args.name.is_some() && args.ids.len() > 1 {
        bail!("--name can only be used with a single identifier; use ID=NAME instead");
    }

    let mut jobs = Vec::new();
    let mut invalid = Vec::new();
    for raw in &args.ids {
        match raw.parse::<Job>() {
            Ok(job) => match (&args.name, &job.game_name) {
                (Some(name), None) => jobs.push(job.with_name(name.clone())),
                _ => jobs.push(job),
            },
            Err(e) => invalid.push(format!("{}: {}", raw, e)),
        }
    }
    Ok((jobs, invalid))
}

pub async fn execute(args: DownloadArgs, verbose: u8) -> Result<i32> {
    let loader = ConfigLoader::new(true);
    let config = Config::load(&loader).context("Failed to load configuration")?;

    let mut settings = config.settings.clone();
    apply_flags(&mut settings, &args);

    let repositories = repositories_for_run(&config, &args.repos)?;
    if repositories.is_empty() {
        println!(
            "{} No repositories selected. Add one with `sdo repo add OWNER/NAME --type decrypted`.",
            style("Warning:").yellow()
        );
        return Ok(1);
    }

    let (jobs, invalid) = parse_jobs(&args)?;
    for message in &invalid {
        eprintln!("{} Invalid identifier {}", style("Error:").red(), message);
    }

    let cancel = Cancellation::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Interrupt received, cancelling");
                cancel.cancel();
            }
        });
    }

    let client = HttpClient::with_config(settings.http_config())
        .context("Failed to create HTTP client")?
        .with_cancellation(cancel.clone());
    let remote = Remote::new(Arc::new(client), Endpoints::default()).with_cancellation(cancel);

    let packager = Packager::new(&settings.output_dir);
    match packager.cleanup_stale() {
        Ok(0) => {}
        Ok(n) => log::info!("Removed {} stale working entries", n),
        Err(e) => log::warn!("Could not clean {}: {}", settings.output_dir.display(), e),
    }

    let mode = Mode::from_strict(settings.strict_validation);
    log::debug!("Scanning {} repositories in {:?} mode", repositories.len(), mode);
    let pipeline = Pipeline::new(Resolver::new(remote, mode), packager, repositories);

    let reporter = Reporter::new(!args.no_progress, verbose > 0);
    let report = pipeline.run(&jobs, &reporter).await;
    reporter.finish();

    println!();
    for entry in &report.entries {
        match &entry.outcome {
            BatchOutcome::Packaged(packaged) => println!(
                "{} {} -> {} (from {})",
                style("Packaged").green().bold(),
                entry.job,
                packaged.output.path.display(),
                packaged.repo
            ),
            BatchOutcome::NotFound => println!("{} {}", style("Not found").red(), entry.job),
            BatchOutcome::Failed(reason) => println!("{} {}: {}", style("Failed").red(), entry.job, reason),
            BatchOutcome::Cancelled => println!("{} {}", style("Cancelled").yellow(), entry.job),
        }
    }

    let succeeded = report.all_packaged() && invalid.is_empty() && report.entries.len() == jobs.len();
    Ok(if succeeded { 0 } else { 1 })
}
