use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, bail};
use clap::Parser;
use nextsync::config::{SyncConfig, resolve_local_path};
use nextsync::media::ExifToolExtractor;
use nextsync::progress::UploadProgressBar;
use nextsync::sync::bucket::Granularity;
use nextsync::sync::engine::SyncEngine;
use nextsync::sync::local::collect_files;
use nextsync::sync::paths::{join_remote, normalize_remote};
use nextsync::sync::remote::Retrying;
use nextsync_core::{NextcloudClient, ServerStatus};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Parser)]
#[command(
    name = "nextsync",
    version,
    about = "Upload a local media folder into date-sorted Nextcloud folders"
)]
struct Cli {
    /// Local folder to upload (searched recursively)
    #[arg(long)]
    local_path: String,

    /// Remote folder the date hierarchy is created in
    #[arg(long)]
    remote_path: String,

    /// Depth of the date hierarchy
    #[arg(long, value_enum, default_value_t = Granularity::Day)]
    depth: Granularity,

    /// Upload everything directly into the remote folder
    #[arg(long)]
    flat: bool,

    /// Create a missing remote folder without asking
    #[arg(short, long)]
    yes: bool,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn granularity(&self) -> Option<Granularity> {
        (!self.flat).then_some(self.depth)
    }
}

fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "nextsync=info,nextsync_core=info",
        1 => "nextsync=debug,nextsync_core=debug",
        _ => "nextsync=trace,nextsync_core=trace",
    }
}

fn init_tracing(verbosity: u8, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter(verbosity).into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn parse_answer(line: &str) -> Option<bool> {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

async fn confirm(question: &str) -> anyhow::Result<bool> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        println!("{question} Yes(y) or No(n)");
        match lines.next_line().await? {
            Some(line) => {
                if let Some(answer) = parse_answer(&line) {
                    return Ok(answer);
                }
            }
            None => return Ok(false),
        }
    }
}

/// Makes sure `root` exists, creating it (and missing parents) after asking.
async fn ensure_remote_root(
    client: &NextcloudClient,
    root: &str,
    assume_yes: bool,
) -> anyhow::Result<()> {
    if client
        .exists_folder(root)
        .await
        .with_context(|| format!("cannot check remote folder {root}"))?
    {
        return Ok(());
    }
    let question = format!("Remote folder {root} does not exist. Create it?");
    if !assume_yes && !confirm(&question).await? {
        bail!("remote folder {root} does not exist");
    }

    let mut current = String::from("/");
    for segment in root.split('/').filter(|segment| !segment.is_empty()) {
        current = join_remote(&current, segment);
        match client.create_folder(&current).await {
            Ok(()) => tracing::info!(path = %current, "created remote folder"),
            Err(err) if err.is_already_exists() => {}
            Err(err) => {
                return Err(err).with_context(|| format!("cannot create remote folder {current}"));
            }
        }
    }
    Ok(())
}

async fn run(cli: Cli, config: SyncConfig) -> anyhow::Result<ExitCode> {
    let local_root: PathBuf = resolve_local_path(&cli.local_path);
    if !local_root.is_dir() {
        bail!("local path {} is not a directory", local_root.display());
    }
    let remote_root = normalize_remote(&cli.remote_path)?;

    let client = NextcloudClient::new(&config.server_url, &config.username, &config.password)
        .context("invalid SERVER_URL")?;
    match client
        .server_status()
        .await
        .context("cannot reach the server")?
    {
        ServerStatus::Online => {}
        ServerStatus::Maintenance => bail!("server is in maintenance mode, try again later"),
    }
    ensure_remote_root(&client, &remote_root, cli.yes).await?;

    let files = collect_files(&local_root)
        .with_context(|| format!("cannot scan {}", local_root.display()))?;
    if files.is_empty() {
        println!("Nothing to upload in {}", local_root.display());
        return Ok(ExitCode::SUCCESS);
    }
    tracing::info!(
        user = client.username(),
        local = %local_root.display(),
        remote = %remote_root,
        files = files.len(),
        granularity = ?cli.granularity(),
        "starting sync"
    );

    let bar = UploadProgressBar::new(0);
    let observer = bar.clone();
    let engine = SyncEngine::new(
        Retrying::new(client, config.max_retries),
        ExifToolExtractor::new(&config.exiftool),
        config.limits,
    )
    .with_progress(move |progress, outcome| observer.update(progress, outcome));

    let report = engine
        .run(&files, &remote_root, cli.granularity())
        .await?;
    bar.finish();

    println!(
        "Uploaded {} of {} files ({} bytes)",
        report.succeeded(),
        report.outcomes.len(),
        report.uploaded_bytes
    );
    for failure in report.failures() {
        if let Err(err) = &failure.result {
            eprintln!("failed: {}: {err}", failure.local_path.display());
        }
    }
    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = SyncConfig::from_env()?;
    init_tracing(cli.verbose, config.log_file.as_deref())?;
    tracing::debug!(?config, "configuration loaded");
    run(cli, config).await
}
