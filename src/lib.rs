pub mod cli;
pub mod config;
pub mod frame;
pub mod ingest;
pub mod io_utils;
pub mod job;
pub mod join;
pub mod mapping;
pub mod sink;
pub mod storage;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::Cli,
    config::JobConfig,
    job::{Job, RunMode},
    storage::Storage,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("txn_enrich", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    if let Some(path) = &cli.write_config {
        config
            .save(path)
            .with_context(|| format!("Writing job config to {path:?}"))?;
        info!("Job configuration written to {:?}", path);
        return Ok(());
    }

    let mode = match cli.preview {
        Some(rows) => RunMode::Preview(rows),
        None => RunMode::Write,
    };
    config
        .validate(mode == RunMode::Write)
        .context("Validating job configuration")?;

    let job = Job::init(&cli.job_name);
    let storage = open_storage(&config, mode)?;
    let summary = job
        .run(&config, &storage, mode)
        .with_context(|| format!("Job '{}' (run {}) failed", job.name(), job.run_id()))?;
    job.commit(&summary, cli.summary.as_deref())
}

/// Loads the configured job and applies command-line location overrides.
pub fn resolve_config(cli: &Cli) -> Result<JobConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            JobConfig::load(path).with_context(|| format!("Loading job config {path:?}"))?
        }
        None => JobConfig::default(),
    };
    if let Some(path) = &cli.raw_source {
        config.sources.left.path = path.clone();
    }
    if let Some(path) = &cli.merchant_source {
        config.sources.right.path = path.clone();
    }
    if let Some(path) = &cli.target {
        config.sink.path = path.clone();
    }
    debug!("Effective job config: {:?}", config);
    Ok(config)
}

fn open_storage(config: &JobConfig, mode: RunMode) -> Result<Storage> {
    let mut locations = vec![
        config.sources.left.location()?,
        config.sources.right.location()?,
    ];
    if mode == RunMode::Write {
        locations.push(config.sink.location()?);
    }
    Storage::for_locations(&locations)
}
