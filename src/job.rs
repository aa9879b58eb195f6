//! Job lifecycle and the ingest → join → map → write pipeline.
//!
//! Each stage carries a transformation context name. It shows up in log lines
//! and error chains so a failed run points at the stage that broke.

use std::{fs::File, path::Path, time::Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    config::JobConfig,
    frame::Frame,
    ingest::{self, IngestStats},
    join, mapping, sink,
    storage::Storage,
    table,
};

const JOIN_CONTEXT: &str = "join_left_right";
const MAPPING_CONTEXT: &str = "apply_mapping";
const SINK_CONTEXT: &str = "write_target";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Write,
    /// Print the first N output rows instead of writing them.
    Preview(usize),
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub name: String,
    pub location: String,
    pub objects: usize,
    pub rows: usize,
    pub malformed_rows: usize,
}

impl SourceSummary {
    fn new(name: &str, location: String, stats: &IngestStats) -> Self {
        Self {
            name: name.to_string(),
            location,
            objects: stats.objects_read,
            rows: stats.rows_read,
            malformed_rows: stats.malformed_rows,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub job_name: String,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u128,
    pub sources: Vec<SourceSummary>,
    pub joined_rows: usize,
    pub matched_rows: usize,
    pub output_rows: usize,
    pub output_columns: Vec<String>,
    pub written_objects: Vec<String>,
}

pub struct Job {
    name: String,
    run_id: Uuid,
    started_at: DateTime<Utc>,
    timer: Instant,
}

impl Job {
    pub fn init(name: &str) -> Self {
        let job = Self {
            name: name.to_string(),
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            timer: Instant::now(),
        };
        info!(
            "Job '{}' started (run {}) at {}",
            job.name,
            job.run_id,
            job.started_at.to_rfc3339()
        );
        job
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn run(&self, config: &JobConfig, storage: &Storage, mode: RunMode) -> Result<JobSummary> {
        let (left, left_stats) = ingest::read_source(storage, &config.sources.left)
            .with_context(|| format!("Stage '{}'", config.sources.left.name))?;
        let (right, right_stats) = ingest::read_source(storage, &config.sources.right)
            .with_context(|| format!("Stage '{}'", config.sources.right.name))?;

        let joined = join::join(&left, &right, &config.join, JOIN_CONTEXT)
            .with_context(|| format!("Stage '{JOIN_CONTEXT}'"))?;
        let output = mapping::apply_mappings(&joined.frame, &config.mappings, MAPPING_CONTEXT)
            .with_context(|| format!("Stage '{MAPPING_CONTEXT}'"))?;

        let written_objects = match mode {
            RunMode::Write => {
                sink::write_frame(storage, &config.sink, &output, self.run_id)
                    .with_context(|| format!("Stage '{SINK_CONTEXT}'"))?
                    .objects
            }
            RunMode::Preview(rows) => {
                print_preview(&output, rows);
                Vec::new()
            }
        };

        Ok(JobSummary {
            job_name: self.name.clone(),
            run_id: self.run_id,
            started_at: self.started_at,
            elapsed_ms: self.timer.elapsed().as_millis(),
            sources: vec![
                SourceSummary::new(
                    &config.sources.left.name,
                    config.sources.left.path.clone(),
                    &left_stats,
                ),
                SourceSummary::new(
                    &config.sources.right.name,
                    config.sources.right.path.clone(),
                    &right_stats,
                ),
            ],
            joined_rows: joined.frame.len(),
            matched_rows: joined.matched_rows,
            output_rows: output.len(),
            output_columns: output.columns().to_vec(),
            written_objects,
        })
    }

    pub fn commit(self, summary: &JobSummary, summary_path: Option<&Path>) -> Result<()> {
        if let Some(path) = summary_path {
            let file =
                File::create(path).with_context(|| format!("Creating summary file {path:?}"))?;
            serde_json::to_writer_pretty(file, summary).context("Writing job summary")?;
        }
        info!(
            "Job '{}' committed (run {}): {} output row(s) in {} object(s), {} ms",
            self.name,
            self.run_id,
            summary.output_rows,
            summary.written_objects.len(),
            self.timer.elapsed().as_millis()
        );
        Ok(())
    }
}

fn print_preview(frame: &Frame, rows: usize) {
    table::print_table(frame.columns(), &frame.display_rows(rows));
    info!("Displayed {} of {} row(s)", rows.min(frame.len()), frame.len());
}
