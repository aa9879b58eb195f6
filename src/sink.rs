//! CSV output to a storage location.
//!
//! Output is written as new part objects under the target location, named
//! `run-<epoch millis>-<run id>-part-r-<index>`. Objects are created, never
//! replaced, so repeated runs append and a name clash fails the write.

use anyhow::{Context, Result};
use chrono::Utc;
use log::info;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    config::SinkConfig,
    frame::{Frame, Row},
    io_utils::{self, SharedBuffer},
    storage::{Location, Storage},
};

#[derive(Debug, Clone, Default, Serialize)]
pub struct WriteSummary {
    pub rows_written: usize,
    pub objects: Vec<String>,
}

pub fn part_name(run_millis: i64, run_id: Uuid, index: usize) -> String {
    format!("run-{run_millis}-{}-part-r-{index:05}", run_id.simple())
}

pub fn write_frame(
    storage: &Storage,
    sink: &SinkConfig,
    frame: &Frame,
    run_id: Uuid,
) -> Result<WriteSummary> {
    let target = sink.location()?;
    let store = storage.store_for(&target)?;
    let run_millis = Utc::now().timestamp_millis();

    let chunk_size = match sink.max_records_per_file {
        0 => frame.len().max(1),
        limit => limit,
    };
    let mut summary = WriteSummary::default();
    let mut chunks: Vec<&[Row]> = frame.rows().chunks(chunk_size).collect();
    if chunks.is_empty() {
        chunks.push(&[]);
    }

    for (index, chunk) in chunks.into_iter().enumerate() {
        let location: Location = target.child(&part_name(run_millis, run_id, index));
        let bytes = encode_rows(frame.columns(), chunk, sink)
            .with_context(|| format!("Encoding part {index} for {target}"))?;
        store
            .put(&location, bytes)
            .with_context(|| format!("Writing part {index} to {target}"))?;
        info!("Wrote {} row(s) to {}", chunk.len(), location);
        summary.rows_written += chunk.len();
        summary.objects.push(location.to_string());
    }
    Ok(summary)
}

/// Serializes rows as CSV bytes. Null cells become empty fields.
pub fn encode_rows(columns: &[String], rows: &[Row], sink: &SinkConfig) -> Result<Vec<u8>> {
    let buffer = SharedBuffer::default();
    {
        let mut writer = io_utils::open_csv_writer(buffer.clone(), &sink.format)?;
        if sink.write_header {
            writer.write_record(columns).context("Writing CSV header")?;
        }
        for row in rows {
            writer
                .write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))
                .context("Writing CSV row")?;
        }
        writer.flush().context("Flushing CSV output")?;
    }
    Ok(buffer.take())
}
