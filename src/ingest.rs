//! Schema-on-read CSV ingestion of a storage location into a [`Frame`].
//!
//! Each object carries its own header row. The frame's columns are the union
//! of every object's headers in first-seen order, and cells missing from an
//! object are null. Empty fields are null as well.

use std::collections::HashSet;

use anyhow::{Context, Result, bail};
use encoding_rs::Encoding;
use log::{debug, info, warn};

use crate::{
    config::SourceConfig,
    frame::Frame,
    io_utils,
    storage::{Location, Storage},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub objects_read: usize,
    pub rows_read: usize,
    pub malformed_rows: usize,
}

pub fn read_source(storage: &Storage, source: &SourceConfig) -> Result<(Frame, IngestStats)> {
    let location = source.location()?;
    let store = storage.store_for(&location)?;
    let objects = store
        .list(&location, source.recurse)
        .with_context(|| format!("Listing source '{}' at {}", source.name, location))?;
    info!(
        "Reading source '{}' from {} ({} object(s), recurse={})",
        source.name,
        location,
        objects.len(),
        source.recurse
    );

    let mut reader = FrameReader::new(source)?;
    for object in &objects {
        let bytes = store
            .get(object)
            .with_context(|| format!("Reading source '{}'", source.name))?;
        reader
            .read_object(object, &bytes)
            .with_context(|| format!("Parsing {object} for source '{}'", source.name))?;
    }
    reader.finish(&location)
}

/// Accumulates objects of one source into a single frame.
pub struct FrameReader<'a> {
    source: &'a SourceConfig,
    encoding: &'static Encoding,
    frame: Frame,
    stats: IngestStats,
}

impl<'a> FrameReader<'a> {
    pub fn new(source: &'a SourceConfig) -> Result<Self> {
        let encoding = io_utils::resolve_encoding(Some(&source.format.encoding))?;
        Ok(Self {
            source,
            encoding,
            frame: Frame::new(source.name.clone(), Vec::new()),
            stats: IngestStats::default(),
        })
    }

    pub fn read_object(&mut self, object: &Location, bytes: &[u8]) -> Result<()> {
        let bytes = io_utils::strip_bom(bytes);
        if bytes.is_empty() {
            debug!("Skipping empty object {object}");
            return Ok(());
        }

        let mut reader = io_utils::open_csv_reader(bytes, &self.source.format)?;
        let mut records = reader.byte_records();
        let headers = if self.source.format.with_header {
            match records.next() {
                Some(record) => {
                    let record = record.with_context(|| format!("Reading header of {object}"))?;
                    io_utils::decode_record(&record, self.encoding)?
                        .into_iter()
                        .map(|h| h.trim().to_string())
                        .collect::<Vec<_>>()
                }
                None => return Ok(()),
            }
        } else {
            Vec::new()
        };

        let mut mapping = self.column_mapping(&headers);
        let first_data_line = if self.source.format.with_header { 2 } else { 1 };
        let mut object_rows = 0usize;

        for (idx, record) in records.enumerate() {
            let line = idx + first_data_line;
            let record = record.with_context(|| format!("Reading row {line} of {object}"))?;
            let decoded = io_utils::decode_record(&record, self.encoding)
                .with_context(|| format!("Decoding row {line} of {object}"))?;

            if !self.source.format.with_header {
                while mapping.len() < decoded.len() {
                    let name = format!("col{}", mapping.len());
                    let position = match self.frame.column_index(&name) {
                        Some(position) => position,
                        None => self.frame.add_column(name),
                    };
                    mapping.push(position);
                }
            } else if decoded.len() != headers.len() {
                self.stats.malformed_rows += 1;
                if self.stats.malformed_rows > self.source.malformed_row_limit {
                    bail!(
                        "Row {line} of {object} has {} field(s), expected {}; malformed row limit of {} exceeded",
                        decoded.len(),
                        headers.len(),
                        self.source.malformed_row_limit
                    );
                }
                warn!(
                    "Skipping malformed row {line} of {object}: {} field(s), expected {}",
                    decoded.len(),
                    headers.len()
                );
                continue;
            }

            let mut row = vec![None; self.frame.columns().len()];
            for (value, position) in decoded.into_iter().zip(mapping.iter()) {
                if !value.is_empty() {
                    row[*position] = Some(value);
                }
            }
            self.frame.push_row(row)?;
            object_rows += 1;
        }

        debug!("Read {object_rows} row(s) from {object}");
        self.stats.objects_read += 1;
        self.stats.rows_read += object_rows;
        Ok(())
    }

    /// Frame position for each header, adding columns not seen before.
    /// Repeated or empty headers get a suffixed name that clashes with no
    /// other header of the object.
    fn column_mapping(&mut self, headers: &[String]) -> Vec<usize> {
        let reserved: HashSet<&str> = headers
            .iter()
            .map(String::as_str)
            .filter(|h| !h.is_empty())
            .collect();
        let mut assigned: HashSet<String> = HashSet::with_capacity(headers.len());
        let mut mapping = Vec::with_capacity(headers.len());
        for (idx, header) in headers.iter().enumerate() {
            let base = if header.is_empty() {
                format!("col{idx}")
            } else {
                header.clone()
            };
            let name = if assigned.contains(&base) {
                let mut counter = 1;
                loop {
                    let candidate = format!("{base}_{counter}");
                    if !assigned.contains(&candidate) && !reserved.contains(candidate.as_str()) {
                        break candidate;
                    }
                    counter += 1;
                }
            } else {
                base
            };
            if name != *header {
                debug!("Header {idx} ('{header}') read as column '{name}'");
            }
            assigned.insert(name.clone());
            let position = match self.frame.column_index(&name) {
                Some(position) => position,
                None => self.frame.add_column(name),
            };
            mapping.push(position);
        }
        mapping
    }

    pub fn finish(self, location: &Location) -> Result<(Frame, IngestStats)> {
        if self.stats.objects_read == 0 {
            bail!(
                "No readable CSV objects found for source '{}' at {}",
                self.source.name,
                location
            );
        }
        info!(
            "Source '{}': {} row(s), {} column(s) from {} object(s)",
            self.source.name,
            self.stats.rows_read,
            self.frame.columns().len(),
            self.stats.objects_read
        );
        Ok((self.frame, self.stats))
    }
}
