use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use anyhow::{Result, anyhow};
use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    config::JoinConfig,
    frame::{Frame, Row},
};

const KEY_SEPARATOR: &str = "\u{1f}";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    Inner,
    #[default]
    Left,
    Right,
    #[serde(alias = "full")]
    Outer,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JoinKind::Inner => "inner",
            JoinKind::Left => "left",
            JoinKind::Right => "right",
            JoinKind::Outer => "outer",
        };
        f.write_str(label)
    }
}

#[derive(Debug)]
pub struct JoinOutcome {
    pub frame: Frame,
    pub matched_rows: usize,
}

pub fn join(left: &Frame, right: &Frame, config: &JoinConfig, name: &str) -> Result<JoinOutcome> {
    if config.left_keys.is_empty() || config.left_keys.len() != config.right_keys.len() {
        return Err(anyhow!(
            "Join keys must be non-empty and of equal length ({:?} vs {:?})",
            config.left_keys,
            config.right_keys
        ));
    }
    let left_indices = column_indices(left, &config.left_keys)?;
    let right_indices = column_indices(right, &config.right_keys)?;

    let right_lookup = build_right_lookup(right, &right_indices);
    let mut right_matched = vec![false; right.len()];
    let output_columns = build_output_headers(left.columns(), right.columns());
    let mut output = Frame::new(name, output_columns);

    let include_unmatched_left = matches!(config.how, JoinKind::Left | JoinKind::Outer);
    let include_unmatched_right = matches!(config.how, JoinKind::Right | JoinKind::Outer);
    let right_width = right.columns().len();
    let mut matched_rows = 0usize;

    for record in left.rows() {
        let mut matched_any = false;
        if let Some(bucket) = build_key(record, &left_indices).and_then(|k| right_lookup.get(&k)) {
            for position in bucket {
                matched_any = true;
                right_matched[*position] = true;
                matched_rows += 1;
                let mut combined = record.clone();
                combined.extend(right.rows()[*position].iter().cloned());
                output.push_row(combined)?;
            }
        }

        if !matched_any && include_unmatched_left {
            let mut combined = record.clone();
            combined.extend(std::iter::repeat_n(None, right_width));
            output.push_row(combined)?;
        }
    }

    if include_unmatched_right {
        let left_width = left.columns().len();
        let unmatched = right
            .rows()
            .iter()
            .zip(right_matched.iter())
            .filter(|(_, matched)| !**matched);
        for (record, _) in unmatched {
            let mut combined: Row = vec![None; left_width];
            combined.extend(record.iter().cloned());
            output.push_row(combined)?;
        }
    }

    info!(
        "Join '{}' ({}): {} output row(s), {} matched row(s)",
        name,
        config.how,
        output.len(),
        matched_rows
    );
    Ok(JoinOutcome {
        frame: output,
        matched_rows,
    })
}

fn column_indices(frame: &Frame, columns: &[String]) -> Result<Vec<usize>> {
    columns
        .iter()
        .map(|name| frame.require_column(name))
        .collect()
}

/// Composite key for a row, or `None` when any key part is null.
fn build_key(record: &Row, key_indices: &[usize]) -> Option<String> {
    let mut parts = Vec::with_capacity(key_indices.len());
    for idx in key_indices {
        parts.push(record.get(*idx)?.as_deref()?);
    }
    Some(parts.join(KEY_SEPARATOR))
}

/// Right row positions grouped by key, in input order. Null-keyed rows are
/// left out since they can never match.
fn build_right_lookup(right: &Frame, key_indices: &[usize]) -> HashMap<String, Vec<usize>> {
    let mut map: HashMap<String, Vec<usize>> = HashMap::new();
    for (position, record) in right.rows().iter().enumerate() {
        if let Some(key) = build_key(record, key_indices) {
            map.entry(key).or_default().push(position);
        }
    }
    map
}

fn build_output_headers(left_headers: &[String], right_headers: &[String]) -> Vec<String> {
    let mut headers = left_headers.to_vec();
    let mut seen: HashSet<String> = headers.iter().cloned().collect();

    for name in right_headers {
        let mut candidate = name.clone();
        if seen.contains(&candidate) {
            let mut counter = 1usize;
            let base = candidate.clone();
            while seen.contains(&candidate) {
                candidate = format!("right_{base}_{counter}");
                counter += 1;
            }
        }
        seen.insert(candidate.clone());
        headers.push(candidate);
    }

    headers
}
