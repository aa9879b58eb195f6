//! Column mapping: select, rename, and cast columns of a joined frame.
//!
//! A [`Mapping`] is written in configuration as the four-element sequence
//! `[source, source_type, target, target_type]`. Applying a list of mappings
//! produces a frame holding exactly the target columns in mapping order.
//!
//! Casting never fails a row. A value that cannot be read as its source type
//! or converted to its target type becomes null.

use std::{fmt, str::FromStr};

use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::frame::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    #[serde(alias = "integer")]
    Int,
    #[serde(alias = "bigint")]
    Long,
    Double,
    Float,
    #[serde(alias = "bool")]
    Boolean,
    Date,
    Timestamp,
}

impl FromStr for DataType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "string" => Ok(DataType::String),
            "int" | "integer" => Ok(DataType::Int),
            "long" | "bigint" => Ok(DataType::Long),
            "double" => Ok(DataType::Double),
            "float" => Ok(DataType::Float),
            "boolean" | "bool" => Ok(DataType::Boolean),
            "date" => Ok(DataType::Date),
            "timestamp" => Ok(DataType::Timestamp),
            other => Err(anyhow!("Unknown data type '{other}'")),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DataType::String => "string",
            DataType::Int => "int",
            DataType::Long => "long",
            DataType::Double => "double",
            DataType::Float => "float",
            DataType::Boolean => "boolean",
            DataType::Date => "date",
            DataType::Timestamp => "timestamp",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "MappingTuple", into = "MappingTuple")]
pub struct Mapping {
    pub source: String,
    pub source_type: DataType,
    pub target: String,
    pub target_type: DataType,
}

type MappingTuple = (String, DataType, String, DataType);

impl From<MappingTuple> for Mapping {
    fn from((source, source_type, target, target_type): MappingTuple) -> Self {
        Self {
            source,
            source_type,
            target,
            target_type,
        }
    }
}

impl From<Mapping> for MappingTuple {
    fn from(mapping: Mapping) -> Self {
        (
            mapping.source,
            mapping.source_type,
            mapping.target,
            mapping.target_type,
        )
    }
}

impl Mapping {
    pub fn new(
        source: impl Into<String>,
        source_type: DataType,
        target: impl Into<String>,
        target_type: DataType,
    ) -> Self {
        Self {
            source: source.into(),
            source_type,
            target: target.into(),
            target_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Typed {
    Text(String),
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

fn parse_as(value: &str, ty: DataType) -> Option<Typed> {
    if ty == DataType::String {
        return Some(Typed::Text(value.to_string()));
    }
    let trimmed = value.trim();
    match ty {
        DataType::String => None,
        DataType::Int | DataType::Long => trimmed
            .parse::<i64>()
            .ok()
            .or_else(|| {
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
            })
            .map(Typed::Integer),
        DataType::Double | DataType::Float => trimmed.parse::<f64>().ok().map(Typed::Real),
        DataType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => Some(Typed::Boolean(true)),
            "false" | "f" | "no" | "n" | "0" => Some(Typed::Boolean(false)),
            _ => None,
        },
        DataType::Date => parse_date(trimmed).map(Typed::Date),
        DataType::Timestamp => parse_timestamp(trimmed).map(Typed::Timestamp),
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%m-%Y"];
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .or_else(|| parse_timestamp(value).map(|ts| ts.date()))
}

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
        "%m/%d/%Y %H:%M:%S",
    ];
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn render_as(value: Typed, ty: DataType) -> Option<String> {
    match (ty, value) {
        (DataType::String, Typed::Text(text)) => Some(text),
        (DataType::String, Typed::Integer(i)) => Some(i.to_string()),
        (DataType::String, Typed::Real(f)) => Some(f.to_string()),
        (DataType::String, Typed::Boolean(b)) => Some(b.to_string()),
        (DataType::String, Typed::Date(d)) => Some(d.format("%Y-%m-%d").to_string()),
        (DataType::String, Typed::Timestamp(ts)) => {
            Some(ts.format("%Y-%m-%d %H:%M:%S").to_string())
        }
        (DataType::Int, Typed::Integer(i)) => i32::try_from(i).ok().map(|v| v.to_string()),
        (DataType::Long, Typed::Integer(i)) => Some(i.to_string()),
        (DataType::Int | DataType::Long, Typed::Real(f)) if f.is_finite() => {
            render_as(Typed::Integer(f.trunc() as i64), ty)
        }
        (DataType::Int | DataType::Long, Typed::Boolean(b)) => Some(i64::from(b).to_string()),
        (DataType::Double | DataType::Float, Typed::Real(f)) => Some(f.to_string()),
        (DataType::Double | DataType::Float, Typed::Integer(i)) => Some((i as f64).to_string()),
        (DataType::Boolean, Typed::Boolean(b)) => Some(b.to_string()),
        (DataType::Boolean, Typed::Integer(i)) => Some((i != 0).to_string()),
        (DataType::Date, Typed::Date(d)) => Some(d.format("%Y-%m-%d").to_string()),
        (DataType::Date, Typed::Timestamp(ts)) => Some(ts.date().format("%Y-%m-%d").to_string()),
        (DataType::Timestamp, Typed::Timestamp(ts)) => {
            Some(ts.format("%Y-%m-%d %H:%M:%S").to_string())
        }
        (DataType::Timestamp, Typed::Date(d)) => d
            .and_hms_opt(0, 0, 0)
            .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string()),
        (target, Typed::Text(text)) => parse_as(&text, target).and_then(|v| render_as(v, target)),
        _ => None,
    }
}

/// Casts a single value from `from` to `to`. Null and unconvertible values
/// yield `None`.
pub fn cast_value(value: Option<&str>, from: DataType, to: DataType) -> Option<String> {
    let value = value?;
    let typed = parse_as(value, from)?;
    render_as(typed, to)
}

pub fn apply_mappings(frame: &Frame, mappings: &[Mapping], name: &str) -> Result<Frame> {
    let indices = mappings
        .iter()
        .map(|mapping| frame.require_column(&mapping.source))
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("Resolving mapping sources for '{name}'"))?;

    let targets = mappings.iter().map(|m| m.target.clone()).collect();
    let mut output = Frame::new(name, targets);
    let mut nulled = 0usize;

    for (row_idx, row) in frame.rows().iter().enumerate() {
        let mut mapped = Vec::with_capacity(mappings.len());
        for (mapping, idx) in mappings.iter().zip(indices.iter()) {
            let raw = row[*idx].as_deref();
            let cast = cast_value(raw, mapping.source_type, mapping.target_type);
            if raw.is_some() && cast.is_none() {
                nulled += 1;
                debug!(
                    "Row {}: could not cast {:?} in '{}' from {} to {}",
                    row_idx + 1,
                    raw,
                    mapping.source,
                    mapping.source_type,
                    mapping.target_type
                );
            }
            mapped.push(cast);
        }
        output.push_row(mapped)?;
    }

    info!(
        "Mapping '{}': {} column(s) over {} row(s), {} value(s) nulled by casts",
        name,
        mappings.len(),
        output.len(),
        nulled
    );
    Ok(output)
}
