//! Job configuration loaded from YAML.
//!
//! Every field has a default, so an empty document (or no document at all)
//! describes the transaction/merchant enrichment job. Storage locations in
//! the defaults are placeholders and must be replaced, either in the file or
//! through CLI overrides, before the job will run.

use std::{collections::HashSet, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result, anyhow, ensure};
use serde::{Deserialize, Serialize};

use crate::{
    join::JoinKind,
    mapping::{DataType, Mapping},
    storage::Location,
};

pub const PLACEHOLDER_MARKER: &str = "REPLACE-WITH";

const DEFAULT_LEFT_PATH: &str = "s3://REPLACE-WITH-SOURCE-RAW-NAME";
const DEFAULT_RIGHT_PATH: &str = "s3://REPLACE-WITH-SOURCE-MERCHANT-BUCKET-NAME";
const DEFAULT_TARGET_PATH: &str = "s3://REPLACE-WITH-TARGET-BUCKET-NAME";

const DEFAULT_OUTPUT_COLUMNS: &[&str] = &[
    "TransactionId",
    "TransactionDate",
    "Amount",
    "MerchantId",
    "SKU",
    "MerchantIdentifier",
    "MerchantCity",
    "MerchantState",
    "Zip",
    "MerchantCategoryCode",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CsvFormat {
    pub separator: char,
    pub quote_char: char,
    pub with_header: bool,
    pub encoding: String,
}

impl Default for CsvFormat {
    fn default() -> Self {
        Self {
            separator: ',',
            quote_char: '"',
            with_header: true,
            encoding: "utf-8".to_string(),
        }
    }
}

impl CsvFormat {
    pub fn separator_byte(&self) -> Result<u8> {
        ascii_byte(self.separator, "separator")
    }

    pub fn quote_byte(&self) -> Result<u8> {
        ascii_byte(self.quote_char, "quote_char")
    }

    fn validate(&self) -> Result<()> {
        let separator = self.separator_byte()?;
        let quote = self.quote_byte()?;
        ensure!(
            separator != quote,
            "separator and quote_char must differ (both '{}')",
            self.separator
        );
        crate::io_utils::resolve_encoding(Some(&self.encoding))?;
        Ok(())
    }
}

fn ascii_byte(value: char, field: &str) -> Result<u8> {
    if value.is_ascii() && value != '\n' && value != '\r' {
        Ok(value as u8)
    } else {
        Err(anyhow!("{field} must be a single ASCII character, got {value:?}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub name: String,
    pub path: String,
    #[serde(default = "default_true")]
    pub recurse: bool,
    #[serde(default)]
    pub format: CsvFormat,
    /// Malformed rows tolerated (and skipped) before ingestion fails.
    #[serde(default)]
    pub malformed_row_limit: usize,
}

impl SourceConfig {
    pub fn new(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            recurse: true,
            format: CsvFormat::default(),
            malformed_row_limit: 0,
        }
    }

    pub fn location(&self) -> Result<Location> {
        Location::parse(&self.path)
            .with_context(|| format!("Parsing location for source '{}'", self.name))
    }
}

fn default_true() -> bool {
    true
}

fn default_left_source() -> SourceConfig {
    SourceConfig::new("rawsource", DEFAULT_LEFT_PATH)
}

fn default_right_source() -> SourceConfig {
    SourceConfig::new("merchant", DEFAULT_RIGHT_PATH)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Sources {
    #[serde(default = "default_left_source")]
    pub left: SourceConfig,
    #[serde(default = "default_right_source")]
    pub right: SourceConfig,
}

impl Default for Sources {
    fn default() -> Self {
        Self {
            left: default_left_source(),
            right: default_right_source(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct JoinConfig {
    pub how: JoinKind,
    pub left_keys: Vec<String>,
    pub right_keys: Vec<String>,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            how: JoinKind::Left,
            left_keys: vec!["MerchantId".to_string()],
            right_keys: vec!["MerchantIdentifier".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SinkConfig {
    pub path: String,
    pub format: CsvFormat,
    pub write_header: bool,
    /// Split output across part objects of at most this many rows (0 = one part).
    pub max_records_per_file: usize,
    pub partition_keys: Vec<String>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_TARGET_PATH.to_string(),
            format: CsvFormat::default(),
            write_header: true,
            max_records_per_file: 0,
            partition_keys: Vec::new(),
        }
    }
}

impl SinkConfig {
    pub fn location(&self) -> Result<Location> {
        Location::parse(&self.path).context("Parsing sink location")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct JobConfig {
    pub sources: Sources,
    pub join: JoinConfig,
    pub mappings: Vec<Mapping>,
    pub sink: SinkConfig,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            sources: Sources::default(),
            join: JoinConfig::default(),
            mappings: default_mappings(),
            sink: SinkConfig::default(),
        }
    }
}

pub fn default_mappings() -> Vec<Mapping> {
    DEFAULT_OUTPUT_COLUMNS
        .iter()
        .map(|name| Mapping::new(*name, DataType::String, *name, DataType::String))
        .collect()
}

impl JobConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening job config {path:?}"))?;
        let reader = BufReader::new(file);
        let config: JobConfig =
            serde_yaml::from_reader(reader).context("Parsing job config YAML")?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating job config {path:?}"))?;
        serde_yaml::to_writer(file, self).context("Writing job config YAML")
    }

    /// Checks structural consistency. The sink is only checked when the job
    /// will actually write to it.
    pub fn validate(&self, require_sink: bool) -> Result<()> {
        for source in [&self.sources.left, &self.sources.right] {
            ensure!(!source.name.trim().is_empty(), "Source names cannot be empty");
            ensure_not_placeholder(&source.path, &source.name)?;
            source.location()?;
            source
                .format
                .validate()
                .with_context(|| format!("Validating format of source '{}'", source.name))?;
        }

        ensure!(
            !self.join.left_keys.is_empty() && !self.join.right_keys.is_empty(),
            "Join requires at least one left key and one right key"
        );
        ensure!(
            self.join.left_keys.len() == self.join.right_keys.len(),
            "Left and right join keys must contain the same number of columns ({} vs {})",
            self.join.left_keys.len(),
            self.join.right_keys.len()
        );

        ensure!(!self.mappings.is_empty(), "At least one mapping is required");
        let mut targets = HashSet::new();
        for mapping in &self.mappings {
            ensure!(
                targets.insert(mapping.target.as_str()),
                "Duplicate mapping target column '{}'",
                mapping.target
            );
        }

        if require_sink {
            ensure_not_placeholder(&self.sink.path, "sink")?;
            self.sink.location()?;
            self.sink
                .format
                .validate()
                .context("Validating sink format")?;
            ensure!(
                self.sink.partition_keys.is_empty(),
                "Partitioned output is not supported (partition_keys: {:?})",
                self.sink.partition_keys
            );
        }
        Ok(())
    }
}

fn ensure_not_placeholder(path: &str, owner: &str) -> Result<()> {
    ensure!(
        !path.contains(PLACEHOLDER_MARKER),
        "Location '{path}' for {owner} is still a placeholder; set a real path in the config or on the command line"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runnable() -> JobConfig {
        let mut config = JobConfig::default();
        config.sources.left.path = "s3://sales/raw".to_string();
        config.sources.right.path = "s3://sales/merchants".to_string();
        config.sink.path = "s3://sales/enriched".to_string();
        config
    }

    #[test]
    fn empty_document_yields_default_job() {
        let config: JobConfig = serde_yaml::from_str("{}").expect("parse");
        assert_eq!(config, JobConfig::default());
        assert_eq!(config.mappings.len(), 10);
        assert_eq!(config.mappings[0].source, "TransactionId");
        assert_eq!(config.mappings[9].target, "MerchantCategoryCode");
        assert_eq!(config.join.how, JoinKind::Left);
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let yaml = r#"
sources:
  left:
    name: raw
    path: /data/raw
    format:
      separator: ";"
join:
  how: inner
mappings:
  - [Amount, string, amount, double]
"#;
        let config: JobConfig = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(config.sources.left.format.separator, ';');
        assert_eq!(config.sources.left.format.quote_char, '"');
        assert!(config.sources.left.recurse);
        assert_eq!(config.sources.right.name, "merchant");
        assert_eq!(config.join.how, JoinKind::Inner);
        assert_eq!(config.join.left_keys, vec!["MerchantId"]);
        assert_eq!(
            config.mappings,
            vec![Mapping::new("Amount", DataType::String, "amount", DataType::Double)]
        );
    }

    #[test]
    fn mapping_types_accept_aliases() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("job.yml");
        std::fs::write(
            &path,
            "mappings:\n  - [Amount, string, amount, integer]\n  - [Seq, bigint, seq, long]\n  - [Flag, string, flag, bool]\n",
        )
        .expect("write config");

        let config = JobConfig::load(&path).expect("load");
        assert_eq!(
            config.mappings,
            vec![
                Mapping::new("Amount", DataType::String, "amount", DataType::Int),
                Mapping::new("Seq", DataType::Long, "seq", DataType::Long),
                Mapping::new("Flag", DataType::String, "flag", DataType::Boolean),
            ]
        );

        let saved = serde_yaml::to_string(&config).expect("serialize");
        assert!(saved.contains("int"));
        assert!(!saved.contains("integer"));
        assert!(!saved.contains("bigint"));
    }

    #[test]
    fn placeholders_are_rejected() {
        let err = JobConfig::default().validate(false).unwrap_err();
        assert!(err.to_string().contains("placeholder"));

        let mut config = runnable();
        config.sink.path = DEFAULT_TARGET_PATH.to_string();
        assert!(config.validate(false).is_ok());
        assert!(config.validate(true).is_err());
    }

    #[test]
    fn mismatched_join_keys_are_rejected() {
        let mut config = runnable();
        config.join.right_keys.push("Zip".to_string());
        let err = config.validate(true).unwrap_err();
        assert!(err.to_string().contains("same number of columns"));
    }

    #[test]
    fn duplicate_targets_and_partitions_are_rejected() {
        let mut config = runnable();
        config.mappings.push(Mapping::new(
            "SKU",
            DataType::String,
            "SKU",
            DataType::String,
        ));
        assert!(config.validate(true).is_err());

        let mut config = runnable();
        config.sink.partition_keys = vec!["MerchantState".to_string()];
        let err = config.validate(true).unwrap_err();
        assert!(err.to_string().contains("Partitioned output"));
    }

    #[test]
    fn non_ascii_separator_is_rejected() {
        let mut config = runnable();
        config.sources.right.format.separator = '§';
        assert!(config.validate(true).is_err());
    }
}
