#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

pub const RAW_HEADER: &str = "TransactionId,TransactionDate,Amount,MerchantId,SKU";
pub const MERCHANT_HEADER: &str =
    "MerchantIdentifier,MerchantCity,MerchantState,Zip,MerchantCategoryCode";

pub const OUTPUT_HEADER: [&str; 10] = [
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

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` to `name` (which may include subdirectories).
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, contents).expect("write temp file contents");
        path
    }

    pub fn dir(&self, name: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::create_dir_all(&path).expect("create dir");
        path
    }
}

/// Part objects written under `dir`, sorted by name.
pub fn part_files(dir: &Path) -> Vec<PathBuf> {
    let mut parts = fs::read_dir(dir)
        .expect("read output dir")
        .map(|entry| entry.expect("dir entry").path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("run-"))
                .unwrap_or(false)
        })
        .collect::<Vec<_>>();
    parts.sort();
    parts
}

/// Header and data rows of every part under `dir`, concatenated.
pub fn read_output(dir: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut header = Vec::new();
    let mut rows = Vec::new();
    for part in part_files(dir) {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&part)
            .expect("open part");
        header = reader
            .headers()
            .expect("part header")
            .iter()
            .map(|s| s.to_string())
            .collect();
        for record in reader.records() {
            rows.push(
                record
                    .expect("part row")
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            );
        }
    }
    (header, rows)
}
