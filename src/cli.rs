use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Enrich transaction CSV data with merchant attributes",
    long_about = None
)]
pub struct Cli {
    /// Name of the job run, as passed by the job runner (`--JOB_NAME <name>`)
    #[arg(long = "JOB_NAME", value_name = "NAME")]
    pub job_name: String,
    /// YAML job configuration (the built-in transaction/merchant job if omitted)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Location of the raw transaction data (local path or s3://bucket/prefix)
    #[arg(long = "raw-source")]
    pub raw_source: Option<String>,
    /// Location of the merchant reference data (local path or s3://bucket/prefix)
    #[arg(long = "merchant-source")]
    pub merchant_source: Option<String>,
    /// Location the enriched CSV is written to (local path or s3://bucket/prefix)
    #[arg(long = "target")]
    pub target: Option<String>,
    /// Print the first N output rows as a table instead of writing the target
    #[arg(long = "preview", value_name = "N")]
    pub preview: Option<usize>,
    /// Write the run summary as JSON to this file
    #[arg(long = "summary")]
    pub summary: Option<PathBuf>,
    /// Write the effective job configuration as YAML to this file and exit
    #[arg(long = "write-config")]
    pub write_config: Option<PathBuf>,
}
