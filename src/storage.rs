//! Object storage access for job inputs and outputs.
//!
//! A [`Location`] is either a local filesystem path or an `s3://bucket/prefix`
//! URI. [`Storage`] hands out the [`ObjectStore`] that serves a location:
//!
//! - **Local**: directory walks via `walkdir`, plain file reads and writes.
//! - **S3**: `aws-sdk-s3` on a private tokio runtime, driven with `block_on`
//!   so callers stay synchronous.
//!
//! Listing returns objects in lexical order and drops hidden objects (names
//! starting with `_` or `.`), which covers `_SUCCESS` markers left by other
//! writers.

use std::{
    fmt,
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result, anyhow};
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    Client, operation::list_objects_v2::ListObjectsV2Output, primitives::ByteStream,
};
use log::debug;
use thiserror::Error;
use walkdir::WalkDir;

const S3_SCHEME: &str = "s3://";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LocationError {
    #[error("Location cannot be empty")]
    Empty,
    #[error("S3 location '{0}' is missing a bucket name")]
    MissingBucket(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Local(PathBuf),
    S3 { bucket: String, key: String },
}

impl Location {
    pub fn parse(value: &str) -> Result<Self, LocationError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(LocationError::Empty);
        }
        if let Some(rest) = trimmed.strip_prefix(S3_SCHEME) {
            let (bucket, key) = match rest.split_once('/') {
                Some((bucket, key)) => (bucket, key),
                None => (rest, ""),
            };
            if bucket.is_empty() {
                return Err(LocationError::MissingBucket(trimmed.to_string()));
            }
            return Ok(Location::S3 {
                bucket: bucket.to_string(),
                key: key.trim_end_matches('/').to_string(),
            });
        }
        Ok(Location::Local(PathBuf::from(trimmed)))
    }

    /// Location of an object named `name` directly below this one.
    pub fn child(&self, name: &str) -> Location {
        match self {
            Location::Local(path) => Location::Local(path.join(name)),
            Location::S3 { bucket, key } => Location::S3 {
                bucket: bucket.clone(),
                key: if key.is_empty() {
                    name.to_string()
                } else {
                    format!("{key}/{name}")
                },
            },
        }
    }

    pub fn is_s3(&self) -> bool {
        matches!(self, Location::S3 { .. })
    }

    /// Final path segment, used for hidden-object filtering.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            Location::Local(path) => path.file_name().and_then(|name| name.to_str()),
            Location::S3 { key, .. } => key.rsplit('/').next().filter(|s| !s.is_empty()),
        }
    }
}

impl FromStr for Location {
    type Err = LocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Location::parse(s)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local(path) => write!(f, "{}", path.display()),
            Location::S3 { bucket, key } if key.is_empty() => write!(f, "{S3_SCHEME}{bucket}"),
            Location::S3 { bucket, key } => write!(f, "{S3_SCHEME}{bucket}/{key}"),
        }
    }
}

pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('_') || name.starts_with('.')
}

pub trait ObjectStore {
    /// Lists readable objects at or below `location`, sorted by key.
    fn list(&self, location: &Location, recurse: bool) -> Result<Vec<Location>>;
    fn get(&self, location: &Location) -> Result<Vec<u8>>;
    /// Creates a new object. Fails if one already exists at `location`.
    fn put(&self, location: &Location, data: Vec<u8>) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct LocalStore;

fn local_path(location: &Location) -> Result<&Path> {
    match location {
        Location::Local(path) => Ok(path.as_path()),
        other => Err(anyhow!("Local store cannot serve {other}")),
    }
}

impl ObjectStore for LocalStore {
    fn list(&self, location: &Location, recurse: bool) -> Result<Vec<Location>> {
        let root = local_path(location)?;
        let metadata =
            fs::metadata(root).with_context(|| format!("Accessing input location {root:?}"))?;
        if metadata.is_file() {
            return Ok(vec![location.clone()]);
        }

        let max_depth = if recurse { usize::MAX } else { 1 };
        let mut objects = Vec::new();
        let walker = WalkDir::new(root)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry
                        .file_name()
                        .to_str()
                        .map(is_hidden_name)
                        .unwrap_or(false)
            });
        for entry in walker {
            let entry = entry.with_context(|| format!("Walking input location {root:?}"))?;
            if entry.file_type().is_file() {
                debug!("Discovered object {:?}", entry.path());
                objects.push(Location::Local(entry.into_path()));
            }
        }
        Ok(objects)
    }

    fn get(&self, location: &Location) -> Result<Vec<u8>> {
        let path = local_path(location)?;
        fs::read(path).with_context(|| format!("Reading object {path:?}"))
    }

    fn put(&self, location: &Location, data: Vec<u8>) -> Result<()> {
        let path = local_path(location)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Creating output directory {parent:?}"))?;
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .with_context(|| format!("Creating object {path:?}"))?;
        file.write_all(&data)
            .with_context(|| format!("Writing object {path:?}"))
    }
}

pub struct S3Store {
    runtime: tokio::runtime::Runtime,
    client: Client,
}

impl S3Store {
    /// Loads credentials and region from the default AWS provider chain.
    pub fn connect() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Starting runtime for S3 access")?;
        let config = runtime.block_on(aws_config::load_defaults(BehaviorVersion::latest()));
        Ok(Self {
            runtime,
            client: Client::new(&config),
        })
    }
}

fn s3_parts(location: &Location) -> Result<(&str, &str)> {
    match location {
        Location::S3 { bucket, key } => Ok((bucket.as_str(), key.as_str())),
        other => Err(anyhow!("S3 store cannot serve {other}")),
    }
}

/// Keeps keys that sit at or below `prefix` on a `/` boundary.
pub fn select_keys(prefix: &str, keys: Vec<String>, recurse: bool) -> Vec<String> {
    let mut selected = keys
        .into_iter()
        .filter(|key| {
            let remainder = if prefix.is_empty() {
                key.as_str()
            } else if key == prefix {
                return true;
            } else if let Some(rest) = key
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix('/'))
            {
                rest
            } else {
                return false;
            };
            if remainder.is_empty() || remainder.ends_with('/') {
                return false;
            }
            if !recurse && remainder.contains('/') {
                return false;
            }
            !remainder.split('/').any(is_hidden_name)
        })
        .collect::<Vec<_>>();
    selected.sort();
    selected
}

/// Follows continuation tokens until the listing is exhausted, keeping the
/// keys of non-empty objects.
pub fn collect_listing<F>(mut fetch_page: F) -> Result<Vec<String>>
where
    F: FnMut(Option<String>) -> Result<ListObjectsV2Output>,
{
    let mut keys = Vec::new();
    let mut continuation: Option<String> = None;
    loop {
        let page = fetch_page(continuation.take())?;
        keys.extend(
            page.contents()
                .iter()
                .filter(|object| object.size().unwrap_or(0) > 0)
                .filter_map(|object| object.key().map(|k| k.to_string())),
        );
        match page.next_continuation_token() {
            Some(token) if page.is_truncated().unwrap_or(false) => {
                continuation = Some(token.to_string());
            }
            _ => break,
        }
    }
    Ok(keys)
}

impl ObjectStore for S3Store {
    fn list(&self, location: &Location, recurse: bool) -> Result<Vec<Location>> {
        let (bucket, prefix) = s3_parts(location)?;
        let keys = collect_listing(|continuation| {
            self.runtime
                .block_on(
                    self.client
                        .list_objects_v2()
                        .bucket(bucket)
                        .prefix(prefix)
                        .set_continuation_token(continuation)
                        .send(),
                )
                .with_context(|| format!("Listing objects under {location}"))
        })?;
        debug!("Listed {} key(s) under {}", keys.len(), location);
        Ok(select_keys(prefix, keys, recurse)
            .into_iter()
            .map(|key| Location::S3 {
                bucket: bucket.to_string(),
                key,
            })
            .collect())
    }

    fn get(&self, location: &Location) -> Result<Vec<u8>> {
        let (bucket, key) = s3_parts(location)?;
        self.runtime.block_on(async {
            let response = self
                .client
                .get_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .with_context(|| format!("Fetching object {location}"))?;
            let collected = response
                .body
                .collect()
                .await
                .with_context(|| format!("Reading body of {location}"))?;
            Ok::<_, anyhow::Error>(collected.into_bytes().to_vec())
        })
    }

    fn put(&self, location: &Location, data: Vec<u8>) -> Result<()> {
        let (bucket, key) = s3_parts(location)?;
        self.runtime.block_on(async {
            self.client
                .put_object()
                .bucket(bucket)
                .key(key)
                .if_none_match("*")
                .body(ByteStream::from(data))
                .send()
                .await
                .with_context(|| format!("Uploading object {location}"))?;
            Ok::<_, anyhow::Error>(())
        })
    }
}

/// Routes each location to the store that serves it. The S3 client is only
/// built when some location needs it.
pub struct Storage {
    local: LocalStore,
    s3: Option<S3Store>,
}

impl Storage {
    pub fn local_only() -> Self {
        Self {
            local: LocalStore,
            s3: None,
        }
    }

    pub fn for_locations<'a>(locations: impl IntoIterator<Item = &'a Location>) -> Result<Self> {
        let needs_s3 = locations.into_iter().any(Location::is_s3);
        let s3 = if needs_s3 {
            Some(S3Store::connect()?)
        } else {
            None
        };
        Ok(Self {
            local: LocalStore,
            s3,
        })
    }

    pub fn store_for(&self, location: &Location) -> Result<&dyn ObjectStore> {
        match location {
            Location::Local(_) => Ok(&self.local as &dyn ObjectStore),
            Location::S3 { .. } => self
                .s3
                .as_ref()
                .map(|store| store as &dyn ObjectStore)
                .ok_or_else(|| anyhow!("No S3 client configured for {location}")),
        }
    }
}
