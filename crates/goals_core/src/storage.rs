use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::activity::Activity;
use crate::calendar::Month;

const NAMESPACE: &str = "daily-goals";

/// Key for a month's activity roster: `daily-goals-{year}-{MM}`.
pub fn activities_key(month: Month) -> String {
    format!("{NAMESPACE}-{}", month_suffix(month))
}

/// Key for a month's per-day events record: `daily-goals-events-{year}-{MM}`.
pub fn events_key(month: Month) -> String {
    format!("{NAMESPACE}-events-{}", month_suffix(month))
}

fn month_suffix(month: Month) -> String {
    format!("{}-{:02}", month.year(), month.month())
}

/// Inverse of [`activities_key`]. Events keys and foreign keys yield `None`.
pub fn parse_activities_key(key: &str) -> Option<Month> {
    let rest = key.strip_prefix("daily-goals-")?;
    if rest.starts_with("events-") {
        return None;
    }
    let (year, month) = rest.split_once('-')?;
    if month.len() != 2 {
        return None;
    }
    Month::new(year.parse().ok()?, month.parse().ok()?)
}

/// A flat directory of `{key}.json` blobs, standing in for the browser's
/// key-value storage. Reads and writes degrade rather than fail: the caller
/// always gets a usable default and the incident is logged. No schema
/// validation happens here; callers own the shape of what they store.
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("unable to prepare store directory `{}`", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.path_for(key);
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(key, %err, "store read failed, treating as empty");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, %err, "stored record is malformed, treating as empty");
                None
            }
        }
    }

    pub fn save<T: Serialize>(&self, key: &str, value: &T) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(err) => {
                warn!(key, %err, "unable to serialize record, skipping save");
                return;
            }
        };
        if let Err(err) = fs::write(self.path_for(key), json) {
            warn!(key, %err, "store write failed, this key not persisted");
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

/// The data source the streak aggregator scans: which months have stored
/// activity data, and the records themselves. Injected so the aggregation is
/// a pure function over any backing store.
pub trait ActivityArchive {
    fn stored_months(&self) -> Vec<Month>;

    /// A month's stored roster; empty when nothing (usable) is stored.
    fn load_activities(&self, month: Month) -> Vec<Activity>;
}

impl ActivityArchive for JsonStore {
    fn stored_months(&self) -> Vec<Month> {
        let mut months = Vec::new();
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(%err, "store scan skipped an entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            let Some(key) = name.strip_suffix(".json") else {
                continue;
            };
            match parse_activities_key(key) {
                Some(month) => months.push(month),
                None => debug!(key, "not an activity record, skipping"),
            }
        }
        months.sort();
        months
    }

    fn load_activities(&self, month: Month) -> Vec<Activity> {
        self.load(&activities_key(month)).unwrap_or_default()
    }
}
