use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::types::TestResult;
use crate::error::Result;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    signatures: Vec<TestResult>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

/// Durable collection of trial results backed by a single JSON file
///
/// The whole document is rewritten after every append: serialized to a
/// sibling `.tmp` file and renamed over the store, so a crash loses at most
/// the trial in flight.
#[derive(Debug)]
pub struct ResultStore {
    path: PathBuf,
    doc: StoreDocument,
}

impl ResultStore {
    /// Load the store at `path`; a missing or undecodable file starts empty
    ///
    /// An undecodable file is renamed to `<name>.corrupt-<timestamp>` first so
    /// the next save cannot overwrite it.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let doc = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<StoreDocument>(&bytes) {
                Ok(doc) => {
                    debug!(path = %path.display(), results = doc.signatures.len(), "results loaded");
                    doc
                }
                Err(e) => {
                    match quarantine(&path) {
                        Ok(backup) => warn!(
                            path = %path.display(),
                            backup = %backup.display(),
                            error = %e,
                            "results file unreadable, moved aside and starting empty"
                        ),
                        Err(io) => warn!(
                            path = %path.display(),
                            error = %e,
                            rename_error = %io,
                            "results file unreadable and could not be moved aside, starting empty"
                        ),
                    }
                    StoreDocument::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreDocument::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read results file, starting empty");
                StoreDocument::default()
            }
        };
        Self { path, doc }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn results(&self) -> &[TestResult] {
        &self.doc.signatures
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.doc.metadata
    }

    pub fn len(&self) -> usize {
        self.doc.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc.signatures.is_empty()
    }

    /// Set a free-form metadata entry; persisted with the next save
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.doc.metadata.insert(key.into(), value);
    }

    /// Add `result` and rewrite the store file
    pub fn append(&mut self, result: TestResult) -> Result<()> {
        info!(
            proxy = %result.proxy_id,
            version = %result.version,
            status = %result.status,
            signatures = result.ja4_signatures.len(),
            "recording trial result"
        );
        self.doc.signatures.push(result);
        self.save()
    }

    pub fn save(&mut self) -> Result<()> {
        self.doc.metadata.insert(
            "updated_at".into(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
        self.doc
            .metadata
            .insert("total_results".into(), Value::from(self.doc.signatures.len()));

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let bytes = serde_json::to_vec_pretty(&self.doc)?;
        let tmp = tmp_path(&self.path);
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;

        debug!(path = %self.path.display(), results = self.doc.signatures.len(), "results saved");
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Rename an unreadable store out of the way, returning the new path
fn quarantine(path: &Path) -> std::io::Result<PathBuf> {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S").to_string();
    let mut backup = corrupt_path(path, &stamp, 0);
    let mut n = 1;
    while backup.exists() {
        backup = corrupt_path(path, &stamp, n);
        n += 1;
    }
    fs::rename(path, &backup)?;
    Ok(backup)
}

fn corrupt_path(path: &Path, stamp: &str, n: u32) -> PathBuf {
    let mut name = path.file_name().map(|f| f.to_os_string()).unwrap_or_default();
    name.push(format!(".corrupt-{stamp}"));
    if n > 0 {
        name.push(format!("-{n}"));
    }
    path.with_file_name(name)
}
