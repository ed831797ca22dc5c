//! File-backed flag store
//!
//! Keeps boolean flags in a small JSON object (`flags.json`), loaded once
//! and rewritten atomically on every change.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context};
use tracing::warn;

use crashgate_core::ports::IFlagStore;

pub const FLAGS_FILE_NAME: &str = "flags.json";

/// [`IFlagStore`] persisted as a JSON file
#[derive(Debug)]
pub struct FileFlagStore {
    path: PathBuf,
    flags: Mutex<BTreeMap<String, bool>>,
}

impl FileFlagStore {
    /// Opens the store at `path`.
    ///
    /// A missing file starts empty; an unreadable one is logged and also
    /// starts empty, so a corrupt flag file never blocks the pipeline.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let flags = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable flag file");
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        Self {
            path,
            flags: Mutex::new(flags),
        }
    }

    /// Opens `flags.json` inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::open(dir.join(FLAGS_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update(&self, apply: impl FnOnce(&mut BTreeMap<String, bool>)) -> anyhow::Result<()> {
        let mut flags = self
            .flags
            .lock()
            .map_err(|_| anyhow!("flag store lock poisoned"))?;
        apply(&mut flags);
        let bytes = serde_json::to_vec_pretty(&*flags)?;
        self.persist(&bytes)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }

    fn persist(&self, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)
    }
}

impl IFlagStore for FileFlagStore {
    fn get_bool(&self, key: &str) -> bool {
        self.flags
            .lock()
            .map(|flags| flags.get(key).copied().unwrap_or(false))
            .unwrap_or(false)
    }

    fn put_bool(&self, key: &str, value: bool) -> anyhow::Result<()> {
        self.update(|flags| {
            flags.insert(key.to_string(), value);
        })
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.update(|flags| {
            flags.remove(key);
        })
    }
}
