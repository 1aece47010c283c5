// ── On-disk state ──
//
// Layout under the state root:
//
//   bunnies/<serial>.json          one device snapshot per file
//   choreographies/<name>.chor     framed choreography payload
//
// Loading is forgiving: unreadable or invalid entries are logged and
// skipped so one bad file never keeps the server from starting.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nabd_proto::Choreography;
use tracing::{debug, info, warn};

use super::{ChoreographyLibrary, is_plain_name};
use crate::bunny::{Bunny, BunnySnapshot};
use crate::burrow::Burrow;
use crate::error::CoreError;
use crate::plugin::PluginRegistry;

pub const BUNNIES_DIR: &str = "bunnies";
pub const CHOREOGRAPHIES_DIR: &str = "choreographies";
pub const CHOREOGRAPHY_EXTENSION: &str = "chor";
const BUNNY_EXTENSION: &str = "json";

/// What a load found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub bunnies: usize,
    pub choreographies: usize,
    pub skipped: usize,
}

/// What a save wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub bunnies: usize,
    pub choreographies: usize,
    /// Device files removed because their device is gone.
    pub removed: usize,
}

/// The state directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bunnies_dir(&self) -> PathBuf {
        self.root.join(BUNNIES_DIR)
    }

    pub fn choreographies_dir(&self) -> PathBuf {
        self.root.join(CHOREOGRAPHIES_DIR)
    }

    // ── Load ────────────────────────────────────────────────────────

    /// Populate `burrow` and `library` from disk. A missing directory is
    /// simply empty.
    pub async fn load(
        &self,
        burrow: &Burrow,
        library: &ChoreographyLibrary,
        registry: &PluginRegistry,
    ) -> Result<LoadReport, CoreError> {
        let mut report = LoadReport::default();

        for (path, bytes) in read_entries(&self.choreographies_dir(), CHOREOGRAPHY_EXTENSION).await? {
            let Some(name) = file_stem(&path) else {
                report.skipped += 1;
                continue;
            };
            match library.register_wire(&name, &bytes) {
                Ok(_) => report.choreographies += 1,
                Err(err) => {
                    warn!(path = %path.display(), "skipping choreography: {err}");
                    report.skipped += 1;
                }
            }
        }

        for (path, bytes) in read_entries(&self.bunnies_dir(), BUNNY_EXTENSION).await? {
            let snapshot: BunnySnapshot = match serde_json::from_slice(&bytes) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!(path = %path.display(), "skipping bunny: {err}");
                    report.skipped += 1;
                    continue;
                }
            };
            let bunny = Arc::new(Bunny::restore(&snapshot, registry));
            match burrow.add_bunny(bunny) {
                Ok(()) => report.bunnies += 1,
                Err(err) => {
                    warn!(path = %path.display(), "skipping bunny: {err}");
                    report.skipped += 1;
                }
            }
        }

        info!(
            bunnies = report.bunnies,
            choreographies = report.choreographies,
            skipped = report.skipped,
            root = %self.root.display(),
            "state loaded"
        );
        Ok(report)
    }

    // ── Save ────────────────────────────────────────────────────────

    /// Write every device and choreography. Existing files for the same
    /// names are overwritten, and device files for devices no longer in
    /// `burrow` are deleted.
    pub async fn save(
        &self,
        burrow: &Burrow,
        library: &ChoreographyLibrary,
    ) -> Result<SaveReport, CoreError> {
        let mut report = SaveReport::default();

        let chor_dir = self.choreographies_dir();
        create_dir(&chor_dir).await?;
        for choreography in library.snapshot() {
            if !is_plain_name(choreography.name()) {
                warn!(name = choreography.name(), "not saving choreography with unsafe name");
                continue;
            }
            let path = chor_dir.join(format!("{}.{CHOREOGRAPHY_EXTENSION}", choreography.name()));
            write(&path, &choreography.to_wire()?).await?;
            report.choreographies += 1;
        }

        let bunny_dir = self.bunnies_dir();
        create_dir(&bunny_dir).await?;
        let mut written = HashSet::new();
        for snapshot in burrow.snapshot().await {
            if !is_plain_name(&snapshot.serial) {
                warn!(serial = %snapshot.serial, "not saving bunny with unsafe serial");
                continue;
            }
            let path = bunny_dir.join(format!("{}.{BUNNY_EXTENSION}", snapshot.serial));
            let json = serde_json::to_vec_pretty(&snapshot).map_err(|err| CoreError::Persistence {
                path: path.clone(),
                reason: err.to_string(),
            })?;
            write(&path, &json).await?;
            written.insert(path);
            report.bunnies += 1;
        }
        report.removed = prune(&bunny_dir, BUNNY_EXTENSION, &written).await?;

        info!(
            bunnies = report.bunnies,
            choreographies = report.choreographies,
            removed = report.removed,
            root = %self.root.display(),
            "state saved"
        );
        Ok(report)
    }

    /// Write a single choreography into the state directory.
    pub async fn save_choreography(&self, choreography: &Choreography) -> Result<PathBuf, CoreError> {
        if !is_plain_name(choreography.name()) {
            return Err(CoreError::Persistence {
                path: PathBuf::from(choreography.name()),
                reason: "unsafe choreography name".into(),
            });
        }
        let dir = self.choreographies_dir();
        create_dir(&dir).await?;
        let path = dir.join(format!("{}.{CHOREOGRAPHY_EXTENSION}", choreography.name()));
        write(&path, &choreography.to_wire()?).await?;
        Ok(path)
    }
}

// ── Private helpers ─────────────────────────────────────────────────

/// Every `*.<extension>` file in `dir`, sorted by path.
async fn list_entries(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, CoreError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "no state directory");
            return Ok(Vec::new());
        }
        Err(err) => return Err(persistence(dir, &err)),
    };

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| persistence(dir, &e))? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some(extension) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Read every `*.<extension>` file in `dir`, sorted by path.
async fn read_entries(dir: &Path, extension: &str) -> Result<Vec<(PathBuf, Vec<u8>)>, CoreError> {
    let paths = list_entries(dir, extension).await?;
    let mut out = Vec::with_capacity(paths.len());
    for path in paths {
        match tokio::fs::read(&path).await {
            Ok(bytes) => out.push((path, bytes)),
            Err(err) => warn!(path = %path.display(), "cannot read: {err}"),
        }
    }
    Ok(out)
}

/// Delete every `*.<extension>` file in `dir` that is not in `keep`.
async fn prune(dir: &Path, extension: &str, keep: &HashSet<PathBuf>) -> Result<usize, CoreError> {
    let mut removed = 0;
    for path in list_entries(dir, extension).await? {
        if keep.contains(&path) {
            continue;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "removed stale state file");
                removed += 1;
            }
            Err(err) => warn!(path = %path.display(), "cannot remove stale state file: {err}"),
        }
    }
    Ok(removed)
}

fn file_stem(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

async fn create_dir(dir: &Path) -> Result<(), CoreError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|err| persistence(dir, &err))
}

async fn write(path: &Path, bytes: &[u8]) -> Result<(), CoreError> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|err| persistence(path, &err))
}

fn persistence(path: &Path, err: &std::io::Error) -> CoreError {
    CoreError::Persistence {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}
