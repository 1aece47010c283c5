// ── Choreography library ──
//
// Named choreographies served under `/chorlibrary/<name>`. Lookups come
// from every connection at once, so the map is sharded.

use std::sync::Arc;

use dashmap::DashMap;
use nabd_proto::Choreography;
use tracing::debug;

use crate::error::CoreError;

#[derive(Debug, Default)]
pub struct ChoreographyLibrary {
    entries: DashMap<String, Arc<Choreography>>,
}

impl ChoreographyLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a choreography under its own name. Returns the one it
    /// replaced.
    pub fn register(&self, choreography: Choreography) -> Option<Arc<Choreography>> {
        let name = choreography.name().to_owned();
        debug!(%name, bytes = choreography.len(), "choreography registered");
        self.entries.insert(name, Arc::new(choreography))
    }

    /// Decode the framed form and register it. Nothing is registered if the
    /// frame is invalid.
    pub fn register_wire(&self, name: &str, bytes: &[u8]) -> Result<Arc<Choreography>, CoreError> {
        let choreography = Arc::new(Choreography::from_wire(name, bytes)?);
        self.entries
            .insert(name.to_owned(), Arc::clone(&choreography));
        Ok(choreography)
    }

    pub fn unregister(&self, name: &str) -> Result<Arc<Choreography>, CoreError> {
        self.entries
            .remove(name)
            .map(|(_, choreography)| choreography)
            .ok_or_else(|| CoreError::ChoreographyNotFound {
                name: name.to_owned(),
            })
    }

    pub fn get(&self, name: &str) -> Result<Arc<Choreography>, CoreError> {
        self.entries
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| CoreError::ChoreographyNotFound {
                name: name.to_owned(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Sorted names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Point-in-time copy of every entry, sorted by name.
    pub fn snapshot(&self) -> Vec<Arc<Choreography>> {
        let mut all: Vec<Arc<Choreography>> =
            self.entries.iter().map(|e| Arc::clone(e.value())).collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
