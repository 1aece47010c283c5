// ── Device registry ──
//
// Serial → device map shared by every connection. Lookups and inserts go
// through a sharded `DashMap`; no shard guard is ever held across an
// `.await`, so a slow device exchange never blocks the registry.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use nabd_proto::Packet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bunny::{Bunny, BunnySnapshot, PollOutcome};
use crate::config::DEFAULT_PING_INTERVAL;
use crate::error::CoreError;
use crate::event::DeviceRequest;
use crate::plugin::Effect;
use crate::store::resource_path;

/// The set of devices known to one server.
#[derive(Debug)]
pub struct Burrow {
    id: Uuid,
    bunnies: DashMap<String, Arc<Bunny>>,
    default_ping_interval: u8,
}

impl Default for Burrow {
    fn default() -> Self {
        Self::new()
    }
}

impl Burrow {
    pub fn new() -> Self {
        Self::with_default_ping_interval(DEFAULT_PING_INTERVAL)
    }

    /// Devices created by this burrow start with `secs` between polls.
    pub fn with_default_ping_interval(secs: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            bunnies: DashMap::new(),
            default_ping_interval: secs,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn default_ping_interval(&self) -> u8 {
        self.default_ping_interval
    }

    // ── Membership ──────────────────────────────────────────────────

    /// Create and register a device for `serial`. An existing device with
    /// the same serial is returned unchanged.
    pub fn add(&self, serial: &str) -> Arc<Bunny> {
        self.get_or_add(serial)
    }

    /// Register an existing device. Fails if another burrow owns it.
    pub fn add_bunny(&self, bunny: Arc<Bunny>) -> Result<(), CoreError> {
        if !bunny.claim(self.id) {
            return Err(CoreError::AlreadyRegistered {
                serial: bunny.serial().to_owned(),
            });
        }
        let serial = bunny.serial().to_owned();
        let previous = self.bunnies.insert(serial, Arc::clone(&bunny));
        if let Some(replaced) = previous.filter(|p| !Arc::ptr_eq(p, &bunny)) {
            replaced.release();
        }
        debug!(serial = bunny.serial(), "bunny registered");
        Ok(())
    }

    /// Resolve `serial`, creating the device on first sight.
    pub fn get_or_add(&self, serial: &str) -> Arc<Bunny> {
        let serial = normalize(serial);
        match self.bunnies.entry(serial) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let bunny = Arc::new(Bunny::with_ping_interval(
                    entry.key(),
                    self.default_ping_interval,
                ));
                bunny.claim(self.id);
                info!(serial = bunny.serial(), "new bunny");
                Arc::clone(entry.insert(bunny).value())
            }
        }
    }

    /// Unregister a device and clear its back-reference.
    pub fn remove(&self, serial: &str) -> Result<Arc<Bunny>, CoreError> {
        let serial = normalize(serial);
        let (_, bunny) = self
            .bunnies
            .remove(&serial)
            .ok_or(CoreError::BunnyNotFound { serial })?;
        bunny.release();
        debug!(serial = bunny.serial(), "bunny removed");
        Ok(bunny)
    }

    pub fn get(&self, serial: &str) -> Result<Arc<Bunny>, CoreError> {
        let serial = normalize(serial);
        self.bunnies
            .get(&serial)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(CoreError::BunnyNotFound { serial })
    }

    pub fn contains(&self, serial: &str) -> bool {
        self.bunnies.contains_key(&normalize(serial))
    }

    /// Whether this very device (not just its serial) is registered here.
    pub fn contains_bunny(&self, bunny: &Bunny) -> bool {
        bunny.burrow() == Some(self.id) && self.contains(bunny.serial())
    }

    pub fn len(&self) -> usize {
        self.bunnies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bunnies.is_empty()
    }

    /// Sorted serials.
    pub fn serials(&self) -> Vec<String> {
        let mut serials: Vec<String> = self.bunnies.iter().map(|e| e.key().clone()).collect();
        serials.sort();
        serials
    }

    /// Point-in-time list of devices, sorted by serial.
    pub fn bunnies(&self) -> Vec<Arc<Bunny>> {
        let mut all: Vec<Arc<Bunny>> = self.bunnies.iter().map(|e| Arc::clone(e.value())).collect();
        all.sort_by(|a, b| a.serial().cmp(b.serial()));
        all
    }

    /// Serializable view of every device.
    pub async fn snapshot(&self) -> Vec<BunnySnapshot> {
        let mut out = Vec::with_capacity(self.len());
        for bunny in self.bunnies() {
            out.push(bunny.snapshot().await);
        }
        out
    }

    // ── Device exchange ─────────────────────────────────────────────

    /// Run one device exchange and return the packet to send back.
    ///
    /// Effects requested by plugins are applied after the device lock is
    /// released and before the response packet is taken, so a recording
    /// played back to its own device goes out in this same response.
    pub async fn poll(&self, request: &DeviceRequest, resources_root: &Path) -> Packet {
        let bunny = self.get_or_add(&request.serial);
        let packet = match bunny.poll(request).await {
            PollOutcome::Ready(packet) => packet,
            PollOutcome::Pending(effects) => {
                self.apply(effects, resources_root).await;
                bunny.take_packet().await
            }
        };
        debug!(serial = bunny.serial(), %packet, "packet out");
        packet
    }

    /// Carry out deferred plugin work. Failures are logged, never propagated.
    pub async fn apply(&self, effects: Vec<Effect>, resources_root: &Path) {
        for effect in effects {
            match effect {
                Effect::StoreFile { path, data } => {
                    store_logged(resources_root, &path, data).await;
                }
                Effect::Deliver { serial, packet } => self.deliver(&serial, packet).await,
                Effect::StoreThenDeliver {
                    path,
                    data,
                    serial,
                    packet,
                } => {
                    if store_logged(resources_root, &path, data).await {
                        self.deliver(&serial, packet).await;
                    } else {
                        warn!(%serial, path = %path.display(), "dropping packet for unstored file");
                    }
                }
            }
        }
    }

    async fn deliver(&self, serial: &str, packet: Packet) {
        match self.get(serial) {
            Ok(bunny) => bunny.enqueue(packet).await,
            Err(_) => warn!(%serial, "dropping packet for unknown bunny"),
        }
    }
}

// ── Private helpers ─────────────────────────────────────────────────

fn normalize(serial: &str) -> String {
    serial.to_ascii_lowercase()
}

/// `store_file`, with failures logged. Returns whether the file was written.
async fn store_logged(root: &Path, relative: &Path, data: Bytes) -> bool {
    match store_file(root, relative, data).await {
        Ok(()) => true,
        Err(err) => {
            warn!(path = %relative.display(), "cannot store file: {err}");
            false
        }
    }
}

async fn store_file(root: &Path, relative: &Path, data: Bytes) -> Result<(), CoreError> {
    let path = resource_path(root, relative).ok_or_else(|| CoreError::Persistence {
        path: relative.to_path_buf(),
        reason: "path escapes the resources root".into(),
    })?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, &data).await?;
    debug!(path = %path.display(), bytes = data.len(), "file stored");
    Ok(())
}
