//! Device engine for nabd: per-device state, plugin dispatch, the device
//! registry and the connection dispatcher.
//!
//! - **[`Bunny`]**: one device. Holds its packet queue, attached plugins and
//!   bookkeeping behind a single async mutex, so a whole poll (event
//!   dispatch plus dequeue) is atomic per device.
//!
//! - **[`Burrow`]**: the serial → device registry (`DashMap`), shared by
//!   every connection. Runs device exchanges and applies the [`Effect`]s
//!   plugins defer until the device lock is released.
//!
//! - **Plugins** ([`plugin`]): the [`Plugin`] trait, capability-tagged
//!   [`PluginHandle`]s and a static [`PluginRegistry`] of built-ins.
//!
//! - **[`MicroServer`]**: TCP accept loop with one task per connection and
//!   graceful shutdown via `CancellationToken`.
//!
//! - **Stores** ([`store`]): the in-memory [`ChoreographyLibrary`] and the
//!   on-disk [`StateStore`].
//!
//! Wire formats live in `nabd-proto`; configuration files are read by
//! `nabd-config`, which hands a [`ServerConfig`] in.

pub mod bunny;
pub mod burrow;
pub mod config;
pub mod error;
pub mod event;
pub mod plugin;
pub mod server;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bunny::{Bunny, BunnySnapshot, PluginSnapshot, PollOutcome};
pub use burrow::Burrow;
pub use config::ServerConfig;
pub use error::CoreError;
pub use event::{DeviceRequest, Endpoint, Event, RecordMode};
pub use plugin::{
    Capability, Effect, EventContext, Plugin, PluginDescriptor, PluginHandle, PluginRegistry,
};
pub use server::MicroServer;
pub use store::{ChoreographyLibrary, StateStore};

pub use nabd_proto as proto;
