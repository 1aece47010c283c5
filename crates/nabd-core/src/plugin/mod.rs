// ── Plugin boundary ──
//
// Plugins react to device events. Each one declares the capabilities it
// handles and a fixed set of parameter names; the device only calls a plugin
// for events matching its capabilities, in attach order.
//
// Handlers run while the device is locked. They may queue packets on their
// own device directly, but anything touching another device or the
// filesystem is recorded as an `Effect` and applied after the lock is gone.

pub mod builtin;
pub mod registry;

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::path::PathBuf;

use bytes::Bytes;
use nabd_proto::{Block, Packet};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::CoreError;
use crate::event::{Event, RecordMode};

pub use registry::{PluginDescriptor, PluginRegistry};

/// An event family a plugin can subscribe to.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Single and double clicks.
    Click,
    /// Keep-alive polls with an empty queue.
    Ping,
    /// Ear movement by hand.
    Ears,
    /// End of message and click while playing.
    Stop,
    /// Voice recordings.
    Record,
    /// RFID tag scans.
    Rfid,
}

/// Every capability, for plugins that want to see everything.
pub const ALL_CAPABILITIES: &[Capability] = &[
    Capability::Click,
    Capability::Ping,
    Capability::Ears,
    Capability::Stop,
    Capability::Record,
    Capability::Rfid,
];

// ── Plugin trait ────────────────────────────────────────────────────

/// Event callbacks. Every method defaults to doing nothing, so a plugin only
/// implements the events behind the capabilities it declares.
pub trait Plugin: Send {
    fn on_ping(&mut self, _ctx: &mut EventContext<'_>) {}

    fn on_single_click(&mut self, _ctx: &mut EventContext<'_>) {}

    fn on_double_click(&mut self, _ctx: &mut EventContext<'_>) {}

    fn on_end_of_message(&mut self, _ctx: &mut EventContext<'_>) {}

    fn on_click_while_playing(&mut self, _ctx: &mut EventContext<'_>) {}

    fn on_ears_move(&mut self, _ctx: &mut EventContext<'_>, _right: u8, _left: u8) {}

    fn on_rfid(&mut self, _ctx: &mut EventContext<'_>, _tag: &str) {}

    fn on_simple_record(&mut self, _ctx: &mut EventContext<'_>, _audio: &Bytes) {}

    fn on_double_record(&mut self, _ctx: &mut EventContext<'_>, _audio: &Bytes) {}
}

/// Route `event` to the matching callback.
pub(crate) fn deliver(plugin: &mut dyn Plugin, ctx: &mut EventContext<'_>, event: &Event) {
    match event {
        Event::Ping => plugin.on_ping(ctx),
        Event::SingleClick => plugin.on_single_click(ctx),
        Event::DoubleClick => plugin.on_double_click(ctx),
        Event::EndOfMessage => plugin.on_end_of_message(ctx),
        Event::ClickWhilePlaying => plugin.on_click_while_playing(ctx),
        Event::EarsMove { right, left } => plugin.on_ears_move(ctx, *right, *left),
        Event::Rfid { tag } => plugin.on_rfid(ctx, tag),
        Event::Record {
            mode: RecordMode::Simple,
            audio,
        } => plugin.on_simple_record(ctx, audio),
        Event::Record {
            mode: RecordMode::Double,
            audio,
        } => plugin.on_double_record(ctx, audio),
    }
}

// ── Effects ─────────────────────────────────────────────────────────

/// Work a handler asked for that must happen outside the device lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Queue `packet` on another device.
    Deliver { serial: String, packet: Packet },
    /// Write `data` to `path`, relative to the resources root.
    StoreFile { path: PathBuf, data: Bytes },
    /// Write `data` to `path`, then queue `packet` on `serial`. Nothing is
    /// queued if the write fails.
    StoreThenDeliver {
        path: PathBuf,
        data: Bytes,
        serial: String,
        packet: Packet,
    },
}

/// Append the device's ping interval when the packet carries none.
pub(crate) fn with_ping_interval(mut packet: Packet, ping_interval: u8) -> Packet {
    if !packet.has_ping_interval() {
        packet.push(Block::PingInterval(ping_interval));
    }
    packet
}

// ── Event context ───────────────────────────────────────────────────

/// What a handler can see and do while reacting to one event.
pub struct EventContext<'a> {
    serial: &'a str,
    ping_interval: u8,
    queue: &'a mut VecDeque<Packet>,
    parameters: &'a BTreeMap<String, Option<String>>,
    effects: &'a mut Vec<Effect>,
}

impl<'a> EventContext<'a> {
    pub(crate) fn new(
        serial: &'a str,
        ping_interval: u8,
        queue: &'a mut VecDeque<Packet>,
        parameters: &'a BTreeMap<String, Option<String>>,
        effects: &'a mut Vec<Effect>,
    ) -> Self {
        Self {
            serial,
            ping_interval,
            queue,
            parameters,
            effects,
        }
    }

    /// Serial of the device that raised the event.
    pub fn serial(&self) -> &str {
        self.serial
    }

    pub fn ping_interval(&self) -> u8 {
        self.ping_interval
    }

    /// Value of one of this plugin's parameters, if set.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).and_then(Option::as_deref)
    }

    /// Queue a packet on this device.
    pub fn send(&mut self, packet: Packet) {
        self.queue
            .push_back(with_ping_interval(packet, self.ping_interval));
    }

    /// Queue a packet on another device once this event is done.
    pub fn send_to(&mut self, serial: impl Into<String>, packet: Packet) {
        self.effects.push(Effect::Deliver {
            serial: serial.into(),
            packet,
        });
    }

    /// Write a file under the resources root before the response goes out.
    pub fn store_file(&mut self, path: impl Into<PathBuf>, data: Bytes) {
        self.effects.push(Effect::StoreFile {
            path: path.into(),
            data,
        });
    }

    /// Write a file, then queue `packet` on `serial` once the file exists.
    /// Use this when the packet refers to the file.
    pub fn store_then_send_to(
        &mut self,
        serial: impl Into<String>,
        path: impl Into<PathBuf>,
        data: Bytes,
        packet: Packet,
    ) {
        self.effects.push(Effect::StoreThenDeliver {
            path: path.into(),
            data,
            serial: serial.into(),
            packet,
        });
    }
}

// ── Plugin handle ───────────────────────────────────────────────────

/// A plugin instance plus its declaration, parameter values and owner.
///
/// Handles compare by name: a device holds at most one plugin per name.
pub struct PluginHandle {
    descriptor: PluginDescriptor,
    parameters: BTreeMap<String, Option<String>>,
    bunny: Option<String>,
    plugin: Box<dyn Plugin>,
}

impl PluginHandle {
    pub(crate) fn new(descriptor: PluginDescriptor) -> Self {
        let parameters = descriptor
            .parameters
            .iter()
            .map(|name| ((*name).to_owned(), None))
            .collect();
        Self {
            plugin: (descriptor.factory)(),
            descriptor,
            parameters,
            bunny: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    pub fn capabilities(&self) -> &'static [Capability] {
        self.descriptor.capabilities
    }

    pub fn handles(&self, capability: Capability) -> bool {
        self.descriptor.capabilities.contains(&capability)
    }

    pub fn parameter_names(&self) -> &'static [&'static str] {
        self.descriptor.parameters
    }

    /// Set a declared parameter. Unknown names are rejected.
    pub fn set_parameter(&mut self, name: &str, value: impl Into<String>) -> Result<(), CoreError> {
        let slot = self
            .parameters
            .get_mut(name)
            .ok_or_else(|| CoreError::InvalidParameter {
                plugin: self.descriptor.name.to_owned(),
                parameter: name.to_owned(),
            })?;
        *slot = Some(value.into());
        Ok(())
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).and_then(Option::as_deref)
    }

    pub fn is_parameter_set(&self, name: &str) -> bool {
        self.parameter(name).is_some()
    }

    pub fn parameters(&self) -> &BTreeMap<String, Option<String>> {
        &self.parameters
    }

    /// Serial of the device this handle is attached to.
    pub fn bunny(&self) -> Option<&str> {
        self.bunny.as_deref()
    }

    pub(crate) fn set_bunny(&mut self, serial: Option<String>) {
        self.bunny = serial;
    }

    /// Run this handle's plugin for `event` with access to the device queue.
    pub(crate) fn dispatch(
        &mut self,
        serial: &str,
        ping_interval: u8,
        queue: &mut VecDeque<Packet>,
        effects: &mut Vec<Effect>,
        event: &Event,
    ) {
        let mut ctx = EventContext::new(serial, ping_interval, queue, &self.parameters, effects);
        deliver(self.plugin.as_mut(), &mut ctx, event);
    }
}

impl PartialEq for PluginHandle {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor.name == other.descriptor.name
    }
}

impl Eq for PluginHandle {}

impl fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHandle")
            .field("name", &self.descriptor.name)
            .field("capabilities", &self.descriptor.capabilities)
            .field("parameters", &self.parameters)
            .field("bunny", &self.bunny)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use nabd_proto::MessageBlock;
    use pretty_assertions::assert_eq;

    fn talkie() -> PluginHandle {
        PluginRegistry::builtin().create("talkie").unwrap()
    }

    #[test]
    fn parameters_start_unset() {
        let handle = talkie();
        assert_eq!(handle.parameter_names(), &["receiver"]);
        assert!(!handle.is_parameter_set("receiver"));
        assert_eq!(handle.parameter("receiver"), None);
    }

    #[test]
    fn set_known_parameter() {
        let mut handle = talkie();
        handle.set_parameter("receiver", "0013d3849a3b").unwrap();
        assert!(handle.is_parameter_set("receiver"));
        assert_eq!(handle.parameter("receiver"), Some("0013d3849a3b"));
    }

    #[test]
    fn set_unknown_parameter_is_rejected() {
        let mut handle = talkie();
        let err = handle.set_parameter("volume", "11").unwrap_err();
        assert!(matches!(err, CoreError::InvalidParameter { ref parameter, .. } if parameter == "volume"));
        assert!(!handle.parameters().contains_key("volume"));
    }

    #[test]
    fn handles_compare_by_name() {
        assert_eq!(talkie(), talkie());
        assert_ne!(talkie(), PluginRegistry::builtin().create("null").unwrap());
    }

    #[test]
    fn send_appends_device_interval_when_missing() {
        let mut queue = VecDeque::new();
        let mut effects = Vec::new();
        let params = BTreeMap::new();
        let mut ctx = EventContext::new("ab", 20, &mut queue, &params, &mut effects);

        ctx.send(Packet::new().with_block(Block::Message(MessageBlock::new(1))));
        ctx.send(Packet::new().with_block(Block::PingInterval(1)));

        assert_eq!(queue[0].ping_interval(), Some(20));
        assert_eq!(queue[0].blocks().last(), Some(&Block::PingInterval(20)));
        assert_eq!(queue[1].ping_interval(), Some(1));
        assert_eq!(queue[1].len(), 1);
        assert!(effects.is_empty());
    }

    #[test]
    fn cross_device_work_becomes_effects() {
        let mut queue = VecDeque::new();
        let mut effects = Vec::new();
        let params = BTreeMap::new();
        let mut ctx = EventContext::new("ab", 20, &mut queue, &params, &mut effects);

        ctx.send_to("cd", Packet::idle(1));
        ctx.store_file("records/x.wav", Bytes::from_static(b"wav"));

        assert!(queue.is_empty());
        assert_eq!(effects.len(), 2);
        assert!(matches!(&effects[0], Effect::Deliver { serial, .. } if serial == "cd"));
        assert!(matches!(&effects[1], Effect::StoreFile { path, .. } if path == &PathBuf::from("records/x.wav")));
    }

    #[test]
    fn store_then_send_is_one_effect() {
        let mut queue = VecDeque::new();
        let mut effects = Vec::new();
        let params = BTreeMap::new();
        let mut ctx = EventContext::new("ab", 20, &mut queue, &params, &mut effects);

        ctx.store_then_send_to("ab", "records/x.wav", Bytes::from_static(b"wav"), Packet::idle(1));

        assert!(queue.is_empty());
        assert_eq!(
            effects,
            vec![Effect::StoreThenDeliver {
                path: PathBuf::from("records/x.wav"),
                data: Bytes::from_static(b"wav"),
                serial: "ab".into(),
                packet: Packet::idle(1),
            }]
        );
    }

    #[test]
    fn capability_names() {
        assert_eq!(Capability::Rfid.to_string(), "rfid");
        assert_eq!("click".parse::<Capability>().unwrap(), Capability::Click);
    }
}
