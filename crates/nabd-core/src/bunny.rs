// ── Device state machine ──
//
// One `Bunny` per device serial. All mutable state sits behind a single
// async mutex, so everything that happens during one poll (bookkeeping,
// plugin dispatch, popping the next packet) is atomic with respect to every
// other operation on the same device. Different devices never contend.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use nabd_proto::{Block, MessageBlock, Packet};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::config::DEFAULT_PING_INTERVAL;
use crate::error::CoreError;
use crate::event::{
    ACTIVATION_MESSAGE_ID, DeviceRequest, Event, NEVER_PLAYED, SLEEP_MESSAGE_ID, SLEEP_SENTINEL,
};
use crate::plugin::{Effect, PluginHandle, PluginRegistry, with_ping_interval};

/// Name a device carries until someone renames it.
pub const DEFAULT_NAME: &str = "Bugs";

/// A connected device and everything queued for it.
#[derive(Debug)]
pub struct Bunny {
    serial: String,
    burrow: ArcSwapOption<Uuid>,
    state: Mutex<BunnyState>,
}

#[derive(Debug)]
struct BunnyState {
    name: String,
    connected: bool,
    last_played: String,
    last_seen: Option<DateTime<Utc>>,
    ping_interval: u8,
    queue: VecDeque<Packet>,
    /// Attach order is dispatch order.
    plugins: IndexMap<String, PluginHandle>,
}

// ── Snapshots ───────────────────────────────────────────────────────

/// Point-in-time, serializable view of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BunnySnapshot {
    pub serial: String,
    pub name: String,
    pub ping_interval: u8,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub connected: bool,
    #[serde(default = "never_played")]
    pub last_played: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub queued_packets: usize,
    #[serde(default)]
    pub plugins: Vec<PluginSnapshot>,
}

/// An attached plugin and the parameters that have a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSnapshot {
    pub name: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

fn never_played() -> String {
    NEVER_PLAYED.to_owned()
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// Result of [`Bunny::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The response packet, taken in the same critical section as the
    /// request was handled.
    Ready(Packet),
    /// Plugins asked for deferred work. Apply it, then take the response
    /// with [`Bunny::take_packet`].
    Pending(Vec<Effect>),
}

// ── Bunny ───────────────────────────────────────────────────────────

impl Bunny {
    pub fn new(serial: &str) -> Self {
        Self::with_ping_interval(serial, DEFAULT_PING_INTERVAL)
    }

    pub fn with_ping_interval(serial: &str, ping_interval: u8) -> Self {
        Self {
            serial: serial.to_ascii_lowercase(),
            burrow: ArcSwapOption::empty(),
            state: Mutex::new(BunnyState {
                name: DEFAULT_NAME.to_owned(),
                connected: true,
                last_played: NEVER_PLAYED.to_owned(),
                last_seen: None,
                ping_interval,
                queue: VecDeque::new(),
                plugins: IndexMap::new(),
            }),
        }
    }

    /// Rebuild a device from persisted state. Plugins the registry does not
    /// know, and parameters a plugin does not declare, are skipped.
    pub fn restore(snapshot: &BunnySnapshot, registry: &PluginRegistry) -> Self {
        let mut bunny = Self::with_ping_interval(&snapshot.serial, snapshot.ping_interval);
        let serial = bunny.serial.clone();
        let state = bunny.state.get_mut();
        state.name.clone_from(&snapshot.name);

        for saved in &snapshot.plugins {
            let mut handle = match registry.create(&saved.name) {
                Ok(handle) => handle,
                Err(err) => {
                    warn!(%serial, plugin = %saved.name, "skipping plugin: {err}");
                    continue;
                }
            };
            for (key, value) in &saved.parameters {
                if let Err(err) = handle.set_parameter(key, value.clone()) {
                    warn!(%serial, "skipping parameter: {err}");
                }
            }
            handle.set_bunny(Some(serial.clone()));
            state.plugins.insert(saved.name.clone(), handle);
        }
        bunny
    }

    /// Lowercase serial; the device's identity.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    // ── Registry back-reference ──────────────────────────────────────

    /// Id of the burrow holding this device, if any.
    pub fn burrow(&self) -> Option<Uuid> {
        self.burrow.load().as_deref().copied()
    }

    /// Take ownership for `owner` unless another burrow already holds us.
    pub(crate) fn claim(&self, owner: Uuid) -> bool {
        let previous = self
            .burrow
            .compare_and_swap(&None::<Arc<Uuid>>, Some(Arc::new(owner)));
        match previous.as_deref() {
            None => true,
            Some(current) => *current == owner,
        }
    }

    pub(crate) fn release(&self) {
        self.burrow.store(None);
    }

    // ── Plain fields ────────────────────────────────────────────────

    pub async fn name(&self) -> String {
        self.state.lock().await.name.clone()
    }

    pub async fn set_name(&self, name: impl Into<String>) {
        self.state.lock().await.name = name.into();
    }

    pub async fn ping_interval(&self) -> u8 {
        self.state.lock().await.ping_interval
    }

    pub async fn set_ping_interval(&self, secs: u8) {
        self.state.lock().await.ping_interval = secs;
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.connected
    }

    pub async fn set_connected(&self, connected: bool) {
        self.state.lock().await.connected = connected;
    }

    pub async fn last_played(&self) -> String {
        self.state.lock().await.last_played.clone()
    }

    pub async fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.last_seen
    }

    /// A device is awake unless the last thing it played was the sleep message.
    pub async fn is_awake(&self) -> bool {
        !self
            .state
            .lock()
            .await
            .last_played
            .eq_ignore_ascii_case(SLEEP_SENTINEL)
    }

    // ── Queue ───────────────────────────────────────────────────────

    /// Queue a packet behind everything already pending. A packet without a
    /// ping-interval block gets the device's current interval.
    pub async fn enqueue(&self, packet: Packet) {
        let mut state = self.state.lock().await;
        let packet = with_ping_interval(packet, state.ping_interval);
        trace!(serial = %self.serial, %packet, "packet queued");
        state.queue.push_back(packet);
    }

    /// Pop the oldest pending packet.
    pub async fn next_packet(&self) -> Option<Packet> {
        self.state.lock().await.queue.pop_front()
    }

    pub async fn queue_len(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    /// Put the activation message in front of everything else.
    pub async fn wake_up(&self) {
        self.state.lock().await.wake_up();
    }

    /// Put the sleep message in front of everything else.
    pub async fn sleep(&self) {
        let mut state = self.state.lock().await;
        let packet = Packet::new()
            .with_block(Block::Message(MessageBlock::new(SLEEP_MESSAGE_ID)))
            .with_block(Block::PingInterval(state.ping_interval));
        state.queue.push_front(packet);
    }

    // ── Plugins ─────────────────────────────────────────────────────

    /// Attach a plugin. Returns `false` and changes nothing if a plugin with
    /// the same name is already attached.
    pub async fn attach(&self, mut handle: PluginHandle) -> bool {
        let mut state = self.state.lock().await;
        if state.plugins.contains_key(handle.name()) {
            return false;
        }
        handle.set_bunny(Some(self.serial.clone()));
        debug!(serial = %self.serial, plugin = handle.name(), "plugin attached");
        state.plugins.insert(handle.name().to_owned(), handle);
        true
    }

    /// Detach a plugin by name and hand it back, back-reference cleared.
    pub async fn detach(&self, name: &str) -> Result<PluginHandle, CoreError> {
        let mut state = self.state.lock().await;
        let mut handle = state
            .plugins
            .shift_remove(name)
            .ok_or_else(|| CoreError::PluginNotFound {
                name: name.to_owned(),
            })?;
        handle.set_bunny(None);
        debug!(serial = %self.serial, plugin = name, "plugin detached");
        Ok(handle)
    }

    pub async fn has_plugin(&self, name: &str) -> bool {
        self.state.lock().await.plugins.contains_key(name)
    }

    /// Attached plugin names in dispatch order.
    pub async fn plugin_names(&self) -> Vec<String> {
        self.state.lock().await.plugins.keys().cloned().collect()
    }

    pub async fn set_plugin_parameter(
        &self,
        plugin: &str,
        key: &str,
        value: impl Into<String>,
    ) -> Result<(), CoreError> {
        let mut state = self.state.lock().await;
        state
            .plugins
            .get_mut(plugin)
            .ok_or_else(|| CoreError::PluginNotFound {
                name: plugin.to_owned(),
            })?
            .set_parameter(key, value)
    }

    pub async fn plugin_parameter(&self, plugin: &str, key: &str) -> Result<Option<String>, CoreError> {
        let state = self.state.lock().await;
        let handle = state
            .plugins
            .get(plugin)
            .ok_or_else(|| CoreError::PluginNotFound {
                name: plugin.to_owned(),
            })?;
        if !handle.parameters().contains_key(key) {
            return Err(CoreError::InvalidParameter {
                plugin: plugin.to_owned(),
                parameter: key.to_owned(),
            });
        }
        Ok(handle.parameter(key).map(str::to_owned))
    }

    // ── Request handling ────────────────────────────────────────────

    /// Apply a device request: bookkeeping, wake-up, then event dispatch.
    /// Returns the effects plugins asked for.
    pub async fn handle_request(&self, request: &DeviceRequest) -> Vec<Effect> {
        let mut state = self.state.lock().await;
        state.handle(&self.serial, request)
    }

    /// Handle a request and, when no plugin deferred any work, take the
    /// response packet under the same lock.
    pub async fn poll(&self, request: &DeviceRequest) -> PollOutcome {
        let mut state = self.state.lock().await;
        let effects = state.handle(&self.serial, request);
        if effects.is_empty() {
            PollOutcome::Ready(state.take_packet())
        } else {
            PollOutcome::Pending(effects)
        }
    }

    /// Take the packet for a device response. With nothing queued the device
    /// gets an idle packet carrying its own ping interval.
    pub async fn take_packet(&self) -> Packet {
        self.state.lock().await.take_packet()
    }

    pub async fn snapshot(&self) -> BunnySnapshot {
        let state = self.state.lock().await;
        BunnySnapshot {
            serial: self.serial.clone(),
            name: state.name.clone(),
            ping_interval: state.ping_interval,
            connected: state.connected,
            last_played: state.last_played.clone(),
            last_seen: state.last_seen,
            queued_packets: state.queue.len(),
            plugins: state
                .plugins
                .values()
                .map(|handle| PluginSnapshot {
                    name: handle.name().to_owned(),
                    parameters: handle
                        .parameters()
                        .iter()
                        .filter_map(|(k, v)| v.as_ref().map(|v| (k.clone(), v.clone())))
                        .collect(),
                })
                .collect(),
        }
    }
}

impl PartialEq for Bunny {
    fn eq(&self, other: &Self) -> bool {
        self.serial == other.serial
    }
}

impl Eq for Bunny {}

// ── Locked state ────────────────────────────────────────────────────

impl BunnyState {
    fn wake_up(&mut self) {
        let packet = Packet::new()
            .with_block(Block::Message(MessageBlock::new(ACTIVATION_MESSAGE_ID)))
            .with_block(Block::PingInterval(1));
        self.queue.push_front(packet);
    }

    fn take_packet(&mut self) -> Packet {
        self.queue
            .pop_front()
            .unwrap_or_else(|| Packet::idle(self.ping_interval))
    }

    fn handle(&mut self, serial: &str, request: &DeviceRequest) -> Vec<Effect> {
        self.connected = true;
        self.last_seen = Some(Utc::now());
        if let Some(tc) = &request.last_played {
            self.last_played.clone_from(tc);
        }

        if self.last_played == NEVER_PLAYED {
            debug!(%serial, "device restarted, waking it up");
            self.wake_up();
        }

        let Some(event) = &request.event else {
            debug!(%serial, "ignoring an unknown event");
            return Vec::new();
        };

        // Drain before dispatch: a keep-alive with work pending just gets the
        // next packet, and the device is told to come back right away.
        if *event == Event::Ping && !self.queue.is_empty() {
            if let Some(next) = self.queue.front_mut() {
                next.set_ping_interval(1);
            }
            trace!(%serial, pending = self.queue.len(), "draining queue");
            return Vec::new();
        }

        self.dispatch(serial, event)
    }

    fn dispatch(&mut self, serial: &str, event: &Event) -> Vec<Effect> {
        let capability = event.capability();
        let mut effects = Vec::new();
        let Self {
            plugins,
            queue,
            ping_interval,
            ..
        } = self;

        debug!(%serial, %event, "dispatching");
        for handle in plugins.values_mut().filter(|h| h.handles(capability)) {
            trace!(%serial, plugin = handle.name(), "calling plugin");
            handle.dispatch(serial, *ping_interval, queue, &mut effects, event);
        }
        effects
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::event::RecordMode;
    use crate::plugin::{Capability, EventContext, Plugin, PluginDescriptor};
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    // ── Helpers ──────────────────────────────────────────────────────

    static CALLS: StdMutex<Vec<String>> = StdMutex::new(Vec::new());

    fn calls_for(serial: &str) -> Vec<String> {
        CALLS
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(serial))
            .cloned()
            .collect()
    }

    fn record(ctx: &EventContext<'_>, what: &str) {
        CALLS
            .lock()
            .unwrap()
            .push(format!("{}:{what}", ctx.serial()));
    }

    struct First;
    impl Plugin for First {
        fn on_ping(&mut self, ctx: &mut EventContext<'_>) {
            record(ctx, "first-ping");
        }
        fn on_single_click(&mut self, ctx: &mut EventContext<'_>) {
            record(ctx, "first-click");
        }
    }

    struct Second;
    impl Plugin for Second {
        fn on_ping(&mut self, ctx: &mut EventContext<'_>) {
            record(ctx, "second-ping");
        }
    }

    struct Sender;
    impl Plugin for Sender {
        fn on_rfid(&mut self, ctx: &mut EventContext<'_>, tag: &str) {
            ctx.send(Packet::new().with_block(Block::Message(MessageBlock::new(1))));
            ctx.send_to(tag, Packet::new());
        }
    }

    fn registry() -> PluginRegistry {
        let mut registry = PluginRegistry::builtin();
        registry.register(PluginDescriptor {
            name: "first",
            summary: "",
            capabilities: &[Capability::Click, Capability::Ping],
            parameters: &[],
            factory: || Box::new(First),
        });
        registry.register(PluginDescriptor {
            name: "second",
            summary: "",
            capabilities: &[Capability::Ping],
            parameters: &[],
            factory: || Box::new(Second),
        });
        registry.register(PluginDescriptor {
            name: "sender",
            summary: "",
            capabilities: &[Capability::Rfid],
            parameters: &[],
            factory: || Box::new(Sender),
        });
        registry
    }

    /// A device that has already played something, so no wake-up kicks in.
    async fn awake(serial: &str) -> Bunny {
        let bunny = Bunny::new(serial);
        bunny
            .handle_request(&DeviceRequest::new(serial, None).with_last_played("1"))
            .await;
        bunny
    }

    /// Poll, taking the response packet right away even if work is pending.
    async fn exchange(bunny: &Bunny, request: &DeviceRequest) -> (Packet, Vec<Effect>) {
        match bunny.poll(request).await {
            PollOutcome::Ready(packet) => (packet, Vec::new()),
            PollOutcome::Pending(effects) => (bunny.take_packet().await, effects),
        }
    }

    fn ping(serial: &str) -> DeviceRequest {
        DeviceRequest::new(serial, Some(Event::Ping))
    }

    fn message_packet(id: u32) -> Packet {
        Packet::new().with_block(Block::Message(MessageBlock::new(id)))
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn defaults() {
        let bunny = Bunny::new("00:13:D3:84:9A:3B");
        assert_eq!(bunny.serial(), "00:13:d3:84:9a:3b");
        assert_eq!(bunny.name().await, "Bugs");
        assert_eq!(bunny.ping_interval().await, 20);
        assert_eq!(bunny.last_played().await, "0");
        assert!(bunny.is_connected().await);
        assert!(bunny.is_awake().await);
        assert_eq!(bunny.burrow(), None);
    }

    #[tokio::test]
    async fn any_request_marks_connected() {
        let bunny = Bunny::new("ab");
        bunny.set_connected(false).await;
        assert!(!bunny.is_connected().await);

        bunny.handle_request(&DeviceRequest::new("ab", None)).await;

        assert!(bunny.is_connected().await);
    }

    #[tokio::test]
    async fn awake_unless_sleep_sentinel() {
        let bunny = Bunny::new("ab");
        bunny
            .handle_request(&DeviceRequest::new("ab", None).with_last_played("7FFFFFFE"))
            .await;
        assert!(!bunny.is_awake().await);

        bunny
            .handle_request(&DeviceRequest::new("ab", None).with_last_played("7fffffff"))
            .await;
        assert!(bunny.is_awake().await);
    }

    #[tokio::test]
    async fn enqueue_adds_device_interval() {
        let bunny = Bunny::new("ab");
        bunny.set_ping_interval(7).await;
        bunny.enqueue(message_packet(1)).await;

        let packet = bunny.next_packet().await.unwrap();
        let pings: Vec<_> = packet
            .blocks()
            .iter()
            .filter(|b| b.is_ping_interval())
            .collect();
        assert_eq!(pings, vec![&Block::PingInterval(7)]);
    }

    #[tokio::test]
    async fn enqueue_keeps_existing_interval() {
        let bunny = Bunny::new("ab");
        bunny
            .enqueue(message_packet(1).with_block(Block::PingInterval(3)))
            .await;
        assert_eq!(bunny.next_packet().await.unwrap().ping_interval(), Some(3));
    }

    #[tokio::test]
    async fn fresh_device_is_woken_up_first() {
        let bunny = Bunny::new("ab");
        bunny.enqueue(message_packet(42)).await;

        let (packet, _) = exchange(&bunny, &ping("ab").with_last_played("0")).await;

        assert_eq!(
            packet.blocks(),
            &[
                Block::Message(MessageBlock::new(ACTIVATION_MESSAGE_ID)),
                Block::PingInterval(1),
            ]
        );
        assert!(bunny.is_connected().await);
        assert!(bunny.last_seen().await.is_some());
        assert_eq!(bunny.queue_len().await, 1);
    }

    #[tokio::test]
    async fn sleep_goes_in_front() {
        let bunny = awake("ab").await;
        bunny.enqueue(message_packet(42)).await;
        bunny.sleep().await;

        let first = bunny.next_packet().await.unwrap();
        assert_eq!(
            first.blocks()[0],
            Block::Message(MessageBlock::new(SLEEP_MESSAGE_ID))
        );
        assert!(first.has_ping_interval());
    }

    #[tokio::test]
    async fn keep_alive_drains_queue_before_ping_handlers() {
        let serial = "drain01";
        let bunny = awake(serial).await;
        assert!(bunny.attach(registry().create("first").unwrap()).await);
        assert!(bunny.attach(registry().create("second").unwrap()).await);

        for id in 1..=3 {
            bunny.enqueue(message_packet(id)).await;
        }

        for id in 1..=3 {
            let (packet, effects) = exchange(&bunny, &ping(serial)).await;
            assert!(effects.is_empty());
            assert_eq!(packet.ping_interval(), Some(1));
            assert_eq!(
                packet.blocks()[0],
                Block::Message(MessageBlock::new(id))
            );
            assert!(calls_for(serial).is_empty());
        }

        let (packet, _) = exchange(&bunny, &ping(serial)).await;
        assert_eq!(packet, Packet::idle(20));
        assert_eq!(
            calls_for(serial),
            vec![
                format!("{serial}:first-ping"),
                format!("{serial}:second-ping"),
            ]
        );
    }

    #[tokio::test]
    async fn click_reaches_click_handlers_only() {
        let serial = "click01";
        let bunny = awake(serial).await;
        bunny.attach(registry().create("first").unwrap()).await;
        bunny.attach(registry().create("second").unwrap()).await;

        exchange(&bunny, &DeviceRequest::new(serial, Some(Event::SingleClick))).await;

        assert_eq!(calls_for(serial), vec![format!("{serial}:first-click")]);
    }

    #[tokio::test]
    async fn unknown_event_touches_nothing_but_bookkeeping() {
        let serial = "unknown01";
        let bunny = awake(serial).await;
        bunny.attach(registry().create("first").unwrap()).await;

        let (packet, effects) = exchange(&bunny, &DeviceRequest::new(serial, None)).await;

        assert_eq!(packet, Packet::idle(20));
        assert!(effects.is_empty());
        assert!(calls_for(serial).is_empty());
    }

    #[tokio::test]
    async fn handlers_queue_locally_and_defer_remote_sends() {
        let bunny = awake("ab").await;
        bunny.attach(registry().create("sender").unwrap()).await;

        let rfid = DeviceRequest::new("ab", Some(Event::Rfid { tag: "cd".into() }));
        let (packet, effects) = exchange(&bunny, &rfid).await;

        assert_eq!(packet.blocks()[0], Block::Message(MessageBlock::new(1)));
        assert_eq!(packet.ping_interval(), Some(20));
        assert!(matches!(&effects[..], [Effect::Deliver { serial, .. }] if serial == "cd"));
    }

    #[tokio::test]
    async fn deferred_work_leaves_response_queued() {
        let bunny = awake("ab").await;
        bunny.attach(registry().create("sender").unwrap()).await;

        let outcome = bunny
            .poll(&DeviceRequest::new("ab", Some(Event::Rfid { tag: "cd".into() })))
            .await;

        assert!(matches!(outcome, PollOutcome::Pending(ref effects) if effects.len() == 1));
        assert_eq!(bunny.queue_len().await, 1);
        assert_eq!(
            bunny.take_packet().await.blocks()[0],
            Block::Message(MessageBlock::new(1))
        );
    }

    #[tokio::test]
    async fn attach_is_idempotent_and_sets_back_reference() {
        let bunny = Bunny::new("ab");
        assert!(bunny.attach(registry().create("null").unwrap()).await);
        assert!(!bunny.attach(registry().create("null").unwrap()).await);
        assert_eq!(bunny.plugin_names().await, vec!["null".to_owned()]);

        let handle = bunny.detach("null").await.unwrap();
        assert_eq!(handle.bunny(), None);
        assert!(!bunny.has_plugin("null").await);
    }

    #[tokio::test]
    async fn detach_absent_plugin_is_not_found() {
        let bunny = Bunny::new("ab");
        bunny.attach(registry().create("dice").unwrap()).await;

        let err = bunny.detach("echo").await.unwrap_err();

        assert!(matches!(err, CoreError::PluginNotFound { .. }));
        assert_eq!(bunny.plugin_names().await, vec!["dice".to_owned()]);
    }

    #[tokio::test]
    async fn plugin_parameters_through_the_device() {
        let bunny = Bunny::new("ab");
        bunny.attach(registry().create("talkie").unwrap()).await;

        bunny
            .set_plugin_parameter("talkie", "receiver", "cd")
            .await
            .unwrap();
        assert_eq!(
            bunny.plugin_parameter("talkie", "receiver").await.unwrap(),
            Some("cd".to_owned())
        );
        assert!(matches!(
            bunny.set_plugin_parameter("talkie", "volume", "3").await,
            Err(CoreError::InvalidParameter { .. })
        ));
        assert!(matches!(
            bunny.set_plugin_parameter("echo", "x", "3").await,
            Err(CoreError::PluginNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn record_event_reaches_record_plugins() {
        let bunny = awake("ab").await;
        bunny.attach(registry().create("echo").unwrap()).await;

        let record = DeviceRequest::new(
            "ab",
            Some(Event::Record {
                mode: RecordMode::Simple,
                audio: Bytes::from_static(b"RIFF"),
            }),
        );
        let (packet, effects) = exchange(&bunny, &record).await;

        assert!(matches!(
            effects.as_slice(),
            [Effect::StoreThenDeliver { serial, .. }] if serial == "ab"
        ));
        assert_eq!(packet, Packet::idle(20));
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_restore() {
        let bunny = Bunny::new("AB");
        bunny.set_name("Peter").await;
        bunny.set_ping_interval(5).await;
        bunny.attach(registry().create("talkie").unwrap()).await;
        bunny.attach(registry().create("dice").unwrap()).await;
        bunny
            .set_plugin_parameter("talkie", "receiver", "cd")
            .await
            .unwrap();

        let snapshot = bunny.snapshot().await;
        let restored = Bunny::restore(&snapshot, &registry());

        assert_eq!(restored.serial(), "ab");
        assert_eq!(restored.name().await, "Peter");
        assert_eq!(restored.ping_interval().await, 5);
        assert_eq!(
            restored.plugin_names().await,
            vec!["talkie".to_owned(), "dice".to_owned()]
        );
        assert_eq!(
            restored.plugin_parameter("talkie", "receiver").await.unwrap(),
            Some("cd".to_owned())
        );
    }

    #[tokio::test]
    async fn restore_skips_unknown_plugins() {
        let snapshot = BunnySnapshot {
            serial: "ab".into(),
            name: "Bugs".into(),
            ping_interval: 20,
            connected: false,
            last_played: "0".into(),
            last_seen: None,
            queued_packets: 0,
            plugins: vec![
                PluginSnapshot {
                    name: "weather".into(),
                    parameters: BTreeMap::new(),
                },
                PluginSnapshot {
                    name: "null".into(),
                    parameters: BTreeMap::from([("bogus".to_owned(), "1".to_owned())]),
                },
            ],
        };

        let restored = Bunny::restore(&snapshot, &registry());

        assert_eq!(restored.plugin_names().await, vec!["null".to_owned()]);
    }
}
