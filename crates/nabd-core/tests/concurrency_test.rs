// Concurrency properties of the registry and per-device state.
#![allow(clippy::unwrap_used)]

use std::path::Path;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;

use nabd_core::proto::{Block, MessageBlock, Packet};
use nabd_core::{
    Burrow, Capability, DeviceRequest, Event, EventContext, Plugin, PluginDescriptor, PluginRegistry,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn ping(serial: &str) -> DeviceRequest {
    DeviceRequest::new(serial, Some(Event::Ping))
}

fn message_id(packet: &Packet) -> Option<u32> {
    packet.blocks().iter().find_map(|block| match block {
        Block::Message(message) => Some(message.id()),
        _ => None,
    })
}

/// Blocks the calling handler until the test opens it.
static GATE: (Mutex<bool>, Condvar) = (Mutex::new(false), Condvar::new());

struct Gate;

impl Plugin for Gate {
    fn on_single_click(&mut self, _ctx: &mut EventContext<'_>) {
        let (lock, cvar) = &GATE;
        let guard = lock.lock().unwrap();
        let _unused = cvar
            .wait_timeout_while(guard, Duration::from_secs(10), |open| !*open)
            .unwrap();
    }
}

fn open_gate() {
    let (lock, cvar) = &GATE;
    *lock.lock().unwrap() = true;
    cvar.notify_all();
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_device_packets_delivered_exactly_once() {
    let burrow = Arc::new(Burrow::new());
    let root = tempfile::tempdir().unwrap();
    let bunny = burrow.add("ab");
    burrow
        .poll(&ping("ab").with_last_played("1"), root.path())
        .await;

    for id in 1..=100 {
        bunny
            .enqueue(Packet::new().with_block(Block::Message(MessageBlock::new(id))))
            .await;
    }

    let mut tasks = Vec::new();
    for _ in 0..100 {
        let burrow = Arc::clone(&burrow);
        let root = root.path().to_path_buf();
        tasks.push(tokio::spawn(async move {
            let packet = burrow.poll(&ping("AB"), &root).await;
            assert_eq!(packet.ping_interval(), Some(1));
            message_id(&packet)
        }));
    }

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap().unwrap());
    }
    ids.sort_unstable();
    assert_eq!(ids, (1..=100).collect::<Vec<u32>>());
    assert_eq!(bunny.queue_len().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_devices_all_get_created() {
    let burrow = Arc::new(Burrow::new());
    let root = tempfile::tempdir().unwrap();

    let mut tasks = Vec::new();
    for n in 0..50 {
        let burrow = Arc::clone(&burrow);
        let root = root.path().to_path_buf();
        tasks.push(tokio::spawn(async move {
            let serial = format!("00{n:02X}");
            for _ in 0..10 {
                burrow.poll(&ping(&serial), &root).await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(burrow.len(), 50);
    assert!(burrow.serials().iter().all(|s| s == &s.to_lowercase()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_busy_device_blocks_only_itself() {
    let mut registry = PluginRegistry::new();
    registry.register(PluginDescriptor {
        name: "gate",
        summary: "holds the device lock",
        capabilities: &[Capability::Click],
        parameters: &[],
        factory: || Box::new(Gate),
    });

    let burrow = Arc::new(Burrow::new());
    let slow = burrow.add("slow");
    let fast = burrow.add("fast");
    slow.attach(registry.create("gate").unwrap()).await;

    let held = {
        let burrow = Arc::clone(&burrow);
        tokio::spawn(async move {
            let click = DeviceRequest::new("slow", Some(Event::SingleClick)).with_last_played("1");
            burrow.poll(&click, Path::new("unused")).await
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The other device answers immediately.
    let packet = tokio::time::timeout(
        Duration::from_secs(2),
        burrow.poll(&ping("fast").with_last_played("1"), Path::new("unused")),
    )
    .await
    .expect("other device is not blocked");
    assert_eq!(packet, Packet::idle(20));
    assert!(fast.is_connected().await);

    // The busy device is serialized behind its running handler.
    assert!(
        tokio::time::timeout(Duration::from_millis(200), slow.queue_len())
            .await
            .is_err()
    );
    assert!(!held.is_finished());

    open_gate();
    let packet = held.await.unwrap();
    assert_eq!(packet, Packet::idle(20));
}
