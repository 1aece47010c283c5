// ── Built-in plugins ──

use bytes::Bytes;
use nabd_proto::{Block, MessageBlock, Packet};
use rand::Rng;
use tracing::info;

use super::{ALL_CAPABILITIES, Capability, EventContext, Plugin, PluginDescriptor};

/// Message id used for dice sounds.
pub const DICE_MESSAGE_ID: u32 = 333;

/// Message id used for recorded-voice playback.
pub const RECORD_MESSAGE_ID: u32 = 600;

pub(crate) fn descriptors() -> [PluginDescriptor; 5] {
    [
        PluginDescriptor {
            name: "null",
            summary: "Listens to every event and does nothing",
            capabilities: ALL_CAPABILITIES,
            parameters: &[],
            factory: || Box::new(NullPlugin),
        },
        PluginDescriptor {
            name: "logger",
            summary: "Logs every event",
            capabilities: ALL_CAPABILITIES,
            parameters: &[],
            factory: || Box::new(LoggerPlugin),
        },
        PluginDescriptor {
            name: "dice",
            summary: "Rolls one die on click, two on double click",
            capabilities: &[Capability::Click],
            parameters: &[],
            factory: || Box::new(DicePlugin),
        },
        PluginDescriptor {
            name: "echo",
            summary: "Plays a recording back to its author",
            capabilities: &[Capability::Record],
            parameters: &[],
            factory: || Box::new(EchoPlugin),
        },
        PluginDescriptor {
            name: "talkie",
            summary: "Forwards recordings to another bunny",
            capabilities: &[Capability::Record],
            parameters: &["receiver"],
            factory: || Box::new(TalkiePlugin),
        },
    ]
}

// ── null ────────────────────────────────────────────────────────────

pub struct NullPlugin;

impl Plugin for NullPlugin {}

// ── logger ──────────────────────────────────────────────────────────

pub struct LoggerPlugin;

impl Plugin for LoggerPlugin {
    fn on_ping(&mut self, ctx: &mut EventContext<'_>) {
        info!(serial = %ctx.serial(), "ping");
    }

    fn on_single_click(&mut self, ctx: &mut EventContext<'_>) {
        info!(serial = %ctx.serial(), "single click");
    }

    fn on_double_click(&mut self, ctx: &mut EventContext<'_>) {
        info!(serial = %ctx.serial(), "double click");
    }

    fn on_end_of_message(&mut self, ctx: &mut EventContext<'_>) {
        info!(serial = %ctx.serial(), "end of message");
    }

    fn on_click_while_playing(&mut self, ctx: &mut EventContext<'_>) {
        info!(serial = %ctx.serial(), "click while playing");
    }

    fn on_ears_move(&mut self, ctx: &mut EventContext<'_>, right: u8, left: u8) {
        info!(serial = %ctx.serial(), right, left, "ears moved");
    }

    fn on_rfid(&mut self, ctx: &mut EventContext<'_>, tag: &str) {
        info!(serial = %ctx.serial(), tag, "rfid");
    }

    fn on_simple_record(&mut self, ctx: &mut EventContext<'_>, audio: &Bytes) {
        info!(serial = %ctx.serial(), bytes = audio.len(), "single-click record");
    }

    fn on_double_record(&mut self, ctx: &mut EventContext<'_>, audio: &Bytes) {
        info!(serial = %ctx.serial(), bytes = audio.len(), "double-click record");
    }
}

// ── dice ────────────────────────────────────────────────────────────

pub struct DicePlugin;

impl DicePlugin {
    fn roll() -> u8 {
        rand::rng().random_range(1..=6)
    }

    fn die_sound(face: u8) -> String {
        format!("/sounds/dice/{face}.mp3")
    }
}

impl Plugin for DicePlugin {
    fn on_single_click(&mut self, ctx: &mut EventContext<'_>) {
        let message = MessageBlock::new(DICE_MESSAGE_ID)
            .play_local_sound("/sounds/dice/get.mp3")
            .wait_previous_end()
            .play_local_sound(Self::die_sound(Self::roll()))
            .wait_previous_end();
        ctx.send(
            Packet::new()
                .with_block(Block::Message(message))
                .with_block(Block::PingInterval(1)),
        );
    }

    fn on_double_click(&mut self, ctx: &mut EventContext<'_>) {
        let message = MessageBlock::new(DICE_MESSAGE_ID)
            .play_remote_sound("/sounds/dice/get.mp3")
            .wait_previous_end()
            .play_remote_sound(Self::die_sound(Self::roll()))
            .wait_previous_end()
            .play_remote_sound(Self::die_sound(Self::roll()))
            .wait_previous_end();
        ctx.send(
            Packet::new()
                .with_block(Block::Message(message))
                .with_block(Block::PingInterval(1)),
        );
    }
}

// ── echo ────────────────────────────────────────────────────────────

pub struct EchoPlugin;

impl Plugin for EchoPlugin {
    fn on_simple_record(&mut self, ctx: &mut EventContext<'_>, audio: &Bytes) {
        let serial = ctx.serial().to_owned();
        let file = format!("records/echo-{serial}.wav");
        let packet = playback(&file);
        ctx.store_then_send_to(serial, file, audio.clone(), packet);
    }
}

// ── talkie ──────────────────────────────────────────────────────────

pub struct TalkiePlugin;

impl Plugin for TalkiePlugin {
    fn on_simple_record(&mut self, ctx: &mut EventContext<'_>, audio: &Bytes) {
        let Some(receiver) = ctx.parameter("receiver").map(str::to_ascii_lowercase) else {
            return;
        };
        let file = format!("records/message-{receiver}.wav");
        let packet = playback(&file);
        ctx.store_then_send_to(receiver, file, audio.clone(), packet);
    }
}

/// Play a stored recording once, then poll again quickly.
fn playback(file: &str) -> Packet {
    let message = MessageBlock::new(RECORD_MESSAGE_ID)
        .play_local_sound(format!("/{file}"))
        .wait_previous_end();
    Packet::new()
        .with_block(Block::Message(message))
        .with_block(Block::PingInterval(1))
}
