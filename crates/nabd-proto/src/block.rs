// ── Packet blocks ──
//
// A block is the typed unit inside a packet: `type:u8 length:u24be data`.
// Blocks know how to encode themselves; the packet only frames them.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::Error;

/// Block type bytes as written on the wire.
pub mod opcode {
    pub const PING_INTERVAL: u8 = 0x03;
    pub const AMBIENT: u8 = 0x04;
    pub const MESSAGE: u8 = 0x0A;
    pub const CHOREOGRAPHY: u8 = 0x0C;
}

/// Largest data section a block can carry (24-bit length field).
pub const MAX_BLOCK_LEN: usize = 0x00FF_FFFF;

/// Idle ambient payload: no service is animated.
const AMBIENT_PAYLOAD: [u8; 4] = [0x7F, 0xFF, 0xFF, 0xFE];

// ── Message sub-commands ────────────────────────────────────────────

/// One instruction inside a [`MessageBlock`], executed in order by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageCommand {
    /// Play a sound served by this server (`MU`).
    PlayLocalSound(String),
    /// Stream a sound from a remote URL (`ST`).
    PlayRemoteSound(String),
    /// Block until the previous command has finished playing (`MW`).
    WaitPreviousEnd,
    /// Fetch and play a choreography (`CH`).
    PlayChoreography(String),
}

impl fmt::Display for MessageCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlayLocalSound(path) => write!(f, "MU {path}"),
            Self::PlayRemoteSound(url) => write!(f, "ST {url}"),
            Self::WaitPreviousEnd => f.write_str("MW"),
            Self::PlayChoreography(path) => write!(f, "CH {path}"),
        }
    }
}

/// A message: an opaque numeric id followed by ordered sub-commands.
///
/// The id is echoed back by the device in the `tc` poll parameter once the
/// message has played, which is how wake/sleep state is observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBlock {
    id: u32,
    commands: Vec<MessageCommand>,
}

impl MessageBlock {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            commands: Vec::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn commands(&self) -> &[MessageCommand] {
        &self.commands
    }

    pub fn push(&mut self, command: MessageCommand) -> &mut Self {
        self.commands.push(command);
        self
    }

    pub fn play_local_sound(mut self, path: impl Into<String>) -> Self {
        self.commands.push(MessageCommand::PlayLocalSound(path.into()));
        self
    }

    pub fn play_remote_sound(mut self, url: impl Into<String>) -> Self {
        self.commands.push(MessageCommand::PlayRemoteSound(url.into()));
        self
    }

    pub fn wait_previous_end(mut self) -> Self {
        self.commands.push(MessageCommand::WaitPreviousEnd);
        self
    }

    pub fn play_choreography(mut self, path: impl Into<String>) -> Self {
        self.commands
            .push(MessageCommand::PlayChoreography(path.into()));
        self
    }

    /// Text form carried in the block's data section.
    pub fn script(&self) -> String {
        let mut out = format!("ID {}\n", self.id);
        for command in &self.commands {
            out.push_str(&command.to_string());
            out.push('\n');
        }
        out
    }
}

// ── Block ───────────────────────────────────────────────────────────

/// A typed unit inside a [`Packet`](crate::Packet).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// Seconds the device waits before polling again.
    PingInterval(u8),
    /// Sound/message script.
    Message(MessageBlock),
    /// Idle filler sent when nothing else is queued.
    Ambient,
    /// Pre-encoded timed ear/LED commands.
    Choreography(Bytes),
}

impl Block {
    /// Wire type byte.
    pub fn kind(&self) -> u8 {
        match self {
            Self::PingInterval(_) => opcode::PING_INTERVAL,
            Self::Message(_) => opcode::MESSAGE,
            Self::Ambient => opcode::AMBIENT,
            Self::Choreography(_) => opcode::CHOREOGRAPHY,
        }
    }

    pub fn is_ping_interval(&self) -> bool {
        matches!(self, Self::PingInterval(_))
    }

    /// Append `type length data` to `buf`. Fails when the data does not
    /// fit the 24-bit length field; nothing is written in that case.
    pub(crate) fn encode_into(&self, buf: &mut BytesMut) -> Result<(), Error> {
        match self {
            Self::PingInterval(secs) => put_block(buf, self.kind(), &[*secs]),
            Self::Message(message) => put_block(buf, self.kind(), message.script().as_bytes()),
            Self::Ambient => put_block(buf, self.kind(), &AMBIENT_PAYLOAD),
            Self::Choreography(data) => put_block(buf, self.kind(), data),
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PingInterval(secs) => write!(f, "ping {secs}s"),
            Self::Message(message) => {
                write!(f, "message #{}", message.id)?;
                if !message.commands.is_empty() {
                    let commands: Vec<String> =
                        message.commands.iter().map(ToString::to_string).collect();
                    write!(f, " [{}]", commands.join("; "))?;
                }
                Ok(())
            }
            Self::Ambient => f.write_str("ambient"),
            Self::Choreography(data) => write!(f, "choreography ({} bytes)", data.len()),
        }
    }
}

fn put_block(buf: &mut BytesMut, kind: u8, data: &[u8]) -> Result<(), Error> {
    let too_large = || Error::BlockTooLarge {
        kind,
        size: data.len(),
        limit: MAX_BLOCK_LEN,
    };
    if data.len() > MAX_BLOCK_LEN {
        return Err(too_large());
    }
    let len = u32::try_from(data.len()).map_err(|_| too_large())?;
    buf.put_u8(kind);
    // 24-bit big-endian length: drop the high byte of the u32.
    buf.put_slice(&len.to_be_bytes()[1..]);
    buf.put_slice(data);
    Ok(())
}
