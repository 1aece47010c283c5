// ── Outbound packets ──
//
// A packet is everything a device receives in one poll response:
// `0x7F block* 0xFF 0x0A`.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::block::Block;
use crate::error::Error;

const PACKET_START: u8 = 0x7F;
const PACKET_END: [u8; 2] = [0xFF, 0x0A];

/// An ordered list of blocks delivered to a device in a single response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    blocks: Vec<Block>,
}

impl Packet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The response sent when nothing is queued: poll again in `ping_interval`
    /// seconds, stay idle meanwhile.
    pub fn idle(ping_interval: u8) -> Self {
        Self::new()
            .with_block(Block::PingInterval(ping_interval))
            .with_block(Block::Ambient)
    }

    pub fn with_block(mut self, block: Block) -> Self {
        self.blocks.push(block);
        self
    }

    pub fn push(&mut self, block: Block) {
        self.blocks.push(block);
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn has_ping_interval(&self) -> bool {
        self.blocks.iter().any(Block::is_ping_interval)
    }

    /// The delay carried by the first ping-interval block, if any.
    pub fn ping_interval(&self) -> Option<u8> {
        self.blocks.iter().find_map(|block| match block {
            Block::PingInterval(secs) => Some(*secs),
            _ => None,
        })
    }

    /// Force the ping interval to `secs`.
    ///
    /// Replaces the existing ping block in place, or inserts one at the front
    /// when there is none. Any duplicate ping blocks are dropped so the packet
    /// always ends up with exactly one.
    pub fn set_ping_interval(&mut self, secs: u8) {
        let position = self.blocks.iter().position(Block::is_ping_interval);
        self.blocks.retain(|block| !block.is_ping_interval());
        self.blocks
            .insert(position.unwrap_or(0), Block::PingInterval(secs));
    }

    /// Serialize to the device wire format.
    pub fn encode(&self) -> Result<Bytes, Error> {
        let mut buf = BytesMut::with_capacity(16);
        buf.put_u8(PACKET_START);
        for block in &self.blocks {
            block.encode_into(&mut buf)?;
        }
        buf.put_slice(&PACKET_END);
        Ok(buf.freeze())
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, block) in self.blocks.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{block}")?;
        }
        f.write_str("]")
    }
}

impl FromIterator<Block> for Packet {
    fn from_iter<I: IntoIterator<Item = Block>>(iter: I) -> Self {
        Self {
            blocks: iter.into_iter().collect(),
        }
    }
}
