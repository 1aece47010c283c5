//! Wire formats spoken between nabd and its devices.
//!
//! This crate owns every byte that crosses the socket:
//!
//! - **[`Packet`] / [`Block`]**: the command packet returned on every poll,
//!   built from typed blocks (ping interval, message, ambient, choreography).
//! - **[`Choreography`]**: builder for timed ear/LED sequences and the
//!   length-prefixed framing used on disk and over `/chorlibrary/`.
//! - **[`Request`]**: async parser for the minimal HTTP/1.0 dialect devices
//!   use, with size limits.
//! - **[`Response`]**: status line, `Content-length` and a throttled body
//!   writer.
//!
//! Nothing here knows about devices, plugins or state; see `nabd-core`.

pub mod block;
pub mod choreography;
pub mod error;
pub mod packet;
pub mod request;
pub mod response;

pub use block::{Block, MessageBlock, MessageCommand};
pub use choreography::{Choreography, Direction, Ear, Led};
pub use error::Error;
pub use packet::Packet;
pub use request::{Limits, Request};
pub use response::{Response, Status, Throttle};
