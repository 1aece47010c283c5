// ── Device request classification ──
//
// Turns a parsed HTTP request from one of the three device endpoints into a
// `DeviceRequest`. All validation happens here, before any device state is
// touched, so a rejected request leaves the device exactly as it was.

use std::fmt;

use bytes::Bytes;
use nabd_proto::Request;

use crate::error::CoreError;
use crate::plugin::Capability;

/// `tc` value meaning the device has played nothing since boot.
pub const NEVER_PLAYED: &str = "0";

/// `tc` value reported once the sleep message has played.
pub const SLEEP_SENTINEL: &str = "7FFFFFFE";

/// Message id of the wake-up (activation) message.
pub const ACTIVATION_MESSAGE_ID: u32 = 0x7FFF_FFFF;

/// Message id of the sleep message.
pub const SLEEP_MESSAGE_ID: u32 = 0x7FFF_FFFE;

// `sd` event codes
const CODE_PING: u8 = 0;
const CODE_DOUBLE_CLICK: u8 = 1;
const CODE_END_OF_MESSAGE: u8 = 2;
const CODE_SINGLE_CLICK: u8 = 3;
const CODE_CLICK_WHILE_PLAYING: u8 = 5;
const CODE_EARS_MOVE: u8 = 8;

/// Which device endpoint a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// `/vl/p4.jsp`
    Poll,
    /// `/vl/rfid.jsp`
    Rfid,
    /// `/vl/record.jsp`
    Record,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordMode {
    /// Button held after a single click (`m=0`).
    Simple,
    /// Button held after a double click (`m=1`).
    Double,
}

/// An input reported by a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Ping,
    SingleClick,
    DoubleClick,
    EndOfMessage,
    ClickWhilePlaying,
    EarsMove { right: u8, left: u8 },
    Rfid { tag: String },
    Record { mode: RecordMode, audio: Bytes },
}

impl Event {
    /// The handler set this event is dispatched to.
    pub fn capability(&self) -> Capability {
        match self {
            Self::Ping => Capability::Ping,
            Self::SingleClick | Self::DoubleClick => Capability::Click,
            Self::EndOfMessage | Self::ClickWhilePlaying => Capability::Stop,
            Self::EarsMove { .. } => Capability::Ears,
            Self::Rfid { .. } => Capability::Rfid,
            Self::Record { .. } => Capability::Record,
        }
    }

    /// Decode a poll's `sd` field.
    ///
    /// `Ok(None)` is a well-formed but unknown event code, which callers log
    /// and drop. A missing or empty field is a plain keep-alive.
    pub fn from_poll_code(sd: Option<&str>) -> Result<Option<Self>, CoreError> {
        let Some(sd) = sd.filter(|s| !s.is_empty()) else {
            return Ok(Some(Self::Ping));
        };
        let mut chars = sd.chars();
        let code = chars
            .next()
            .and_then(|c| c.to_digit(10))
            .and_then(|d| u8::try_from(d).ok())
            .ok_or_else(|| CoreError::malformed(format!("event code {sd:?} is not numeric")))?;

        let event = match code {
            CODE_PING => Self::Ping,
            CODE_DOUBLE_CLICK => Self::DoubleClick,
            CODE_END_OF_MESSAGE => Self::EndOfMessage,
            CODE_SINGLE_CLICK => Self::SingleClick,
            CODE_CLICK_WHILE_PLAYING => Self::ClickWhilePlaying,
            CODE_EARS_MOVE => {
                let (right, left) = parse_ears(chars.as_str())
                    .ok_or_else(|| CoreError::malformed(format!("bad ear positions in {sd:?}")))?;
                Self::EarsMove { right, left }
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ping => f.write_str("ping"),
            Self::SingleClick => f.write_str("single click"),
            Self::DoubleClick => f.write_str("double click"),
            Self::EndOfMessage => f.write_str("end of message"),
            Self::ClickWhilePlaying => f.write_str("click while playing"),
            Self::EarsMove { right, left } => write!(f, "ears moved (right {right}, left {left})"),
            Self::Rfid { tag } => write!(f, "rfid {tag}"),
            Self::Record { mode, audio } => write!(f, "{mode:?} record ({} bytes)", audio.len()),
        }
    }
}

/// A fully validated device request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRequest {
    /// Serial as sent; the registry normalizes it.
    pub serial: String,
    /// New last-played identifier (`tc`), polls only.
    pub last_played: Option<String>,
    /// `None` when the device reported something we do not understand.
    pub event: Option<Event>,
}

impl DeviceRequest {
    pub fn new(serial: impl Into<String>, event: Option<Event>) -> Self {
        Self {
            serial: serial.into(),
            last_played: None,
            event,
        }
    }

    pub fn with_last_played(mut self, tc: impl Into<String>) -> Self {
        self.last_played = Some(tc.into());
        self
    }

    /// Validate `request` as arriving on `endpoint`.
    pub fn parse(endpoint: Endpoint, request: &Request) -> Result<Self, CoreError> {
        let serial = request
            .param("sn")
            .filter(|sn| !sn.is_empty())
            .ok_or_else(|| CoreError::malformed("missing device serial"))?;

        let (last_played, event) = match endpoint {
            Endpoint::Poll => (
                request.param("tc").map(str::to_owned),
                Event::from_poll_code(request.param("sd"))?,
            ),
            Endpoint::Rfid => {
                let tag = request
                    .param("t")
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| CoreError::malformed("missing rfid tag"))?;
                (None, Some(Event::Rfid { tag: tag.to_owned() }))
            }
            Endpoint::Record => {
                let mode = match request.param("m") {
                    Some("0") => Some(RecordMode::Simple),
                    Some("1") => Some(RecordMode::Double),
                    _ => None,
                };
                let event = mode.map(|mode| Event::Record {
                    mode,
                    audio: request.body().clone(),
                });
                (None, event)
            }
        };

        Ok(Self {
            serial: serial.to_owned(),
            last_played,
            event,
        })
    }
}

// ── Private helpers ─────────────────────────────────────────────────

/// `<right hex digit><left hex digits>`
fn parse_ears(rest: &str) -> Option<(u8, u8)> {
    let mut chars = rest.chars();
    let right = chars.next()?.to_digit(16)?;
    let left = chars.as_str();
    if left.is_empty() {
        return None;
    }
    let left = u8::from_str_radix(left, 16).ok()?;
    Some((u8::try_from(right).ok()?, left))
}
