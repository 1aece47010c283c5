// ── Choreographies ──
//
// A choreography is a named sequence of timed ear/LED commands. The payload
// is built by appending `wait opcode args…` records; on disk and over the
// `/chorlibrary/` route it is wrapped as `len:u32be payload 0u32`.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use strum::FromRepr;

use crate::error::Error;

/// Largest payload the 24-bit length prefix can describe.
pub const MAX_PAYLOAD: usize = 0x00FF_FFFF;

/// Size of the length prefix plus the zero terminator.
const FRAMING_LEN: usize = 8;

/// In-payload command opcodes.
pub mod opcode {
    pub const TEMPO: u8 = 0x01;
    pub const LED_COLOR: u8 = 0x07;
    pub const EAR_MOVE: u8 = 0x08;
}

// ── Targets ─────────────────────────────────────────────────────────

/// Target enums encode as their discriminant byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
#[repr(u8)]
pub enum Ear {
    Right = 0,
    Left = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
#[repr(u8)]
pub enum Led {
    Bottom = 0,
    Left = 1,
    Center = 2,
    Right = 3,
    Top = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
#[repr(u8)]
pub enum Direction {
    Forward = 0,
    Backward = 1,
}

// ── Decoded commands ────────────────────────────────────────────────

/// A single payload record, as read back for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Tempo {
        wait: u8,
        hz: u8,
    },
    LedColor {
        wait: u8,
        led: Led,
        rgb: [u8; 3],
    },
    EarMove {
        wait: u8,
        ear: Ear,
        position: u8,
        direction: Direction,
    },
    /// Opcode or operand we do not know; decoding stops here.
    Unknown {
        wait: u8,
        opcode: u8,
        remaining: usize,
    },
}

impl Command {
    pub fn wait(&self) -> u8 {
        match self {
            Self::Tempo { wait, .. }
            | Self::LedColor { wait, .. }
            | Self::EarMove { wait, .. }
            | Self::Unknown { wait, .. } => *wait,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tempo { hz, .. } => write!(f, "tempo {hz} Hz"),
            Self::LedColor { led, rgb, .. } => write!(
                f,
                "led {led:?} #{:02x}{:02x}{:02x}",
                rgb[0], rgb[1], rgb[2]
            ),
            Self::EarMove {
                ear,
                position,
                direction,
                ..
            } => write!(f, "ear {ear:?} -> {position} ({direction:?})"),
            Self::Unknown {
                opcode, remaining, ..
            } => write!(f, "unknown opcode {opcode:#04x} ({remaining} bytes left)"),
        }
    }
}

// ── Choreography ────────────────────────────────────────────────────

/// A named choreography payload plus its builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choreography {
    name: String,
    payload: BytesMut,
}

impl Choreography {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: BytesMut::new(),
        }
    }

    /// Wrap an already-built payload.
    pub fn from_payload(name: impl Into<String>, payload: &[u8]) -> Result<Self, Error> {
        if payload.len() > MAX_PAYLOAD {
            return Err(Error::ChoreographyTooLarge(payload.len()));
        }
        Ok(Self {
            name: name.into(),
            payload: BytesMut::from(payload),
        })
    }

    /// Decode the wrapped form. Nothing is accepted unless the whole frame is valid.
    pub fn from_wire(name: impl Into<String>, bytes: &[u8]) -> Result<Self, Error> {
        let payload = unwrap_payload(bytes)?;
        Self::from_payload(name, payload)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Change playback speed after `wait` ticks.
    pub fn tempo(&mut self, wait: u8, hz: u8) -> &mut Self {
        self.payload.put_slice(&[wait, opcode::TEMPO, hz]);
        self
    }

    /// Set `led` to the given color after `wait` ticks.
    #[allow(clippy::as_conversions)]
    pub fn led_color(&mut self, wait: u8, led: Led, r: u8, g: u8, b: u8) -> &mut Self {
        self.payload
            .put_slice(&[wait, opcode::LED_COLOR, led as u8, r, g, b, 0, 0]);
        self
    }

    /// Move `ear` to an absolute position after `wait` ticks.
    #[allow(clippy::as_conversions)]
    pub fn ear_move(&mut self, wait: u8, ear: Ear, position: u8, direction: Direction) -> &mut Self {
        self.payload.put_slice(&[
            wait,
            opcode::EAR_MOVE,
            ear as u8,
            position,
            direction as u8,
        ]);
        self
    }

    /// Encode as `len:u32be payload 0u32`.
    pub fn to_wire(&self) -> Result<Bytes, Error> {
        wrap_payload(&self.payload)
    }

    /// Read the payload back as commands. Stops at the first record it
    /// cannot interpret.
    pub fn commands(&self) -> Vec<Command> {
        let mut out = Vec::new();
        let mut rest: &[u8] = &self.payload;
        while let Some((&wait, tail)) = rest.split_first() {
            let Some((&op, args)) = tail.split_first() else {
                out.push(Command::Unknown {
                    wait,
                    opcode: 0,
                    remaining: 0,
                });
                break;
            };
            let decoded = match (op, args) {
                (opcode::TEMPO, [hz, ..]) => Some((Command::Tempo { wait, hz: *hz }, 1)),
                (opcode::LED_COLOR, [led, r, g, b, _, _, ..]) => {
                    Led::from_repr(*led).map(|led| {
                        (
                            Command::LedColor {
                                wait,
                                led,
                                rgb: [*r, *g, *b],
                            },
                            6,
                        )
                    })
                }
                (opcode::EAR_MOVE, [ear, position, direction, ..]) => {
                    match (Ear::from_repr(*ear), Direction::from_repr(*direction)) {
                        (Some(ear), Some(direction)) => Some((
                            Command::EarMove {
                                wait,
                                ear,
                                position: *position,
                                direction,
                            },
                            3,
                        )),
                        _ => None,
                    }
                }
                _ => None,
            };
            let Some((command, consumed)) = decoded else {
                out.push(Command::Unknown {
                    wait,
                    opcode: op,
                    remaining: args.len(),
                });
                break;
            };
            out.push(command);
            rest = &args[consumed..];
        }
        out
    }
}

// ── Wire framing ────────────────────────────────────────────────────

/// Frame a payload for storage or transfer.
pub fn wrap_payload(payload: &[u8]) -> Result<Bytes, Error> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= 0x00FF_FFFF)
        .ok_or(Error::ChoreographyTooLarge(payload.len()))?;
    let mut buf = BytesMut::with_capacity(payload.len() + FRAMING_LEN);
    buf.put_u32(len);
    buf.put_slice(payload);
    buf.put_u32(0);
    Ok(buf.freeze())
}

/// Validate a framed choreography and borrow its payload.
pub fn unwrap_payload(bytes: &[u8]) -> Result<&[u8], Error> {
    let Some((header, _)) = bytes.split_first_chunk::<4>() else {
        return Err(Error::ChoreographyLength {
            declared: 0,
            actual: 0,
        });
    };
    if header[0] != 0 {
        return Err(Error::ChoreographyCorrupt(header[0]));
    }
    let declared = usize::from(header[1]) << 16 | usize::from(header[2]) << 8 | usize::from(header[3]);
    let actual = bytes.len().saturating_sub(FRAMING_LEN);
    if bytes.len() < FRAMING_LEN || actual != declared {
        return Err(Error::ChoreographyLength { declared, actual });
    }
    let (body, terminator) = bytes[4..].split_at(declared);
    if terminator != [0, 0, 0, 0] {
        return Err(Error::ChoreographyTerminator);
    }
    Ok(body)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn blink() -> Choreography {
        let mut chor = Choreography::new("blink");
        chor.tempo(0, 100)
            .ear_move(0, Ear::Left, 10, Direction::Forward)
            .led_color(0, Led::Center, 255, 0, 0)
            .led_color(1, Led::Center, 0, 0, 0);
        chor
    }

    #[test]
    fn builder_appends_records() {
        let chor = blink();
        // tempo 3 + ear 5 + two leds 8 each
        assert_eq!(chor.len(), 3 + 5 + 8 + 8);
        assert_eq!(&chor.payload()[..3], &[0, opcode::TEMPO, 100]);
    }

    #[test]
    fn wire_round_trip_preserves_payload() {
        let chor = blink();
        let wire = chor.to_wire().unwrap();

        assert_eq!(wire.len(), chor.len() + 8);
        assert_eq!(&wire[..4], &u32::try_from(chor.len()).unwrap().to_be_bytes());
        assert_eq!(&wire[wire.len() - 4..], &[0, 0, 0, 0]);

        let decoded = Choreography::from_wire("blink", &wire).unwrap();
        assert_eq!(decoded, chor);
    }

    #[test]
    fn rejects_nonzero_high_byte() {
        let mut wire = blink().to_wire().unwrap().to_vec();
        wire[0] = 0x01;
        assert!(matches!(
            unwrap_payload(&wire),
            Err(Error::ChoreographyCorrupt(0x01))
        ));
    }

    #[test]
    fn rejects_declared_length_mismatch() {
        let mut wire = blink().to_wire().unwrap().to_vec();
        wire[3] = wire[3].wrapping_add(1);
        assert!(matches!(
            unwrap_payload(&wire),
            Err(Error::ChoreographyLength { .. })
        ));
    }

    #[test]
    fn rejects_truncated_frame() {
        let wire = blink().to_wire().unwrap();
        assert!(unwrap_payload(&wire[..wire.len() - 2]).is_err());
        assert!(unwrap_payload(&[0, 0]).is_err());
    }

    #[test]
    fn rejects_missing_terminator() {
        let mut wire = blink().to_wire().unwrap().to_vec();
        let last = wire.len() - 1;
        wire[last] = 0x42;
        assert!(matches!(
            unwrap_payload(&wire),
            Err(Error::ChoreographyTerminator)
        ));
    }

    #[test]
    fn empty_payload_frames_to_eight_zero_bytes() {
        let wire = Choreography::new("empty").to_wire().unwrap();
        assert_eq!(wire.as_ref(), &[0u8; 8]);
        assert!(Choreography::from_wire("empty", &wire).unwrap().is_empty());
    }

    #[test]
    fn commands_decode_builder_output() {
        let commands = blink().commands();
        assert_eq!(
            commands,
            vec![
                Command::Tempo { wait: 0, hz: 100 },
                Command::EarMove {
                    wait: 0,
                    ear: Ear::Left,
                    position: 10,
                    direction: Direction::Forward,
                },
                Command::LedColor {
                    wait: 0,
                    led: Led::Center,
                    rgb: [255, 0, 0],
                },
                Command::LedColor {
                    wait: 1,
                    led: Led::Center,
                    rgb: [0, 0, 0],
                },
            ]
        );
    }

    #[test]
    fn commands_stop_at_unknown_opcode() {
        let chor = Choreography::from_payload("odd", &[0, 0x01, 50, 2, 0x99, 1, 2]).unwrap();
        let commands = chor.commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(
            commands[1],
            Command::Unknown {
                wait: 2,
                opcode: 0x99,
                remaining: 2,
            }
        );
    }

    #[test]
    fn target_bytes_on_the_wire() {
        let mut chor = Choreography::new("targets");
        chor.led_color(0, Led::Top, 1, 2, 3)
            .ear_move(0, Ear::Right, 4, Direction::Backward);

        assert_eq!(
            chor.payload(),
            &[0, opcode::LED_COLOR, 4, 1, 2, 3, 0, 0, 0, opcode::EAR_MOVE, 0, 4, 1]
        );
    }

    #[test]
    fn out_of_range_target_is_unknown() {
        let chor = Choreography::from_payload("bad-led", &[0, opcode::LED_COLOR, 5, 1, 2, 3, 0, 0])
            .unwrap();
        assert!(matches!(
            chor.commands().as_slice(),
            [Command::Unknown { opcode: opcode::LED_COLOR, .. }]
        ));
    }
}
