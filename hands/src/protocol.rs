//! Hand driver wire protocol.
//!
//! Newline-delimited text, one message per line, tokens separated by
//! whitespace.  The first token names the message:
//!
//! | Message | Payload |
//! |---|---|
//! | `POSE` | at least 12 floats; `[0..3]` left position, `[9..12]` right position |
//! | `PRESSED` / `RELEASED` / `DRAGGED` | hand name, then anything |
//! | `POINT` | anything, last token is a confidence float |
//!
//! Anything else is passed through as [`DriverEvent::Unrecognized`].  There
//! is no handshake, version or checksum.

use tracing::warn;

use crate::cursor::Hand;
use crate::geometry::Vec3;

/// Floats a `POSE` message must carry.
pub const POSE_FLOATS: usize = 12;

const LEFT_POSITION: std::ops::Range<usize> = 0..3;
const RIGHT_POSITION: std::ops::Range<usize> = 9..12;

// ── Events ─────────────────────────────────────────────────

/// Phase of a pinch gesture as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GesturePhase {
    Pressed,
    Released,
    Dragged,
}

impl GesturePhase {
    /// Wire keyword.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pressed => "PRESSED",
            Self::Released => "RELEASED",
            Self::Dragged => "DRAGGED",
        }
    }

    fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "PRESSED" => Some(Self::Pressed),
            "RELEASED" => Some(Self::Released),
            "DRAGGED" => Some(Self::Dragged),
            _ => None,
        }
    }

    /// Every phase counts as being inside the gesture.
    pub fn in_gesture(&self) -> bool {
        true
    }

    /// Only a release ends the gesture.
    pub fn ends_gesture(&self) -> bool {
        matches!(self, Self::Released)
    }
}

/// A decoded driver message.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    /// Both hand positions in device units.
    Pose { left: Vec3, right: Vec3 },
    /// Pinch phase change for one hand.
    Gesture { hand: Hand, phase: GesturePhase },
    /// Pointing estimate.  Carries no behaviour yet.
    Point { hand: Option<Hand>, confidence: f64 },
    /// Well-formed line with an unknown keyword.
    Unrecognized { keyword: String },
}

impl DriverEvent {
    /// Whether a `Point` event reports an actual pointing pose.
    pub fn is_pointing(&self) -> bool {
        matches!(self, Self::Point { confidence, .. } if *confidence > 0.0)
    }
}

// ── Errors ─────────────────────────────────────────────────

/// Why a line could not be decoded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("{keyword} needs at least {expected} tokens, got {found}")]
    TooFewTokens {
        keyword: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("{keyword}: {token:?} is not a number")]
    BadFloat { keyword: &'static str, token: String },
    #[error("unknown hand {0:?}")]
    UnknownHand(String),
}

// ── Parsing ────────────────────────────────────────────────

/// Decode one line.  Returns `Ok(None)` for a blank line.
pub fn parse_line(line: &str) -> Result<Option<DriverEvent>, DecodeError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(&keyword) = tokens.first() else {
        return Ok(None);
    };

    let event = match keyword {
        "POSE" => parse_pose(&tokens)?,
        "POINT" => parse_point(&tokens)?,
        _ => match GesturePhase::from_keyword(keyword) {
            Some(phase) => parse_gesture(phase, &tokens)?,
            None => DriverEvent::Unrecognized {
                keyword: keyword.to_string(),
            },
        },
    };
    Ok(Some(event))
}

fn parse_float(keyword: &'static str, token: &str) -> Result<f64, DecodeError> {
    token.parse::<f64>().map_err(|_| DecodeError::BadFloat {
        keyword,
        token: token.to_string(),
    })
}

fn parse_pose(tokens: &[&str]) -> Result<DriverEvent, DecodeError> {
    if tokens.len() < POSE_FLOATS + 1 {
        return Err(DecodeError::TooFewTokens {
            keyword: "POSE",
            expected: POSE_FLOATS + 1,
            found: tokens.len(),
        });
    }
    let floats = tokens[1..=POSE_FLOATS]
        .iter()
        .map(|t| parse_float("POSE", t))
        .collect::<Result<Vec<f64>, _>>()?;

    let position = |range: std::ops::Range<usize>| -> Vec3 {
        let p = &floats[range];
        [p[0], p[1], p[2]]
    };
    Ok(DriverEvent::Pose {
        left: position(LEFT_POSITION),
        right: position(RIGHT_POSITION),
    })
}

fn parse_gesture(phase: GesturePhase, tokens: &[&str]) -> Result<DriverEvent, DecodeError> {
    let name = tokens.get(1).ok_or(DecodeError::TooFewTokens {
        keyword: phase.as_str(),
        expected: 2,
        found: tokens.len(),
    })?;
    let hand = Hand::parse(name).ok_or_else(|| DecodeError::UnknownHand(name.to_string()))?;
    Ok(DriverEvent::Gesture { hand, phase })
}

fn parse_point(tokens: &[&str]) -> Result<DriverEvent, DecodeError> {
    if tokens.len() < 2 {
        return Err(DecodeError::TooFewTokens {
            keyword: "POINT",
            expected: 2,
            found: tokens.len(),
        });
    }
    let confidence = parse_float("POINT", tokens[tokens.len() - 1])?;
    let hand = if tokens.len() > 2 {
        Hand::parse(tokens[1])
    } else {
        None
    };
    Ok(DriverEvent::Point { hand, confidence })
}

// ── Decoder ────────────────────────────────────────────────

/// Line decoder that skips and counts malformed input.
#[derive(Debug, Default)]
pub struct ProtocolDecoder {
    /// Lines that could not be decoded.
    pub decode_errors: u64,
    /// Lines seen, including blank and malformed ones.
    pub lines_seen: u64,
}

impl ProtocolDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a line.  Malformed lines are logged, counted and yield `None`.
    pub fn decode(&mut self, line: &str) -> Option<DriverEvent> {
        self.lines_seen += 1;
        match parse_line(line) {
            Ok(event) => event,
            Err(e) => {
                self.decode_errors += 1;
                warn!(line, errors = self.decode_errors, "dropping malformed line: {}", e);
                None
            }
        }
    }
}
