//! Protocol Messages
//!
//! Pipe-delimited ASCII wire format spoken over a raw TCP stream.
//!
//! A message is either a single unterminated control byte (`C`, `Q`) or
//! `TAG|field|field||`: a one-character tag, `|`-separated fields that never
//! contain `|` themselves, and a `||` terminator.

use std::fmt;

use crate::game::rules::{InvalidMove, Move, Outcome};

/// Field delimiter.
pub const DELIMITER: u8 = b'|';

/// Single-byte "play again" reply.
pub const REMATCH: u8 = b'C';

/// Single-byte "no more rounds" reply.
pub const QUIT: u8 = b'Q';

/// Default cap on the length of one message, terminator included.
pub const MAX_MESSAGE_LEN: usize = 256;

// =============================================================================
// FRAMING
// =============================================================================

/// Errors raised while pulling one message off a byte stream.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Peer closed the connection (read returned zero bytes).
    #[error("connection closed by peer")]
    Closed,

    /// No terminator within the buffer cap.
    #[error("message exceeds {cap} bytes without a terminator")]
    Overflow {
        /// The cap that was exhausted.
        cap: usize,
    },

    /// Underlying read failed.
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Find the end of the first complete message in `buf`.
///
/// Returns `Ok(Some(len))` when `buf[..len]` is a whole message, `Ok(None)`
/// when more bytes are needed, and `FrameError::Overflow` once `cap` bytes
/// have been scanned without finding a terminator.
pub fn scan_frame(buf: &[u8], cap: usize) -> Result<Option<usize>, FrameError> {
    match buf.first() {
        None => return Ok(None),
        Some(&REMATCH) | Some(&QUIT) => return Ok(Some(1)),
        Some(_) => {}
    }

    let mut run = 0;
    for (idx, &byte) in buf.iter().take(cap).enumerate() {
        if byte == DELIMITER {
            run += 1;
            if run == 2 {
                return Ok(Some(idx + 1));
            }
        } else {
            run = 0;
        }
    }

    if buf.len() >= cap {
        Err(FrameError::Overflow { cap })
    } else {
        Ok(None)
    }
}

/// Extract field `n` (1-based) of a framed message: the bytes between the
/// `n`th and `n + 1`th delimiter.
pub fn field(message: &str, n: usize) -> Option<&str> {
    if n == 0 {
        return None;
    }
    let mut delimiters = message
        .char_indices()
        .filter(|&(_, c)| c == DELIMITER as char)
        .map(|(idx, _)| idx);
    let start = delimiters.nth(n - 1)? + 1;
    let end = delimiters.next()?;
    Some(&message[start..end])
}

// =============================================================================
// GENERIC FRAME
// =============================================================================

/// Errors for messages that framed correctly but do not parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Message bytes are not ASCII.
    #[error("message is not ASCII")]
    NotAscii,

    /// Message does not end in `||`.
    #[error("missing `||` terminator")]
    MissingTerminator,

    /// Tag is not exactly one non-delimiter character.
    #[error("malformed tag `{0}`")]
    BadTag(String),

    /// Tag is well-formed but not expected here.
    #[error("unexpected tag `{0}`")]
    UnknownTag(char),

    /// A required field is absent.
    #[error("`{tag}` message is missing field {index}")]
    MissingField {
        /// Message tag.
        tag: char,
        /// 1-based field index.
        index: usize,
    },

    /// Join request carried an empty display name.
    #[error("empty display name")]
    EmptyName,

    /// Move field is not one of the known literals.
    #[error(transparent)]
    InvalidMove(#[from] InvalidMove),

    /// Result message carried an unknown outcome code.
    #[error("unknown outcome `{0}`")]
    InvalidOutcome(String),
}

/// A tagged, terminated message with its fields split out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Single-character tag.
    pub tag: char,
    /// Fields in order, delimiters stripped.
    pub fields: Vec<String>,
}

impl Frame {
    /// Build a frame from a tag and fields.
    pub fn new<I, S>(tag: char, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tag,
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Render as `TAG|f1|f2||`.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(
            3 + self.fields.iter().map(|f| f.len() + 1).sum::<usize>(),
        );
        out.push(self.tag);
        for field in &self.fields {
            out.push(DELIMITER as char);
            out.push_str(field);
        }
        out.push_str("||");
        out
    }

    /// Parse a complete `TAG|...||` message.
    pub fn decode(message: &str) -> Result<Self, ProtocolError> {
        if !message.is_ascii() {
            return Err(ProtocolError::NotAscii);
        }
        let body = message
            .strip_suffix("||")
            .ok_or(ProtocolError::MissingTerminator)?;

        let mut parts = body.split(DELIMITER as char);
        let tag_part = parts.next().unwrap_or_default();
        let mut tag_chars = tag_part.chars();
        let tag = match (tag_chars.next(), tag_chars.next()) {
            (Some(tag), None) => tag,
            _ => return Err(ProtocolError::BadTag(tag_part.to_string())),
        };

        Ok(Self {
            tag,
            fields: parts.map(str::to_string).collect(),
        })
    }

    /// Field by 1-based index, as on the wire.
    pub fn field(&self, index: usize) -> Result<&str, ProtocolError> {
        index
            .checked_sub(1)
            .and_then(|i| self.fields.get(i))
            .map(String::as_str)
            .ok_or(ProtocolError::MissingField { tag: self.tag, index })
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn as_ascii(bytes: &[u8]) -> Result<&str, ProtocolError> {
    if !bytes.is_ascii() {
        return Err(ProtocolError::NotAscii);
    }
    std::str::from_utf8(bytes).map_err(|_| ProtocolError::NotAscii)
}

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// `P|<name>||` - enter matchmaking under a display name.
    Join {
        /// Requested display name.
        name: String,
    },

    /// `M|<move>||` - move for the current round.
    Move(Move),

    /// `C` - play another round.
    Rematch,

    /// `Q` - stop playing.
    Quit,
}

impl ClientMessage {
    /// Render for the wire.
    pub fn encode(&self) -> String {
        match self {
            ClientMessage::Join { name } => Frame::new('P', [name.as_str()]).encode(),
            ClientMessage::Move(mv) => Frame::new('M', [mv.as_str()]).encode(),
            ClientMessage::Rematch => (REMATCH as char).to_string(),
            ClientMessage::Quit => (QUIT as char).to_string(),
        }
    }

    /// Parse one framed message.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        match bytes {
            [REMATCH] => return Ok(ClientMessage::Rematch),
            [QUIT] => return Ok(ClientMessage::Quit),
            _ => {}
        }

        let frame = Frame::decode(as_ascii(bytes)?)?;
        match frame.tag {
            'P' => {
                // `P||` carries no field at all; same as an empty one.
                let name = frame.field(1).unwrap_or_default();
                if name.is_empty() {
                    return Err(ProtocolError::EmptyName);
                }
                Ok(ClientMessage::Join { name: name.to_string() })
            }
            'M' => Ok(ClientMessage::Move(frame.field(1)?.parse()?)),
            other => Err(ProtocolError::UnknownTag(other)),
        }
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// `W|<version>||` - join accepted.
    Welcome {
        /// Protocol version echoed back.
        version: String,
    },

    /// `R|L|<reason>||` - join rejected, name already in use.
    Rejected {
        /// Human-readable reason.
        reason: String,
    },

    /// `B|<opponent>||` - a round begins.
    Begin {
        /// Opponent display name.
        opponent: String,
    },

    /// `R|<outcome>|<opponent move>||` - round result.
    Result {
        /// Outcome for the receiving player.
        outcome: Outcome,
        /// What the opponent played.
        opponent_move: Move,
    },

    /// `R|F|||` - opponent forfeited.
    Forfeit,
}

impl ServerMessage {
    /// Convert to a generic frame.
    pub fn to_frame(&self) -> Frame {
        match self {
            ServerMessage::Welcome { version } => Frame::new('W', [version.as_str()]),
            ServerMessage::Rejected { reason } => Frame::new('R', ["L", reason.as_str()]),
            ServerMessage::Begin { opponent } => Frame::new('B', [opponent.as_str()]),
            ServerMessage::Result { outcome, opponent_move } => Frame::new(
                'R',
                [outcome.code().to_string(), opponent_move.as_str().to_string()],
            ),
            ServerMessage::Forfeit => Frame::new('R', ["F", ""]),
        }
    }

    /// Render for the wire.
    pub fn encode(&self) -> String {
        self.to_frame().encode()
    }

    /// Parse one framed message.
    ///
    /// `R|L|...||` is shared by rejections and lost rounds; it is a round
    /// result only when the second field is a move literal.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let frame = Frame::decode(as_ascii(bytes)?)?;
        match frame.tag {
            'W' => Ok(ServerMessage::Welcome {
                version: frame.field(1)?.to_string(),
            }),
            'B' => Ok(ServerMessage::Begin {
                opponent: frame.field(1)?.to_string(),
            }),
            'R' => {
                let code = frame.field(1)?;
                if code == "F" {
                    return Ok(ServerMessage::Forfeit);
                }
                let detail = frame.field(2)?;
                if code == "L" {
                    if let Ok(opponent_move) = detail.parse() {
                        return Ok(ServerMessage::Result {
                            outcome: Outcome::Lose,
                            opponent_move,
                        });
                    }
                    return Ok(ServerMessage::Rejected {
                        reason: detail.to_string(),
                    });
                }
                let mut chars = code.chars();
                let outcome = match (chars.next(), chars.next()) {
                    (Some(c), None) => Outcome::from_code(c),
                    _ => None,
                }
                .ok_or_else(|| ProtocolError::InvalidOutcome(code.to_string()))?;
                Ok(ServerMessage::Result {
                    outcome,
                    opponent_move: detail.parse()?,
                })
            }
            other => Err(ProtocolError::UnknownTag(other)),
        }
    }
}
