//! Wire protocol and world constants shared by the server and any protocol consumer.
//!
//! Frames on the TCP stream are two newline-terminated text lines: the message
//! type integer, then a space-separated payload. `encode` and `decode` are the
//! only place raw text is turned into typed packets and back; everything past
//! this boundary works with [`Packet`] values.

use thiserror::Error;

pub const WORLD_WIDTH: i32 = 2000;
pub const WORLD_HEIGHT: i32 = 2000;
pub const SPAWN_MARGIN: i32 = 50;
pub const MIN_SPAWN_DISTANCE: f32 = 100.0;
pub const MAX_SPAWN_ATTEMPTS: u32 = 20;
pub const DEFAULT_PORT: u16 = 50000;
pub const DEFAULT_USERNAME: &str = "unset";

/// The five palette colors players can pick from, keyed by wire codes 0-4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerColor {
    Blue,
    #[default]
    Red,
    Green,
    Purple,
    Orange,
}

impl PlayerColor {
    /// Maps a wire code to a palette color. Out-of-range codes are rejected;
    /// callers coerce those to the default via `unwrap_or_default`.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(PlayerColor::Blue),
            1 => Some(PlayerColor::Red),
            2 => Some(PlayerColor::Green),
            3 => Some(PlayerColor::Purple),
            4 => Some(PlayerColor::Orange),
            _ => None,
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            PlayerColor::Blue => 0,
            PlayerColor::Red => 1,
            PlayerColor::Green => 2,
            PlayerColor::Purple => 3,
            PlayerColor::Orange => 4,
        }
    }
}

/// One player's entry in a roster snapshot or join announce.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub id: u32,
    pub x: i32,
    pub y: i32,
    pub username: String,
    pub color: PlayerColor,
}

/// A decoded protocol message. Bidirectional kinds carry `from: None` when
/// sent client-to-server and `from: Some(id)` when the server re-broadcasts
/// them tagged with the origin session.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Type 0: full roster of already-connected players, sent once at connect.
    Roster { entries: Vec<RosterEntry> },
    /// Type 1: "you are this id".
    IdAssign { id: u32 },
    /// Type 2: position/rotation update.
    PositionUpdate {
        from: Option<u32>,
        x: i32,
        y: i32,
        rot: f32,
    },
    /// Type 3: a new player joined.
    Join { entry: RosterEntry },
    /// Type 4: a player left.
    Leave { id: u32 },
    /// Type 5: username change.
    UsernameUpdate { from: Option<u32>, username: String },
    /// Type 6: color change, palette code 0-4.
    ColorUpdate { from: Option<u32>, code: u32 },
    /// Type 10: a projectile was fired at this rotation.
    ProjectileFire { from: Option<u32>, rot: f32 },
}

/// Why a frame failed to decode. Never fatal: callers log, drop the frame,
/// and keep processing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("frame is missing a payload line")]
    MissingPayload,
    #[error("unparseable message type `{0}`")]
    BadType(String),
    #[error("unknown message type {0}")]
    UnknownType(u32),
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("unparseable value for field `{0}`")]
    BadField(&'static str),
}

/// Substitutes `_` for the protocol-reserved delimiters `:`, `;` and space so
/// free text can never break payload field-splitting. Empty input falls back
/// to the default username.
pub fn sanitize_text(text: &str) -> String {
    if text.is_empty() {
        return DEFAULT_USERNAME.to_string();
    }
    text.replace([':', ';', ' '], "_")
}

/// Normalizes a rotation in degrees to `[0, 360)`. Non-finite input collapses
/// to 0 so a hostile `inf`/`nan` field can never poison stored state.
pub fn normalize_rotation(rot: f32) -> f32 {
    if !rot.is_finite() {
        return 0.0;
    }
    rot.rem_euclid(360.0)
}

/// Moves `current` toward `target` by at most `max_step`, never overshooting.
/// Consumers use this to smooth remote players between position updates.
pub fn step_toward(current: i32, target: i32, max_step: i32) -> i32 {
    let step = max_step.abs();
    current + (target - current).clamp(-step, step)
}

fn format_entry(entry: &RosterEntry) -> String {
    format!(
        "{} {} {} {} {}",
        entry.id,
        entry.x,
        entry.y,
        sanitize_text(&entry.username),
        entry.color.code()
    )
}

/// Encodes a packet into its two-line wire frame `<type>\n<payload>`.
/// The transport appends the terminating newline of the payload line.
pub fn encode(packet: &Packet) -> String {
    match packet {
        Packet::Roster { entries } => {
            let mut payload = String::new();
            for entry in entries {
                payload.push(':');
                payload.push_str(&format_entry(entry));
            }
            format!("0\n{}", payload)
        }
        Packet::IdAssign { id } => format!("1\n{}", id),
        Packet::PositionUpdate { from, x, y, rot } => match from {
            Some(from) => format!("2\n{} {} {} {}", from, x, y, rot),
            None => format!("2\n{} {} {}", x, y, rot),
        },
        Packet::Join { entry } => format!("3\n{}", format_entry(entry)),
        Packet::Leave { id } => format!("4\n{}", id),
        Packet::UsernameUpdate { from, username } => {
            let username = sanitize_text(username);
            match from {
                Some(from) => format!("5\n{} {}", from, username),
                None => format!("5\n{}", username),
            }
        }
        Packet::ColorUpdate { from, code } => match from {
            Some(from) => format!("6\n{} {}", from, code),
            None => format!("6\n{}", code),
        },
        Packet::ProjectileFire { from, rot } => match from {
            Some(from) => format!("10\n{} {}", from, rot),
            None => format!("10\n{}", rot),
        },
    }
}

fn parse_u32(token: &str, field: &'static str) -> Result<u32, ParseError> {
    token.parse().map_err(|_| ParseError::BadField(field))
}

fn parse_i32(token: &str, field: &'static str) -> Result<i32, ParseError> {
    token.parse().map_err(|_| ParseError::BadField(field))
}

fn parse_f32(token: &str, field: &'static str) -> Result<f32, ParseError> {
    token.parse().map_err(|_| ParseError::BadField(field))
}

fn parse_entry(tokens: &[&str]) -> Result<RosterEntry, ParseError> {
    if tokens.len() < 5 {
        return Err(ParseError::MissingField("roster entry"));
    }
    // Defensive: a username that somehow kept spaces spans the middle tokens.
    let username = tokens[3..tokens.len() - 1].join("_");
    Ok(RosterEntry {
        id: parse_u32(tokens[0], "id")?,
        x: parse_i32(tokens[1], "x")?,
        y: parse_i32(tokens[2], "y")?,
        username: sanitize_text(&username),
        color: PlayerColor::from_code(parse_u32(tokens[tokens.len() - 1], "color")?)
            .unwrap_or_default(),
    })
}

/// Decodes a two-line wire frame into a [`Packet`]. A trailing `;` on the
/// payload is legacy framing and is stripped before field-splitting.
pub fn decode(frame: &str) -> Result<Packet, ParseError> {
    let (type_line, payload) = frame.split_once('\n').ok_or(ParseError::MissingPayload)?;
    let msg_type: u32 = type_line
        .trim()
        .parse()
        .map_err(|_| ParseError::BadType(type_line.trim().to_string()))?;
    let payload = payload.trim_end_matches(['\r', '\n']).trim_end_matches(';');
    let tokens: Vec<&str> = payload.split_whitespace().collect();

    match msg_type {
        0 => {
            let mut entries = Vec::new();
            for chunk in payload.split(':') {
                if chunk.trim().is_empty() {
                    continue;
                }
                let entry_tokens: Vec<&str> = chunk.split_whitespace().collect();
                entries.push(parse_entry(&entry_tokens)?);
            }
            Ok(Packet::Roster { entries })
        }
        1 => Ok(Packet::IdAssign {
            id: parse_u32(tokens.first().ok_or(ParseError::MissingField("id"))?, "id")?,
        }),
        2 => match tokens.as_slice() {
            [x, y, rot] => Ok(Packet::PositionUpdate {
                from: None,
                x: parse_i32(x, "x")?,
                y: parse_i32(y, "y")?,
                rot: parse_f32(rot, "rot")?,
            }),
            [from, x, y, rot] => Ok(Packet::PositionUpdate {
                from: Some(parse_u32(from, "from")?),
                x: parse_i32(x, "x")?,
                y: parse_i32(y, "y")?,
                rot: parse_f32(rot, "rot")?,
            }),
            _ => Err(ParseError::MissingField("position")),
        },
        3 => Ok(Packet::Join {
            entry: parse_entry(&tokens)?,
        }),
        4 => Ok(Packet::Leave {
            id: parse_u32(tokens.first().ok_or(ParseError::MissingField("id"))?, "id")?,
        }),
        5 => match tokens.as_slice() {
            [] => Err(ParseError::MissingField("username")),
            [username] => Ok(Packet::UsernameUpdate {
                from: None,
                username: (*username).to_string(),
            }),
            [first, rest @ ..] => match first.parse::<u32>() {
                // Tagged form from the server: `fromId username`.
                Ok(from) => Ok(Packet::UsernameUpdate {
                    from: Some(from),
                    username: rest.join("_"),
                }),
                // Untagged client form whose text still contains spaces; the
                // whole payload is the username and sanitization will fix it.
                Err(_) => Ok(Packet::UsernameUpdate {
                    from: None,
                    username: payload.to_string(),
                }),
            },
        },
        6 => match tokens.as_slice() {
            [code] => Ok(Packet::ColorUpdate {
                from: None,
                code: parse_u32(code, "color")?,
            }),
            [from, code] => Ok(Packet::ColorUpdate {
                from: Some(parse_u32(from, "from")?),
                code: parse_u32(code, "color")?,
            }),
            _ => Err(ParseError::MissingField("color")),
        },
        10 => match tokens.as_slice() {
            [rot] => Ok(Packet::ProjectileFire {
                from: None,
                rot: parse_f32(rot, "rot")?,
            }),
            [from, rot] => Ok(Packet::ProjectileFire {
                from: Some(parse_u32(from, "from")?),
                rot: parse_f32(rot, "rot")?,
            }),
            _ => Err(ParseError::MissingField("rot")),
        },
        other => Err(ParseError::UnknownType(other)),
    }
}
