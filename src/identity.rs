//! Peer identity model
//!
//! Both roles announce themselves through a human-readable advertising name
//! carrying their identity and pairing state:
//!
//! - Vehicle: `Robocar:<id>:<LED>-<LED>-<LED>-<LED>[:<token>]`
//! - Companion: `RobocarCompanion:<hex id>[:<token>]`
//!
//! The vehicle id is eight decimal digits in two hyphenated groups
//! (`1234-5678`); the companion id is twelve lowercase hex characters. The
//! trailing token segment is present only once the peer has paired, and is
//! exactly five non-whitespace characters.
//!
//! Identity values are immutable. Completing a pairing produces a *new*
//! value via [`AdvertisingInfo::with_token`] / [`DiscovererInfo::with_token`]
//! rather than mutating the old one, so snapshots held by observers stay
//! valid. Parsing is total: [`AdvertisingInfo::parse`] and
//! [`DiscovererInfo::parse`] return `None` for any string that does not
//! match the grammar, and `parse(x.advertising_name()) == Some(x)` holds for
//! every valid identity `x`.

use rand::Rng;
use std::fmt;

const ROBOCAR: &str = "Robocar";
const ROBOCAR_COMPANION: &str = "RobocarCompanion";
const SEGMENT_SEPARATOR: char = ':';
const LED_COLOR_SEPARATOR: char = '-';

const COMPANION_ID_LENGTH: usize = 12;
const HEX_CHARS: &[u8] = b"0123456789abcdef";

const LED_SEQUENCE_LENGTH: usize = 4;

/// Pairing tokens are exactly this many characters.
pub const PAIR_TOKEN_LENGTH: usize = 5;

/// Colors a vehicle can display on its status LED
///
/// The vehicle advertises a short color sequence so a human can tell
/// physical vehicles apart when several are in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedColor {
    Red,
    Green,
    Blue,
    Cyan,
    Magenta,
    Yellow,
    White,
}

impl LedColor {
    /// All colors, in a fixed order (used for random sequence generation).
    pub const ALL: [LedColor; 7] = [
        LedColor::Red,
        LedColor::Green,
        LedColor::Blue,
        LedColor::Cyan,
        LedColor::Magenta,
        LedColor::Yellow,
        LedColor::White,
    ];

    /// Wire token for this color
    pub fn as_str(&self) -> &'static str {
        match self {
            LedColor::Red => "RED",
            LedColor::Green => "GREEN",
            LedColor::Blue => "BLUE",
            LedColor::Cyan => "CYAN",
            LedColor::Magenta => "MAGENTA",
            LedColor::Yellow => "YELLOW",
            LedColor::White => "WHITE",
        }
    }

    /// Parse a wire token; `None` for anything that is not a known color
    pub fn from_str(token: &str) -> Option<LedColor> {
        match token {
            "RED" => Some(LedColor::Red),
            "GREEN" => Some(LedColor::Green),
            "BLUE" => Some(LedColor::Blue),
            "CYAN" => Some(LedColor::Cyan),
            "MAGENTA" => Some(LedColor::Magenta),
            "YELLOW" => Some(LedColor::Yellow),
            "WHITE" => Some(LedColor::White),
            _ => None,
        }
    }
}

impl fmt::Display for LedColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Join a LED sequence into its wire form (`RED-BLUE-GREEN-YELLOW`)
pub fn led_colors_to_string(colors: &[LedColor]) -> String {
    let mut out = String::new();
    for color in colors {
        if !out.is_empty() {
            out.push(LED_COLOR_SEPARATOR);
        }
        out.push_str(color.as_str());
    }
    out
}

/// Parse a wire-form LED sequence
///
/// Returns `None` if the input is empty or contains an unknown color token.
pub fn string_to_led_colors(input: &str) -> Option<Vec<LedColor>> {
    if input.is_empty() {
        return None;
    }
    input
        .split(LED_COLOR_SEPARATOR)
        .map(LedColor::from_str)
        .collect()
}

fn is_valid_pair_token(token: &str) -> bool {
    token.chars().count() == PAIR_TOKEN_LENGTH && !token.chars().any(|c| c.is_whitespace())
}

/// Vehicle-side identity, parsed from or rendered to its advertising name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisingInfo {
    /// Vehicle id in `NNNN-NNNN` form
    pub id: String,

    /// Display color sequence shown on the vehicle's LED
    pub led_sequence: Vec<LedColor>,

    /// Shared pairing secret; present only once paired
    pub pair_token: Option<String>,
}

impl AdvertisingInfo {
    /// Generate a fresh identity with a random id and LED sequence
    pub fn generate() -> Self {
        Self {
            id: generate_robocar_id(),
            led_sequence: generate_led_sequence(),
            pair_token: None,
        }
    }

    /// Whether this identity carries a pairing token
    pub fn is_paired(&self) -> bool {
        self.pair_token.is_some()
    }

    /// This identity with its pairing token replaced
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            id: self.id.clone(),
            led_sequence: self.led_sequence.clone(),
            pair_token: Some(token.into()),
        }
    }

    /// This identity with its pairing token cleared
    pub fn without_token(&self) -> Self {
        Self {
            id: self.id.clone(),
            led_sequence: self.led_sequence.clone(),
            pair_token: None,
        }
    }

    /// Render the advertising name broadcast over the transport
    pub fn advertising_name(&self) -> String {
        let mut name = format!(
            "{}{}{}{}{}",
            ROBOCAR,
            SEGMENT_SEPARATOR,
            self.id,
            SEGMENT_SEPARATOR,
            led_colors_to_string(&self.led_sequence)
        );
        if let Some(token) = &self.pair_token {
            name.push(SEGMENT_SEPARATOR);
            name.push_str(token);
        }
        name
    }

    /// Parse an advertising name; `None` for anything malformed
    pub fn parse(name: &str) -> Option<Self> {
        let segments: Vec<&str> = name.split(SEGMENT_SEPARATOR).collect();
        if segments.len() < 3 || segments.len() > 4 {
            return None;
        }
        if segments[0] != ROBOCAR || !is_valid_robocar_id(segments[1]) {
            return None;
        }
        let led_sequence = string_to_led_colors(segments[2])?;
        let pair_token = match segments.get(3) {
            Some(token) if is_valid_pair_token(token) => Some((*token).to_string()),
            Some(_) => return None,
            None => None,
        };
        Some(Self {
            id: segments[1].to_string(),
            led_sequence,
            pair_token,
        })
    }
}

/// Companion-side identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscovererInfo {
    /// Companion id, twelve lowercase hex characters
    pub id: String,

    /// Shared pairing secret; present only once paired
    pub pair_token: Option<String>,
}

impl DiscovererInfo {
    /// Generate a fresh identity with a random id
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let id = (0..COMPANION_ID_LENGTH)
            .map(|_| HEX_CHARS[rng.gen_range(0..HEX_CHARS.len())] as char)
            .collect();
        Self {
            id,
            pair_token: None,
        }
    }

    /// Whether this identity carries a pairing token
    pub fn is_paired(&self) -> bool {
        self.pair_token.is_some()
    }

    /// This identity with its pairing token replaced
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            id: self.id.clone(),
            pair_token: Some(token.into()),
        }
    }

    /// This identity with its pairing token cleared
    pub fn without_token(&self) -> Self {
        Self {
            id: self.id.clone(),
            pair_token: None,
        }
    }

    /// Render the advertising name sent when requesting a connection
    pub fn advertising_name(&self) -> String {
        let mut name = format!("{}{}{}", ROBOCAR_COMPANION, SEGMENT_SEPARATOR, self.id);
        if let Some(token) = &self.pair_token {
            name.push(SEGMENT_SEPARATOR);
            name.push_str(token);
        }
        name
    }

    /// Parse an advertising name; `None` for anything malformed
    pub fn parse(name: &str) -> Option<Self> {
        let segments: Vec<&str> = name.split(SEGMENT_SEPARATOR).collect();
        if segments.len() < 2 || segments.len() > 3 {
            return None;
        }
        if segments[0] != ROBOCAR_COMPANION || !is_valid_companion_id(segments[1]) {
            return None;
        }
        let pair_token = match segments.get(2) {
            Some(token) if is_valid_pair_token(token) => Some((*token).to_string()),
            Some(_) => return None,
            None => None,
        };
        Some(Self {
            id: segments[1].to_string(),
            pair_token,
        })
    }
}

fn generate_robocar_id() -> String {
    let mut rng = rand::thread_rng();
    // Keep the leading digit nonzero so ids read as eight digits everywhere.
    format!("{}-{:04}", rng.gen_range(1000..10000), rng.gen_range(0..10000))
}

fn is_valid_robocar_id(id: &str) -> bool {
    let bytes = id.as_bytes();
    bytes.len() == 9
        && bytes[4] == b'-'
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[5..].iter().all(u8::is_ascii_digit)
}

fn is_valid_companion_id(id: &str) -> bool {
    id.len() == COMPANION_ID_LENGTH
        && id
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn generate_led_sequence() -> Vec<LedColor> {
    let mut rng = rand::thread_rng();
    let mut sequence = Vec::with_capacity(LED_SEQUENCE_LENGTH);
    let mut previous: Option<LedColor> = None;
    while sequence.len() < LED_SEQUENCE_LENGTH {
        let color = LedColor::ALL[rng.gen_range(0..LedColor::ALL.len())];
        if previous == Some(color) {
            continue; // pick again
        }
        sequence.push(color);
        previous = Some(color);
    }
    sequence
}
