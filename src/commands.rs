//! Command channel codec
//!
//! Once a session is connected, the companion drives the vehicle with
//! one-byte command messages, and the vehicle answers each one with a
//! one-byte response: the command byte echoed back on success, or
//! [`ERROR`] on failure. This module owns the byte values and the
//! (de)framing; executing commands is the job of a [`CommandHandler`]
//! supplied by the embedder.

/// Response byte sent when a command could not be executed.
///
/// Never issued as a command; must not collide with any [`Command`] code.
pub const ERROR: u8 = 0xFF;

/// Drive commands the companion can send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Forward,
    Back,
    TurnLeft,
    TurnRight,
    Stop,
}

impl Command {
    /// Wire code for this command
    pub fn as_byte(&self) -> u8 {
        match self {
            Command::Forward => 0x01,
            Command::Back => 0x02,
            Command::TurnLeft => 0x03,
            Command::TurnRight => 0x04,
            Command::Stop => 0x05,
        }
    }

    /// Decode a wire code; `None` for unknown bytes (including [`ERROR`])
    pub fn from_byte(byte: u8) -> Option<Command> {
        match byte {
            0x01 => Some(Command::Forward),
            0x02 => Some(Command::Back),
            0x03 => Some(Command::TurnLeft),
            0x04 => Some(Command::TurnRight),
            0x05 => Some(Command::Stop),
            _ => None,
        }
    }
}

/// Encode a command as a one-byte payload
pub fn encode(command: Command) -> Vec<u8> {
    vec![command.as_byte()]
}

/// Extract the command or response byte from a received payload
///
/// Zero-length payloads carry nothing and decode to `None`; otherwise the
/// first byte is the message. Trailing bytes are ignored.
pub fn decode(payload: &[u8]) -> Option<u8> {
    payload.first().copied()
}

/// Vehicle-side collaborator that executes drive commands
///
/// Implemented over the actuator drivers (motors, display). Returns `true`
/// when the command was carried out, which makes the coordinator echo the
/// command byte back; `false` produces an [`ERROR`] response.
pub trait CommandHandler: Send {
    fn handle_command(&mut self, command: Command) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_codes_distinct() {
        let codes = [
            Command::Forward,
            Command::Back,
            Command::TurnLeft,
            Command::TurnRight,
            Command::Stop,
        ]
        .map(|c| c.as_byte());
        for (i, a) in codes.iter().enumerate() {
            assert_ne!(*a, ERROR);
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_byte_roundtrip() {
        for command in [
            Command::Forward,
            Command::Back,
            Command::TurnLeft,
            Command::TurnRight,
            Command::Stop,
        ] {
            assert_eq!(Command::from_byte(command.as_byte()), Some(command));
        }
        assert_eq!(Command::from_byte(ERROR), None);
        assert_eq!(Command::from_byte(0x77), None);
    }

    #[test]
    fn test_decode_payload() {
        assert_eq!(decode(&[]), None);
        assert_eq!(decode(&[0x01]), Some(0x01));
        assert_eq!(decode(&[0x05, 0xAA, 0xBB]), Some(0x05));
    }

    #[test]
    fn test_encode_is_single_byte() {
        assert_eq!(encode(Command::Stop), vec![0x05]);
    }
}
