//! PD69200 frame codec
//!
//! A PD69200 frame is exactly 15 bytes:
//! `KEY | ECHO | SUB | SUB1 | SUB2 | D5..D12 | CSUM_HI | CSUM_LO`.
//! Unused payload bytes are padded with the sentinel `0x4E` before the
//! checksum is computed over bytes `0..13`.

use crate::error::PoeError;

pub const MSG_LEN: usize = 15;
pub const MSG_CSUM_LEN: usize = 2;
pub const MSG_MAX_COMMAND_LEN: usize = MSG_LEN - MSG_CSUM_LEN;
pub const MSG_PAD_BYTE: u8 = 0x4E;

pub const OFFSET_KEY: usize = 0;
pub const OFFSET_ECHO: usize = 1;
pub const OFFSET_SUB: usize = 2;
pub const OFFSET_SUB1: usize = 3;
pub const OFFSET_SUB2: usize = 4;
pub const OFFSET_DATA5: usize = 5;
pub const OFFSET_DATA6: usize = 6;
pub const OFFSET_DATA7: usize = 7;
pub const OFFSET_DATA8: usize = 8;
pub const OFFSET_DATA9: usize = 9;
pub const OFFSET_DATA10: usize = 10;
pub const OFFSET_DATA11: usize = 11;
pub const OFFSET_DATA12: usize = 12;
pub const OFFSET_CSUM_H: usize = 13;
pub const OFFSET_CSUM_L: usize = 14;

/// Byte 0 (KEY) values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Command,
    Program,
    Request,
    Telemetry,
    Report,
}

impl Key {
    pub fn to_byte(self) -> u8 {
        match self {
            Key::Command => 0x00,
            Key::Program => 0x01,
            Key::Request => 0x02,
            Key::Telemetry => 0x03,
            Key::Report => 0x52,
        }
    }

    pub fn from_byte(b: u8) -> Option<Key> {
        match b {
            0x00 => Some(Key::Command),
            0x01 => Some(Key::Program),
            0x02 => Some(Key::Request),
            0x03 => Some(Key::Telemetry),
            0x52 => Some(Key::Report),
            _ => None,
        }
    }

    /// The reply key expected for a given request key, per spec.
    fn expected_reply(self) -> Option<Key> {
        match self {
            Key::Command | Key::Program => Some(Key::Report),
            Key::Request => Some(Key::Telemetry),
            Key::Telemetry | Key::Report => None,
        }
    }
}

/// A fully-formed 15-byte PD69200 frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame(pub [u8; MSG_LEN]);

impl Frame {
    pub fn as_bytes(&self) -> &[u8; MSG_LEN] {
        &self.0
    }

    pub fn key(&self) -> u8 {
        self.0[OFFSET_KEY]
    }

    pub fn echo(&self) -> u8 {
        self.0[OFFSET_ECHO]
    }

    /// Build a frame from a command byte vector (KEY, ECHO, SUB...), padding
    /// with `0x4E` up to 13 payload bytes and appending the 16-bit checksum.
    pub fn build(command: &[u8]) -> Result<Frame, PoeError> {
        if command.len() > MSG_MAX_COMMAND_LEN {
            return Err(PoeError::invalid_argument(format!(
                "command length {} exceeds {} bytes",
                command.len(),
                MSG_MAX_COMMAND_LEN
            )));
        }
        let mut buf = [MSG_PAD_BYTE; MSG_LEN];
        buf[..command.len()].copy_from_slice(command);
        let csum = checksum(&buf[..OFFSET_CSUM_H]);
        buf[OFFSET_CSUM_H] = (csum >> 8) as u8;
        buf[OFFSET_CSUM_L] = (csum & 0xff) as u8;
        Ok(Frame(buf))
    }

    /// Parse a raw 15-byte reply, returning the command bytes with N-padding
    /// and checksum stripped (inverse of `build` for the round-trip law).
    pub fn strip_padding(&self, command_len: usize) -> Vec<u8> {
        self.0[..command_len].to_vec()
    }

    /// Validate a reply against the frame that was sent, per spec.md 4.A.
    pub fn validate(&self, sent: &Frame) -> Result<(), PoeError> {
        if self.0.iter().all(|&b| b == 0x00) {
            return Err(PoeError::Protocol("reply is all-zero".into()));
        }

        let sent_key = Key::from_byte(sent.key())
            .ok_or_else(|| PoeError::Protocol(format!("unknown sent key 0x{:02x}", sent.key())))?;
        let recv_key = Key::from_byte(self.key())
            .ok_or_else(|| PoeError::Protocol(format!("unknown reply key 0x{:02x}", self.key())))?;
        if let Some(expected) = sent_key.expected_reply() {
            if recv_key != expected {
                return Err(PoeError::Protocol(format!(
                    "key mismatch: sent 0x{:02x} expected reply 0x{:02x}, got 0x{:02x}",
                    sent.key(),
                    expected.to_byte(),
                    self.key()
                )));
            }
        }

        if self.echo() != sent.echo() {
            return Err(PoeError::Protocol(format!(
                "echo mismatch: sent 0x{:02x}, got 0x{:02x}",
                sent.echo(),
                self.echo()
            )));
        }

        let csum = checksum(&self.0[..OFFSET_CSUM_H]);
        if self.0[OFFSET_CSUM_H] != (csum >> 8) as u8 || self.0[OFFSET_CSUM_L] != (csum & 0xff) as u8 {
            return Err(PoeError::Protocol("checksum mismatch".into()));
        }

        Ok(())
    }
}

impl TryFrom<[u8; MSG_LEN]> for Frame {
    type Error = PoeError;

    fn try_from(buf: [u8; MSG_LEN]) -> Result<Self, Self::Error> {
        Ok(Frame(buf))
    }
}

pub fn checksum(bytes: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    for &b in bytes {
        sum += b as u32;
    }
    (sum & 0xffff) as u16
}

/// Monotonic ECHO counter, wrapping `0xFE -> 0x00` (`0xFF` is skipped).
#[derive(Debug, Default)]
pub struct EchoCounter(u8);

impl EchoCounter {
    pub fn new() -> Self {
        EchoCounter(0x00)
    }

    pub fn next(&mut self) -> u8 {
        self.0 += 1;
        if self.0 == 0xff {
            self.0 = 0x00;
        }
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn checksum_matches_trailer() {
        let frame = Frame::build(&[0x00, 0x01, 0x07, 0x55, 0x00, 0x07, 0x55, 0x00, 0x07, 0x55]).unwrap();
        let csum = checksum(&frame.0[..OFFSET_CSUM_H]);
        assert_eq!(frame.0[OFFSET_CSUM_H], (csum >> 8) as u8);
        assert_eq!(frame.0[OFFSET_CSUM_L], (csum & 0xff) as u8);
    }

    #[test]
    fn build_rejects_oversize_command() {
        let command = vec![0u8; MSG_MAX_COMMAND_LEN + 1];
        assert!(Frame::build(&command).is_err());
    }

    #[test]
    fn echo_wraps_skipping_0xff() {
        let mut echo = EchoCounter::new();
        for _ in 0..0xfd {
            echo.next();
        }
        assert_eq!(echo.next(), 0xfe);
        assert_eq!(echo.next(), 0x00);
        assert_eq!(echo.next(), 0x01);
    }

    proptest! {
        #[test]
        fn round_trip_strips_padding_and_checksum(
            len in 0usize..=MSG_MAX_COMMAND_LEN,
            seed in any::<u64>(),
        ) {
            let mut command = Vec::with_capacity(len);
            let mut x = seed;
            for _ in 0..len {
                x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
                command.push((x >> 56) as u8);
            }
            let frame = Frame::build(&command).unwrap();
            let recovered = frame.strip_padding(len);
            prop_assert_eq!(recovered, command);
        }
    }
}
