//! AN-724 wire protocol: packet framing, address remapping and the
//! verify-time bit-rotate transform.
//!
//! Frame layout:
//!
//! ```text
//! +-------+--------+---------+---------+--------+----------+
//! | magic | length | command | address |  data  | checksum |
//! +-------+--------+---------+---------+--------+----------+
//! | 2     | 1      | 1       | 4 (BE)  | 0..250 | 1        |
//! +-------+--------+---------+---------+--------+----------+
//! | 07 0E | 5+|data||'E'/'W'/|remapped |        | -sum&0xFF|
//! |       |        |'V'/'R' |         |        |          |
//! +-------+--------+---------+---------+--------+----------+
//! ```

use byteorder::{BigEndian, WriteBytesExt};

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Fixed two-byte frame marker.
pub const MAGIC: [u8; 2] = [0x07, 0x0E];

/// ACK response byte: the previous command succeeded.
pub const ACK: u8 = 0x06;

/// NAK response byte: the previous command failed.
pub const NAK: u8 = 0x07;

/// Base of the mirrored flash window. Addresses at or above this fold back
/// to the zero-based range (see [`remap_address`]). The ADuC70xx datasheet
/// describes the mirror at `0x00800000` (seven zeros); see `DESIGN.md` for
/// the deviation this records.
pub const MIRROR_BASE: u32 = 0x0080_0000;

/// Maximum data bytes in a single frame (`length` byte must be `5 + len <= 255`).
pub const MAX_FRAME_DATA: usize = 250;

/// Bootloader command bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Erase one or more 512-byte pages (or the whole part, for a page count of 0).
    Erase,
    /// Program bytes at an address.
    Write,
    /// Compare bytes at an address against the rotate-shifted payload.
    Verify,
    /// Jump to the application, or reset the device.
    Run,
}

impl Command {
    /// The single ASCII byte sent on the wire for this command.
    #[must_use]
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Erase => b'E',
            Self::Write => b'W',
            Self::Verify => b'V',
            Self::Run => b'R',
        }
    }
}

/// Single-byte device response to a command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Command accepted.
    Ack,
    /// Command rejected.
    Nak,
}

/// Fold the mirrored flash window back to the zero-based range. Addresses
/// below [`MIRROR_BASE`] pass through unchanged.
#[must_use]
pub fn remap_address(address: u32) -> u32 {
    if address >= MIRROR_BASE {
        address - MIRROR_BASE
    } else {
        address
    }
}

/// Two's-complement checksum: the byte that makes `bytes` (length, command,
/// address and data, but not the magic or the checksum itself) sum to a
/// multiple of 256.
#[must_use]
pub fn checksum(bytes: &[u8]) -> u8 {
    let sum: u32 = bytes.iter().map(|&b| u32::from(b)).sum();
    #[allow(clippy::cast_possible_truncation)]
    let result = ((256 - (sum % 256)) % 256) as u8;
    result
}

/// Left-rotate a single byte by 3 bits, the transform the bootloader applies
/// internally before comparing flash contents against a `Verify` payload.
#[must_use]
pub fn verify_shift(b: u8) -> u8 {
    ((b << 3) | (b >> 5)) & 0xFF
}

/// Apply [`verify_shift`] to every byte of `data`.
#[must_use]
pub fn verify_shift_bytes(data: &[u8]) -> Vec<u8> {
    data.iter().copied().map(verify_shift).collect()
}

/// Build the bytes of one command frame. `address` is the *logical* address;
/// it is remapped internally before being placed on the wire.
pub fn build_frame(command: Command, address: u32, data: &[u8]) -> Result<Vec<u8>> {
    if data.len() > MAX_FRAME_DATA {
        return Err(Error::Configuration(format!(
            "frame data length {} exceeds the {MAX_FRAME_DATA}-byte limit",
            data.len()
        )));
    }
    let remapped = remap_address(address);
    #[allow(clippy::cast_possible_truncation)]
    let length = (5 + data.len()) as u8;

    let mut body = Vec::with_capacity(5 + data.len());
    body.push(length);
    body.push(command.as_byte());
    body.write_u32::<BigEndian>(remapped).expect("write to Vec cannot fail");
    body.extend_from_slice(data);

    let mut frame = Vec::with_capacity(MAGIC.len() + body.len() + 1);
    frame.extend_from_slice(&MAGIC);
    frame.extend_from_slice(&body);
    frame.push(checksum(&body));
    Ok(frame)
}

/// Frame, send, and read back one response byte over `transport`. Drains any
/// stale input first, so a leftover byte from an earlier aborted attempt is
/// never mistaken for this command's answer.
pub fn send_frame<T: Transport + ?Sized>(
    transport: &mut T,
    command: Command,
    address: u32,
    data: &[u8],
) -> Result<Response> {
    transport.drain_input()?;
    let frame = build_frame(command, address, data)?;
    transport.write_all(&frame)?;
    transport.flush()?;

    let mut byte = [0u8; 1];
    loop {
        match transport.read(&mut byte) {
            Ok(1) => break,
            Ok(_) => continue,
            Err(e) if crate::transport::is_timeout(&e) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    match byte[0] {
        ACK => Ok(Response::Ack),
        NAK => Ok(Response::Nak),
        other => Err(Error::Protocol { byte: other }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fake::FakeTransport;

    #[test]
    fn checksum_matches_known_vector() {
        // length=0x05, command='R'=0x52, address=0, data=[0x01]
        let bytes = [0x05, 0x52, 0x00, 0x00, 0x00, 0x01];
        assert_eq!(checksum(&bytes), 0xA8);
    }

    #[test]
    fn checksum_bytes_always_sum_to_zero_mod_256() {
        let bytes = [5u8, b'W', 0, 0, 0x10, 0xAA, 0xBB];
        let cs = checksum(&bytes);
        let sum: u32 = bytes.iter().map(|&b| u32::from(b)).sum::<u32>() + u32::from(cs);
        assert_eq!(sum % 256, 0);
    }

    #[test]
    fn verify_shift_vector() {
        let input = [0x01u8, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40, 0x80];
        let expected = [0x08u8, 0x10, 0x20, 0x40, 0x80, 0x01, 0x02, 0x04];
        assert_eq!(verify_shift_bytes(&input), expected);
    }

    #[test]
    fn remap_folds_the_mirror_window() {
        assert_eq!(remap_address(0x0080_0100), 0x0000_0100);
        assert_eq!(remap_address(0x0000_0100), 0x0000_0100);
    }

    #[test]
    fn write_frame_layout_matches_known_vector() {
        // Write(0x00000010, [0xAA, 0xBB])
        let frame = build_frame(Command::Write, 0x0000_0010, &[0xAA, 0xBB]).unwrap();
        assert_eq!(
            frame,
            vec![0x07, 0x0E, 0x07, b'W', 0x00, 0x00, 0x00, 0x10, 0xAA, 0xBB, 0xB7]
        );
    }

    #[test]
    fn build_frame_rejects_oversized_payload() {
        let data = vec![0u8; MAX_FRAME_DATA + 1];
        assert!(build_frame(Command::Write, 0, &data).is_err());
    }

    #[test]
    fn send_frame_drains_stale_bytes_before_transmitting() {
        let mut t = FakeTransport::new();
        t.push_stale(&[0xFF, 0xFF]); // stale NAK-ish garbage from an aborted attempt
        t.push_response(&[ACK]);
        let response = send_frame(&mut t, Command::Run, 0, &[]).unwrap();
        assert_eq!(response, Response::Ack);
    }

    #[test]
    fn send_frame_maps_nak_and_unexpected_bytes() {
        let mut t = FakeTransport::new();
        t.push_response(&[NAK]);
        assert_eq!(
            send_frame(&mut t, Command::Erase, 0, &[1]).unwrap(),
            Response::Nak
        );

        let mut t = FakeTransport::new();
        t.push_response(&[0x42]);
        let err = send_frame(&mut t, Command::Erase, 0, &[1]).unwrap_err();
        assert!(matches!(err, Error::Protocol { byte: 0x42 }));
    }
}
