//! Typed bootloader commands built on top of the packet framer.
//!
//! `Write`/`Verify`/`Run` retry on NAK up to the configured attempt budget.
//! `Erase` does not retry: a NAK there leaves flash state uncertain and is
//! surfaced immediately instead.

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::{self, Command, Response};
use crate::transport::Transport;

/// Highest page count a single `Erase` command accepts. A page count of 0 is
/// a distinct mass-erase request and is not subject to this bound.
pub const MAX_ERASE_PAGES: u32 = 124;

/// Run mode: jump straight to the application.
pub const RUN_JUMP: u32 = 0;
/// Run mode: force a device reset.
pub const RUN_RESET: u32 = 1;

/// Erase `n_pages` 512-byte pages starting at `address`. `n_pages == 0` is a
/// mass erase (erase-and-unprotect the whole part). Not retried.
pub fn erase<T: Transport + ?Sized>(transport: &mut T, address: u32, n_pages: u32) -> Result<()> {
    if n_pages > MAX_ERASE_PAGES {
        return Err(Error::Configuration(format!(
            "erase page count {n_pages} exceeds the {MAX_ERASE_PAGES}-page limit"
        )));
    }
    #[allow(clippy::cast_possible_truncation)]
    let payload = [n_pages as u8];
    debug!("erasing {n_pages} page(s) at {address:#010x}");
    match protocol::send_frame(transport, Command::Erase, address, &payload)? {
        Response::Ack => Ok(()),
        Response::Nak => Err(Error::CommandFailed {
            command: Command::Erase,
            address,
            attempts: 1,
        }),
    }
}

/// Program `data` at `address`, retrying on NAK up to `num_tries` times.
pub fn write<T: Transport + ?Sized>(
    transport: &mut T,
    address: u32,
    data: &[u8],
    num_tries: u32,
) -> Result<()> {
    retry(transport, Command::Write, address, data, num_tries)
}

/// Compare `data` at `address` against the device's flash contents, retrying
/// on NAK up to `num_tries` times. `data` must already be rotate-shifted
/// (see [`crate::protocol::verify_shift_bytes`]).
pub fn verify<T: Transport + ?Sized>(
    transport: &mut T,
    address: u32,
    shifted_data: &[u8],
    num_tries: u32,
) -> Result<()> {
    retry(transport, Command::Verify, address, shifted_data, num_tries)
}

/// Jump to the application (`mode == RUN_JUMP`) or force a reset
/// (`mode == RUN_RESET`), retrying on NAK up to `num_tries` times.
pub fn run<T: Transport + ?Sized>(transport: &mut T, mode: u32, num_tries: u32) -> Result<()> {
    retry(transport, Command::Run, mode, &[], num_tries)
}

fn retry<T: Transport + ?Sized>(
    transport: &mut T,
    command: Command,
    address: u32,
    data: &[u8],
    num_tries: u32,
) -> Result<()> {
    for attempt in 1..=num_tries.max(1) {
        match protocol::send_frame(transport, command, address, data)? {
            Response::Ack => return Ok(()),
            Response::Nak => {
                warn!("{command:?} at {address:#010x} NAK'd (attempt {attempt}/{num_tries})");
            }
        }
    }
    Err(Error::CommandFailed {
        command,
        address,
        attempts: num_tries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ACK, NAK};
    use crate::transport::fake::FakeTransport;

    #[test]
    fn erase_accepts_a_mass_erase_request() {
        let mut t = FakeTransport::new();
        t.push_response(&[ACK]);
        erase(&mut t, 0, 0).unwrap();
        // command byte 'E', one-byte 0x00 payload, no retry on NAK path taken.
        assert_eq!(t.written[3], b'E');
        assert_eq!(t.written[8], 0x00);
        assert_eq!(t.written.len(), 10); // magic(2)+len(1)+cmd(1)+addr(4)+data(1)+cs(1)
    }

    #[test]
    fn erase_rejects_page_counts_above_the_limit() {
        let mut t = FakeTransport::new();
        let err = erase(&mut t, 0, MAX_ERASE_PAGES + 1).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn erase_does_not_retry_on_nak() {
        let mut t = FakeTransport::new();
        t.push_response(&[NAK]);
        let err = erase(&mut t, 0, 4).unwrap_err();
        assert!(matches!(err, Error::CommandFailed { attempts: 1, .. }));
    }

    #[test]
    fn write_retries_then_succeeds() {
        // two NAKs, then an ACK, with num_tries == 3.
        let mut t = FakeTransport::new();
        t.push_response(&[NAK, NAK, ACK]);
        write(&mut t, 0x10, &[0xAA, 0xBB], 3).unwrap();
    }

    #[test]
    fn write_fails_after_exhausting_retries() {
        let mut t = FakeTransport::new();
        t.push_response(&[NAK, NAK, NAK]);
        let err = write(&mut t, 0x10, &[0xAA], 3).unwrap_err();
        assert!(matches!(err, Error::CommandFailed { attempts: 3, .. }));
    }

    #[test]
    fn run_addresses_encode_jump_and_reset() {
        let mut t = FakeTransport::new();
        t.push_response(&[ACK]);
        run(&mut t, RUN_JUMP, 1).unwrap();
        assert_eq!(t.written[4..8], [0, 0, 0, 0]);

        let mut t = FakeTransport::new();
        t.push_response(&[ACK]);
        run(&mut t, RUN_RESET, 1).unwrap();
        assert_eq!(t.written[4..8], [0, 0, 0, 1]);
    }
}
