//! Bootloader handshake: probing the device until it identifies itself.

use std::time::Instant;

use log::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::status::{Status, StatusSink};
use crate::transport::Transport;
use crate::UploaderConfig;

/// Byte sent repeatedly to probe for the bootloader.
const PROBE_BYTE: u8 = 0x08;

/// Bootloader identification responses are at most this long.
const IDENT_BUF_LEN: usize = 24;

/// First-byte values meaning "powered, but running firmware, not the
/// bootloader".
const NOT_IN_FLASH_MODE: [u8; 2] = [0x07, 0x80];

/// Probe `transport` with `0x08` bytes until the device identifies itself.
///
/// Reports [`Status::WaitingForDevice`] once up front, [`Status::NotInFlashMode`]
/// each time the device answers but isn't in the bootloader, and
/// [`Status::DeviceFound`] on success. Probes forever unless
/// `config.handshake_timeout()` is set.
pub fn handshake<T: Transport + ?Sized>(
    transport: &mut T,
    config: &UploaderConfig,
    sink: &mut dyn StatusSink,
) -> Result<()> {
    sink.status_changed(Status::WaitingForDevice);
    let deadline = config.handshake_timeout().map(|timeout| Instant::now() + timeout);
    let mut buf = [0u8; IDENT_BUF_LEN];

    loop {
        transport.write_all(&[PROBE_BYTE])?;
        transport.flush()?;
        match transport.read(&mut buf) {
            Ok(n) if n > 0 => {
                if NOT_IN_FLASH_MODE.contains(&buf[0]) {
                    trace!("{}: device answered but is not in flash mode", transport.name());
                    sink.status_changed(Status::NotInFlashMode);
                } else {
                    debug!("{}: bootloader identified itself ({n} bytes)", transport.name());
                    sink.status_changed(Status::DeviceFound);
                    return Ok(());
                }
            }
            // No data this poll (short read timeout elapsed) or a zero-length
            // read: the device just hasn't answered yet, keep probing.
            Ok(_) => {}
            Err(e) if crate::transport::is_timeout(&e) => {}
            Err(e) => return Err(e.into()),
        }

        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                warn!("{}: handshake timed out", transport.name());
                return Err(Error::Handshake {
                    port: transport.name().to_string(),
                });
            }
        }
    }
}
