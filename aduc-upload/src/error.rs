//! Error types for aduc-upload.

use std::io;
use thiserror::Error;

/// Result type for aduc-upload operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for aduc-upload operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error (open, configure, enumerate).
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// A host-side parameter is out of range before anything is sent on the wire.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The device never responded to the handshake probe before the configured
    /// deadline elapsed.
    #[error("handshake timed out waiting for device on {port}")]
    Handshake {
        /// Port the handshake was attempted on.
        port: String,
    },

    /// A response byte was neither ACK (`0x06`) nor NAK (`0x07`).
    #[error("protocol error: unexpected response byte {byte:#04x}")]
    Protocol {
        /// The offending byte.
        byte: u8,
    },

    /// A command exhausted its retry budget without an ACK.
    #[error("command {command:?} at address {address:#010x} failed after {attempts} attempt(s)")]
    CommandFailed {
        /// The command that failed.
        command: crate::protocol::Command,
        /// The (pre-remap) address the command targeted.
        address: u32,
        /// Number of attempts made.
        attempts: u32,
    },

    /// The optional external post-run command returned a non-zero exit status.
    #[error("post-run command exited with status {0}")]
    PostStep(i32),

    /// An image could not be classified or is a format this crate does not
    /// parse itself (ELF requires external preconversion).
    #[error("unsupported image format: {0}")]
    Unsupported(String),

    /// Intel-HEX parsing failed.
    #[error("Intel-HEX error: {0}")]
    IntelHex(String),
}
