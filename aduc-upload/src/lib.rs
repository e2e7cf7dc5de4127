//! # aduc-upload
//!
//! A host-side firmware uploader for the Analog Devices ADuC70xx family of
//! ARM7TDMI microcontrollers, driving the factory serial bootloader described
//! in application note AN-724.
//!
//! A host connects to the device over a UART while it is in flash-download
//! mode and issues a small, strict binary protocol to erase flash pages,
//! program bytes, verify them, and jump to (or reset out of) the bootloader.
//! This crate implements that protocol end to end:
//!
//! - [`transport`] — the serial line itself: open/close, timed byte I/O.
//! - [`protocol`] — packet framing, the mirror-window address remap, the
//!   checksum, and the verify-time bit rotation.
//! - [`handshake`] — probing the device until it identifies itself.
//! - [`commands`] — typed `Erase`/`Write`/`Verify`/`Run` commands with retry.
//! - [`orchestrator`] — turns a set of image segments into a full upload
//!   session and reports progress through a [`status::StatusSink`].
//! - [`image`] — Intel-HEX / raw / ELF-sniffing image loader adapter.
//!
//! ## Supported hardware
//!
//! - ADuC70xx family (ARM7TDMI core with a UART factory bootloader).
//!
//! ## Out of scope
//!
//! No JTAG/SWD, no in-application update protocol, no other MCU families,
//! no concurrent use of one serial port by multiple uploaders, no recovery
//! of a device that cannot enter bootloader mode. Serial port enumeration,
//! Intel-HEX *parsing itself* (delegated to the `ihex` crate), and ELF→HEX
//! preconversion are treated as external collaborators.
//!
//! ## Example
//!
//! ```no_run
//! use aduc_upload::{Uploader, UploaderConfig, UploadFlags, SerialConfig, image, status::NullSink};
//!
//! fn main() -> aduc_upload::Result<()> {
//!     let bytes = std::fs::read("firmware.hex")?;
//!     let segments = image::load_segments(&bytes, 0)?;
//!
//!     let serial = SerialConfig::new("/dev/ttyUSB0", 115_200);
//!     let config = UploaderConfig::builder().build()?;
//!     let mut sink = NullSink;
//!     let mut uploader = Uploader::connect(&serial, config, &mut sink)?;
//!
//!     let flags = UploadFlags {
//!         verify: true,
//!         run: true,
//!         ..Default::default()
//!     };
//!     uploader.upload_segments(&segments, &flags, &mut sink)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Typed `Erase`/`Write`/`Verify`/`Run` bootloader commands with retry.
pub mod commands;
/// Immutable uploader configuration.
pub mod config;
/// Error and result types.
pub mod error;
/// Bootloader handshake probing.
pub mod handshake;
/// Image loader adapter (Intel-Hex / raw / ELF sniffing).
pub mod image;
/// Upload session orchestration and progress reporting.
pub mod orchestrator;
/// AN-724 wire protocol: framing, checksum, remap, verify-shift.
pub mod protocol;
/// Lifecycle status and progress observer types.
pub mod status;
/// Serial transport abstraction.
pub mod transport;

/// Highest page count a single `Erase` command accepts.
pub use commands::MAX_ERASE_PAGES;
/// Immutable, validated uploader configuration.
pub use config::UploaderConfig;
/// Error and result aliases used throughout this crate.
pub use error::{Error, Result};
/// Image format classification and address-anchored byte segment.
pub use image::{ImageFormat, Segment};
/// Upload flags and the session driver.
pub use orchestrator::{UploadFlags, Uploader};
/// Bootloader command byte.
pub use protocol::Command;
/// Lifecycle status, the sink trait, and a no-op sink.
pub use status::{NullSink, Status, StatusSink};
/// Serial line configuration, the native transport, and the transport trait.
pub use transport::{SerialConfig, SerialTransport, Transport};
