//! Upload orchestration: turns image segments into a sequence of
//! erase/write/verify/run commands and reports progress as it goes.
//!
//! Each segment is erased, then written, then (optionally) verified, with a
//! progress callback driven off total bytes across all segments.

use log::{debug, info, warn};

use crate::commands::{self, RUN_JUMP, RUN_RESET};
use crate::config::UploaderConfig;
use crate::error::{Error, Result};
use crate::handshake;
use crate::image::Segment;
use crate::protocol;
use crate::status::{Status, StatusSink};
use crate::transport::{SerialConfig, SerialTransport, Transport};

/// Flags governing one upload call: whether to verify, run, reset, skip
/// erase, and/or invoke a post-run shell command.
#[derive(Debug, Clone, Default)]
pub struct UploadFlags {
    /// Verify every written byte after writing completes.
    pub verify: bool,
    /// Jump to the application once writing (and verification) succeeds.
    pub run: bool,
    /// Force a device reset once writing (and verification) succeeds.
    /// Ignored if `run` is also set; `run` takes priority.
    pub reset: bool,
    /// Skip the erase phase (the caller is responsible for having erased
    /// the target range already).
    pub no_erase: bool,
    /// Shell command to invoke after a successful run/reset.
    pub post_run: Option<String>,
}

/// Drives one upload session over a [`Transport`].
pub struct Uploader<T: Transport> {
    transport: T,
    config: UploaderConfig,
    handshaken: bool,
}

impl<T: Transport> Uploader<T> {
    /// Wrap an already-open transport.
    pub fn new(transport: T, config: UploaderConfig) -> Self {
        Self {
            transport,
            config,
            handshaken: false,
        }
    }

    /// Probe for the bootloader unless this session already has. Idempotent.
    pub fn ensure_handshaken(&mut self, sink: &mut dyn StatusSink) -> Result<()> {
        if self.handshaken {
            return Ok(());
        }
        handshake::handshake(&mut self.transport, &self.config, sink)?;
        self.handshaken = true;
        Ok(())
    }

    /// Whether this session has completed a handshake since the last run/reset.
    #[must_use]
    pub fn is_handshaken(&self) -> bool {
        self.handshaken
    }

    /// Erase `n_bytes` worth of pages starting at `address`. `n_bytes == 0`
    /// still erases one page's worth (callers wanting a true mass erase
    /// should use [`Self::mass_erase`]).
    pub fn erase(&mut self, address: u32, n_bytes: usize) -> Result<()> {
        let pages = n_bytes.div_ceil(self.config.page_size().max(1)).max(1);
        #[allow(clippy::cast_possible_truncation)]
        let pages_u32 = pages as u32;
        commands::erase(&mut self.transport, address, pages_u32)
    }

    /// Erase and unprotect the entire flash (an `Erase` command with page
    /// count 0). Intended for recovery, not routine use.
    pub fn mass_erase(&mut self) -> Result<()> {
        commands::erase(&mut self.transport, 0, 0)
    }

    /// Run to completion: handshake (if needed), erase/write/verify/run for
    /// a single address-anchored buffer, reporting through `sink`.
    pub fn write(
        &mut self,
        address: u32,
        data: &[u8],
        flags: &UploadFlags,
        sink: &mut dyn StatusSink,
    ) -> Result<()> {
        let segment = Segment {
            address,
            data: data.to_vec(),
        };
        self.upload_segments(std::slice::from_ref(&segment), flags, sink)
    }

    /// Compare `data` at `address` against flash contents. Does not erase,
    /// write, run, or reset.
    pub fn verify(&mut self, address: u32, data: &[u8]) -> Result<()> {
        let shifted = protocol::verify_shift_bytes(data);
        commands::verify(&mut self.transport, address, &shifted, self.config.num_tries())
    }

    /// Jump to the application. Clears the handshaken flag: the device has
    /// left the bootloader.
    pub fn run(&mut self) -> Result<()> {
        commands::run(&mut self.transport, RUN_JUMP, self.config.num_tries())?;
        self.handshaken = false;
        Ok(())
    }

    /// Force a device reset. Clears the handshaken flag.
    pub fn reset(&mut self) -> Result<()> {
        commands::run(&mut self.transport, RUN_RESET, self.config.num_tries())?;
        self.handshaken = false;
        Ok(())
    }

    /// Upload a set of disjoint, address-anchored segments: handshake, then
    /// erase/write/verify/run, in that order, reporting every transition
    /// through `sink`.
    pub fn upload_segments(
        &mut self,
        segments: &[Segment],
        flags: &UploadFlags,
        sink: &mut dyn StatusSink,
    ) -> Result<()> {
        self.ensure_handshaken(sink)?;

        let total_bytes: usize = segments.iter().map(|s| s.data.len()).sum();
        let write_share: f32 = if flags.verify { 0.66 } else { 1.0 };
        let num_tries = self.config.num_tries();
        let packet_size = self.config.write_packet_size();

        if !flags.no_erase {
            for segment in segments {
                sink.status_changed(Status::Erasing);
                let pages = segment
                    .data
                    .len()
                    .div_ceil(self.config.page_size().max(1))
                    .max(1);
                #[allow(clippy::cast_possible_truncation)]
                let pages_u32 = pages as u32;
                debug!(
                    "erasing segment at {:#010x} ({} page(s))",
                    segment.address, pages_u32
                );
                if let Err(e) = commands::erase(&mut self.transport, segment.address, pages_u32) {
                    sink.status_changed(Status::EraseFailed);
                    return Err(e);
                }
                sink.status_changed(Status::EraseSucceeded);
            }
        }

        sink.status_changed(Status::Writing);
        let mut bytes_done = 0usize;
        for segment in segments {
            for (addr, raw_len, chunk) in chunk_segment(segment, packet_size, true) {
                if let Err(e) = commands::write(&mut self.transport, addr, &chunk, num_tries) {
                    sink.status_changed(Status::WriteFailed);
                    return Err(e);
                }
                bytes_done += raw_len;
                report_fraction(sink, bytes_done, total_bytes, 0.0, write_share);
            }
        }
        sink.status_changed(Status::WriteSucceeded);
        info!("wrote {total_bytes} byte(s) across {} segment(s)", segments.len());

        if flags.verify {
            sink.status_changed(Status::Verifying);
            let mut bytes_done = 0usize;
            for segment in segments {
                // Verify chunks are NOT padded, unlike write chunks: the
                // bootloader compares byte-for-byte what it receives.
                for (addr, raw_len, chunk) in chunk_segment(segment, packet_size, false) {
                    let shifted = protocol::verify_shift_bytes(&chunk);
                    if let Err(e) = commands::verify(&mut self.transport, addr, &shifted, num_tries)
                    {
                        sink.status_changed(Status::VerifyFailed);
                        return Err(e);
                    }
                    bytes_done += raw_len;
                    report_fraction(sink, bytes_done, total_bytes, write_share, 1.0 - write_share);
                }
            }
            sink.status_changed(Status::VerifySucceeded);
        }

        if flags.run {
            sink.status_changed(Status::Running);
            if let Err(e) = commands::run(&mut self.transport, RUN_JUMP, num_tries) {
                sink.status_changed(Status::RunFailed);
                return Err(e);
            }
            self.handshaken = false;
            sink.status_changed(Status::RunSucceeded);
        } else if flags.reset {
            sink.status_changed(Status::Resetting);
            if let Err(e) = commands::run(&mut self.transport, RUN_RESET, num_tries) {
                sink.status_changed(Status::ResetFailed);
                return Err(e);
            }
            self.handshaken = false;
            sink.status_changed(Status::ResetSucceeded);
        }

        if let Some(command) = &flags.post_run {
            sink.status_changed(Status::PostStep);
            match run_post_step(command) {
                Ok(()) => sink.status_changed(Status::PostStepSucceeded),
                Err(e) => {
                    sink.status_changed(Status::PostStepFailed);
                    return Err(e);
                }
            }
        }

        sink.status_changed(Status::Done);
        Ok(())
    }

    /// Close the underlying transport.
    pub fn close(&mut self) -> Result<()> {
        self.transport.close()
    }
}

impl Uploader<SerialTransport> {
    /// Open a serial port and wrap it in an [`Uploader`], reporting
    /// [`Status::Connecting`] first.
    pub fn connect(
        serial: &SerialConfig,
        config: UploaderConfig,
        sink: &mut dyn StatusSink,
    ) -> Result<Self> {
        sink.status_changed(Status::Connecting);
        let transport = SerialTransport::open(serial)?;
        Ok(Self::new(transport, config))
    }
}

fn report_fraction(
    sink: &mut dyn StatusSink,
    bytes_done: usize,
    total_bytes: usize,
    phase_start: f32,
    phase_share: f32,
) {
    if total_bytes == 0 {
        return;
    }
    #[allow(clippy::cast_precision_loss)]
    let fraction = bytes_done as f32 / total_bytes as f32;
    sink.progress_changed(phase_start + fraction * phase_share);
}

/// Slice `segment.data` into `packet_size`-byte chunks, each paired with its
/// wire address and its un-padded length (used for progress accounting).
/// When `pad_last` is set, a short final chunk is zero-padded to
/// `packet_size`, matching the write path; verify chunks are left short.
fn chunk_segment(segment: &Segment, packet_size: usize, pad_last: bool) -> Vec<(u32, usize, Vec<u8>)> {
    let mut out = Vec::new();
    let mut offset = 0usize;
    while offset < segment.data.len() {
        let end = (offset + packet_size).min(segment.data.len());
        let raw_len = end - offset;
        let mut chunk = segment.data[offset..end].to_vec();
        if pad_last && chunk.len() < packet_size {
            chunk.resize(packet_size, 0x00);
        }
        #[allow(clippy::cast_possible_truncation)]
        let addr = segment.address.wrapping_add(offset as u32);
        out.push((addr, raw_len, chunk));
        offset = end;
    }
    out
}

/// Invoke the optional post-run shell command and translate its exit status.
/// A zero exit status is success, the conventional Unix meaning (see
/// `DESIGN.md` for the deviation this records).
fn run_post_step(command: &str) -> Result<()> {
    let status = std::process::Command::new("sh").arg("-c").arg(command).status()?;
    if status.success() {
        Ok(())
    } else {
        warn!("post-run command exited with status {:?}", status.code());
        Err(Error::PostStep(status.code().unwrap_or(-1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ACK;
    use crate::status::RecordingSink;
    use crate::transport::fake::FakeTransport;

    fn handshaken_uploader(config: UploaderConfig) -> (Uploader<FakeTransport>, RecordingSink) {
        let mut transport = FakeTransport::new();
        transport.push_response(b"ADuC7020"); // handshake ident
        let uploader = Uploader::new(transport, config);
        (uploader, RecordingSink::default())
    }

    #[test]
    fn erase_planning_matches_expected_page_and_chunk_counts() {
        // 1025 bytes at 0x1000, page size 512 -> 3 pages, 65 write chunks
        // (packet size 16), last chunk padded to 16 bytes.
        let segment = Segment {
            address: 0x1000,
            data: vec![0xABu8; 1025],
        };
        let chunks = chunk_segment(&segment, 16, true);
        assert_eq!(chunks.len(), 65);
        assert_eq!(chunks.last().unwrap().2.len(), 16);
        assert_eq!(chunks.last().unwrap().1, 1); // 1025 % 16 == 1 real byte in the last chunk

        let pages = segment.data.len().div_ceil(512);
        assert_eq!(pages, 3);
    }

    #[test]
    fn verify_chunks_are_not_padded() {
        let segment = Segment {
            address: 0,
            data: vec![0xAB; 17],
        };
        let chunks = chunk_segment(&segment, 16, false);
        assert_eq!(chunks[1].2.len(), 1);
    }

    #[test]
    fn full_round_trip_emits_every_lifecycle_state_in_order() {
        let (mut uploader, mut sink) = handshaken_uploader(UploaderConfig::builder().build().unwrap());
        // erase ACK, then 1 write chunk ACK, then 1 verify chunk ACK, then run ACK
        uploader.transport.push_response(&[ACK, ACK, ACK, ACK]);

        let segment = Segment {
            address: 0,
            data: vec![0x11, 0x22],
        };
        let flags = UploadFlags {
            verify: true,
            run: true,
            ..Default::default()
        };
        uploader
            .upload_segments(std::slice::from_ref(&segment), &flags, &mut sink)
            .unwrap();

        assert_eq!(
            sink.statuses,
            vec![
                Status::WaitingForDevice,
                Status::DeviceFound,
                Status::Erasing,
                Status::EraseSucceeded,
                Status::Writing,
                Status::WriteSucceeded,
                Status::Verifying,
                Status::VerifySucceeded,
                Status::Running,
                Status::RunSucceeded,
                Status::Done,
            ]
        );
        assert!(!uploader.is_handshaken());
    }

    #[test]
    fn write_failure_aborts_and_reports_write_failed() {
        let (mut uploader, mut sink) = handshaken_uploader(UploaderConfig::builder().num_tries(1).build().unwrap());
        uploader.transport.push_response(&[ACK]); // erase succeeds
        uploader.transport.push_response(&[crate::protocol::NAK]); // write NAKs once, no retries left

        let segment = Segment {
            address: 0,
            data: vec![0x11],
        };
        let err = uploader
            .upload_segments(std::slice::from_ref(&segment), &UploadFlags::default(), &mut sink)
            .unwrap_err();
        assert!(matches!(err, Error::CommandFailed { .. }));
        assert!(sink.statuses.contains(&Status::WriteFailed));
        assert!(!sink.statuses.contains(&Status::Done));
    }
}
