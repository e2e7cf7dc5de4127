//! Lifecycle status and progress reporting.
//!
//! The core never owns a terminal or a UI framework; it reports through a
//! small observer trait and lets the caller decide how (or whether) to show
//! it. The CLI binary supplies an `indicatif`-backed sink; tests use
//! [`RecordingSink`] to assert exact event ordering.

/// One step in the upload lifecycle. Every variant here is reachable from
/// the orchestrator; most sessions only visit a subset (e.g.
/// `Verifying`/`VerifySucceeded` only when verification is requested).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Opening the serial port.
    Connecting,
    /// Probing the device with handshake bytes.
    WaitingForDevice,
    /// The device answered but is running firmware, not the bootloader.
    NotInFlashMode,
    /// The bootloader identified itself; the session is handshaken.
    DeviceFound,
    /// Erasing pages ahead of a write.
    Erasing,
    /// Erase NAK'd.
    EraseFailed,
    /// Erase ACK'd.
    EraseSucceeded,
    /// Writing program data.
    Writing,
    /// A write chunk exhausted its retries.
    WriteFailed,
    /// All chunks of a segment were written.
    WriteSucceeded,
    /// Verifying program data.
    Verifying,
    /// A verify chunk exhausted its retries.
    VerifyFailed,
    /// All chunks of a segment verified.
    VerifySucceeded,
    /// Issuing the run (jump-to-application) command.
    Running,
    /// Run NAK'd.
    RunFailed,
    /// Run ACK'd; the device left the bootloader.
    RunSucceeded,
    /// Issuing the reset command.
    Resetting,
    /// Reset NAK'd.
    ResetFailed,
    /// Reset ACK'd.
    ResetSucceeded,
    /// Running the optional external post-run command.
    PostStep,
    /// The post-run command exited zero.
    PostStepSucceeded,
    /// The post-run command exited non-zero.
    PostStepFailed,
    /// The session reached its end, successfully or not.
    Done,
}

/// Observer for upload progress. Called synchronously from the orchestrator;
/// implementations must not block it for long and are not required to be
/// re-entrant.
pub trait StatusSink {
    /// A lifecycle transition occurred.
    fn status_changed(&mut self, status: Status);

    /// Overall progress, in `0.0..=1.0`, monotonically non-decreasing within
    /// a phase (write and verify each occupy their own sub-range).
    fn progress_changed(&mut self, progress: f32);
}

/// A [`StatusSink`] that does nothing. Useful when a caller only wants the
/// boolean result of an upload.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl StatusSink for NullSink {
    fn status_changed(&mut self, _status: Status) {}
    fn progress_changed(&mut self, _progress: f32) {}
}

/// A [`StatusSink`] that records every event it receives, in order. Used by
/// tests to assert the orchestrator's event sequence.
#[derive(Debug, Default)]
pub struct RecordingSink {
    /// Status transitions, in the order they were reported.
    pub statuses: Vec<Status>,
    /// Progress values, in the order they were reported.
    pub progress: Vec<f32>,
}

impl StatusSink for RecordingSink {
    fn status_changed(&mut self, status: Status) {
        self.statuses.push(status);
    }

    fn progress_changed(&mut self, progress: f32) {
        self.progress.push(progress);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_preserves_order() {
        let mut sink = RecordingSink::default();
        sink.status_changed(Status::Connecting);
        sink.status_changed(Status::WaitingForDevice);
        sink.progress_changed(0.5);
        assert_eq!(sink.statuses, vec![Status::Connecting, Status::WaitingForDevice]);
        assert_eq!(sink.progress, vec![0.5]);
    }
}
