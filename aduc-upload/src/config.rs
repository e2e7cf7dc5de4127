//! Immutable uploader configuration.
//!
//! Retry count, packet size, page size and timeouts are collected into one
//! value built once via [`UploaderConfig::builder`] and never mutated
//! afterward, the same shape [`crate::transport::SerialConfig`] takes.

use std::time::Duration;

use crate::error::{Error, Result};

/// Hard limit imposed by the packet framer: `length = 5 + data.len()` must
/// fit in one byte.
pub const MAX_PACKET_DATA: usize = 250;

/// Flash erase unit, in bytes.
pub const DEFAULT_PAGE_SIZE: usize = 512;

/// Immutable configuration for an upload session.
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    pub(crate) num_tries: u32,
    pub(crate) write_packet_size: usize,
    pub(crate) page_size: usize,
    pub(crate) read_timeout: Duration,
    pub(crate) handshake_timeout: Option<Duration>,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            num_tries: 3,
            write_packet_size: 16,
            page_size: DEFAULT_PAGE_SIZE,
            read_timeout: Duration::from_millis(10),
            handshake_timeout: None,
        }
    }
}

impl UploaderConfig {
    /// Start building a configuration from the defaults observed on real
    /// ADuC70xx boards (3 retries, 16-byte write packets, 512-byte pages).
    #[must_use]
    pub fn builder() -> UploaderConfigBuilder {
        UploaderConfigBuilder::default()
    }

    /// Number of attempts `Write`/`Verify`/`Run` get before surfacing
    /// [`Error::CommandFailed`](crate::error::Error::CommandFailed).
    #[must_use]
    pub fn num_tries(&self) -> u32 {
        self.num_tries
    }

    /// Payload size of a single write/verify packet.
    #[must_use]
    pub fn write_packet_size(&self) -> usize {
        self.write_packet_size
    }

    /// Flash erase granularity.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Per-byte read timeout on the serial transport.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Overall deadline for the handshake loop; `None` probes forever.
    #[must_use]
    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout
    }
}

/// Builder for [`UploaderConfig`]. Validates bounds up front so a bad value
/// never makes it onto the wire.
#[derive(Debug, Clone, Default)]
pub struct UploaderConfigBuilder {
    inner: UploaderConfig,
}

impl UploaderConfigBuilder {
    /// Set the retry count used by write/verify/run. Must be at least 1.
    #[must_use]
    pub fn num_tries(mut self, n: u32) -> Self {
        self.inner.num_tries = n;
        self
    }

    /// Set the write/verify packet payload size. Validated against
    /// [`MAX_PACKET_DATA`] at [`build`](Self::build) time.
    #[must_use]
    pub fn write_packet_size(mut self, n: usize) -> Self {
        self.inner.write_packet_size = n;
        self
    }

    /// Set the flash page size used to plan erase commands.
    #[must_use]
    pub fn page_size(mut self, n: usize) -> Self {
        self.inner.page_size = n;
        self
    }

    /// Set the per-byte transport read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.inner.read_timeout = timeout;
        self
    }

    /// Bound how long the handshake loop probes before giving up. `None`
    /// (the default) probes indefinitely.
    #[must_use]
    pub fn handshake_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.inner.handshake_timeout = timeout;
        self
    }

    /// Validate and produce the immutable configuration.
    pub fn build(self) -> Result<UploaderConfig> {
        if self.inner.num_tries < 1 {
            return Err(Error::Configuration(
                "num_tries must be at least 1".into(),
            ));
        }
        if self.inner.write_packet_size == 0 || self.inner.write_packet_size > MAX_PACKET_DATA {
            return Err(Error::Configuration(format!(
                "write_packet_size must be in 1..={MAX_PACKET_DATA}, got {}",
                self.inner.write_packet_size
            )));
        }
        if self.inner.page_size == 0 {
            return Err(Error::Configuration("page_size must be nonzero".into()));
        }
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_hardware() {
        let cfg = UploaderConfig::builder().build().unwrap();
        assert_eq!(cfg.num_tries(), 3);
        assert_eq!(cfg.write_packet_size(), 16);
        assert_eq!(cfg.page_size(), 512);
        assert_eq!(cfg.handshake_timeout(), None);
    }

    #[test]
    fn rejects_oversized_write_packet() {
        let err = UploaderConfig::builder()
            .write_packet_size(300)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn rejects_zero_retries() {
        let err = UploaderConfig::builder().num_tries(0).build().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
