//! Output sink capability: where decoded PCM ends up.
//!
//! The pipeline's consumer thread owns exactly one sink. A sink keeps its
//! device handle internal and reopens it on demand, so `close` followed by
//! `write` is always legal.

pub mod device;
pub mod raw;

use crate::error::Result;
use crate::services::catalog::PcmFormat;

/// Builds the sink on the thread that will own it. Device handles are not
/// generally movable across threads, so construction is deferred to the
/// pipeline's consumer thread.
pub type SinkFactory = Box<dyn FnOnce() -> Box<dyn OutputSink> + Send>;

pub trait OutputSink {
    /// Offer frames (interleaved, `format.frame_size()` bytes per frame).
    /// Returns how many frames were consumed; 0 means the device cannot
    /// absorb more right now. A format different from the previous write
    /// makes the sink flush, close and reopen before accepting data.
    fn write(&mut self, data: &[u8], format: &PcmFormat) -> Result<usize>;

    /// Discard output that was accepted but not yet rendered.
    fn flush(&mut self);

    /// Release the device. The next `write` reopens it.
    fn close(&mut self);
}
