//! Raw-PCM sink: appends interleaved native-endian i16 frames to a file or
//! FIFO. Headerless; pair it with `ffplay -f s16le` or a FIFO consumer.
//! Useful on headless machines and in soak tests.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use crate::error::Result;
use crate::services::catalog::PcmFormat;

use super::OutputSink;

pub struct RawSink {
    path: PathBuf,
    file: Option<File>,
    format: Option<PcmFormat>,
}

impl RawSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        RawSink {
            path: path.into(),
            file: None,
            format: None,
        }
    }
}

impl OutputSink for RawSink {
    fn write(&mut self, data: &[u8], format: &PcmFormat) -> Result<usize> {
        if self.format.is_some() && self.format != Some(*format) {
            tracing::debug!("raw sink: format change, reopening {:?}", self.path);
            self.close();
        }
        if self.file.is_none() {
            self.file = Some(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)?,
            );
            self.format = Some(*format);
            tracing::info!("raw sink writing to {:?}", self.path);
        }
        // Intrinsically blocking sink: a full FIFO applies backpressure by
        // stalling the consumer thread, never by partial frames.
        self.file.as_mut().unwrap().write_all(data)?;
        Ok(data.len() / format.frame_size())
    }

    fn flush(&mut self) {
        // Bytes already handed to the OS are not revocable for a plain file.
    }

    fn close(&mut self) {
        self.file = None;
        self.format = None;
    }
}
