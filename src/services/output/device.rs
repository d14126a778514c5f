//! System audio device sink.
//!
//! The device callback runs on a high-priority thread and must never block,
//! so samples cross over on a lock-free ring: `write` pushes into the
//! producer side and reports how many frames fit, the callback drains the
//! consumer side and substitutes silence on underrun. A flush is signalled
//! through an atomic the callback honours on its next run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use rtrb::{Consumer, Producer, RingBuffer};

use crate::error::{Error, Result};
use crate::services::catalog::PcmFormat;

use super::OutputSink;

/// Ring capacity in seconds of audio.
const RING_SECONDS: u32 = 1;

pub struct DeviceSink {
    open: Option<OpenDevice>,
}

struct OpenDevice {
    // Held for its Drop; stopping the stream releases the device.
    _stream: cpal::Stream,
    producer: Producer<i16>,
    format: PcmFormat,
    discard: Arc<AtomicBool>,
}

impl DeviceSink {
    pub fn new() -> Self {
        DeviceSink { open: None }
    }

    fn open(format: &PcmFormat) -> Result<OpenDevice> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Output("no default output device".to_string()))?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let supported = device
            .default_output_config()
            .map_err(|e| Error::Output(format!("query device config: {}", e)))?;

        let config = StreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let capacity = (format.sample_rate * RING_SECONDS) as usize * format.channels as usize;
        let (producer, consumer) = RingBuffer::<i16>::new(capacity);
        let discard = Arc::new(AtomicBool::new(false));

        let err_fn = |e| tracing::warn!("audio stream error: {}", e);
        let stream = match supported.sample_format() {
            SampleFormat::I16 => {
                let mut render = Self::render_fn(consumer, discard.clone());
                device
                    .build_output_stream(
                        &config,
                        move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                            render(data.len(), &mut |i, s| data[i] = s);
                        },
                        err_fn,
                        None,
                    )
                    .map_err(|e| Error::Output(format!("build i16 stream: {}", e)))?
            }
            SampleFormat::F32 => {
                let mut render = Self::render_fn(consumer, discard.clone());
                device
                    .build_output_stream(
                        &config,
                        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                            render(data.len(), &mut |i, s| data[i] = s as f32 / 32768.0);
                        },
                        err_fn,
                        None,
                    )
                    .map_err(|e| Error::Output(format!("build f32 stream: {}", e)))?
            }
            other => {
                return Err(Error::Output(format!(
                    "device sample format {:?} not supported",
                    other
                )))
            }
        };

        stream
            .play()
            .map_err(|e| Error::Output(format!("start stream: {}", e)))?;

        tracing::info!(
            "opened audio device {} at {} Hz, {} channels",
            device_name,
            format.sample_rate,
            format.channels
        );

        Ok(OpenDevice {
            _stream: stream,
            producer,
            format: *format,
            discard,
        })
    }

    /// Shared body of the i16/f32 callbacks: drain-and-discard on flush,
    /// then pop one sample per slot, silence on underrun.
    fn render_fn(
        mut consumer: Consumer<i16>,
        discard: Arc<AtomicBool>,
    ) -> impl FnMut(usize, &mut dyn FnMut(usize, i16)) + Send {
        move |len, put| {
            if discard.swap(false, Ordering::AcqRel) {
                while consumer.pop().is_ok() {}
            }
            for i in 0..len {
                put(i, consumer.pop().unwrap_or(0));
            }
        }
    }
}

impl OutputSink for DeviceSink {
    fn write(&mut self, data: &[u8], format: &PcmFormat) -> Result<usize> {
        if let Some(open) = &self.open {
            if open.format != *format {
                tracing::debug!(
                    "PCM format changed ({} Hz/{}ch -> {} Hz/{}ch), reopening device",
                    open.format.sample_rate,
                    open.format.channels,
                    format.sample_rate,
                    format.channels
                );
                self.flush();
                self.close();
            }
        }
        if self.open.is_none() {
            self.open = Some(Self::open(format)?);
        }
        let open = self.open.as_mut().unwrap();

        let channels = format.channels as usize;
        let offered = data.len() / format.frame_size();
        let frames = (open.producer.slots() / channels).min(offered);
        if frames == 0 {
            return Ok(0);
        }

        let samples = frames * channels;
        let chunk = open
            .producer
            .write_chunk_uninit(samples)
            .map_err(|e| Error::Output(format!("ring write: {}", e)))?;
        chunk.fill_from_iter(
            data[..samples * 2]
                .chunks_exact(2)
                .map(|b| i16::from_ne_bytes([b[0], b[1]])),
        );
        Ok(frames)
    }

    fn flush(&mut self) {
        if let Some(open) = &self.open {
            open.discard.store(true, Ordering::Release);
        }
    }

    fn close(&mut self) {
        if self.open.take().is_some() {
            tracing::debug!("closed audio device");
        }
    }
}
