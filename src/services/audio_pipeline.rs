//! Bounded producer/consumer ring of PCM buffers.
//!
//! The catalog's delivery callback is the producer; one consumer thread
//! drains full buffers into the output sink. Backpressure is by refusal:
//! with no free buffer, `deliver` returns 0 and the library retries later.
//! Buffers and the consumer thread come into existence at the first
//! non-empty delivery and live for the rest of the process.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::BytesMut;

use crate::services::catalog::PcmFormat;
use crate::services::output::{OutputSink, SinkFactory};

pub const BUFFER_COUNT: usize = 16;
pub const BUFFER_CAPACITY_BYTES: usize = 8192;

/// With no delivery for this long the consumer releases the device.
const IDLE_CLOSE: Duration = Duration::from_secs(5);

struct FrameBuffer {
    data: BytesMut,
    frames: usize,
    format: PcmFormat,
}

impl FrameBuffer {
    fn new() -> Self {
        FrameBuffer {
            data: BytesMut::with_capacity(BUFFER_CAPACITY_BYTES),
            frames: 0,
            format: PcmFormat::stereo_44100(),
        }
    }
}

struct Ring {
    free: VecDeque<FrameBuffer>,
    full: VecDeque<FrameBuffer>,
    playing: bool,
    stutters: u32,
    /// Set on pause-flush; the consumer forwards it to the sink.
    flush_sink: bool,
    shutdown: bool,
    last_format: Option<PcmFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    pub queued_frames: usize,
    /// Underflows since the previous call; reading resets the counter.
    pub stutters: u32,
}

pub struct AudioPipeline {
    ring: Mutex<Ring>,
    cond: Condvar,
    factory: Mutex<Option<SinkFactory>>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl AudioPipeline {
    pub fn new(factory: SinkFactory) -> Arc<Self> {
        Arc::new(AudioPipeline {
            ring: Mutex::new(Ring {
                free: VecDeque::new(),
                full: VecDeque::new(),
                playing: false,
                stutters: 0,
                flush_sink: false,
                shutdown: false,
                last_format: None,
            }),
            cond: Condvar::new(),
            factory: Mutex::new(Some(factory)),
            consumer: Mutex::new(None),
        })
    }

    /// Producer entry point, called from the catalog's delivery callback.
    /// Returns the number of frames copied out of `data`; 0 when saturated
    /// or when `num_frames == 0` (pause: every queued buffer is recycled and
    /// the sink is told to drop what it holds).
    pub fn deliver(self: &Arc<Self>, format: &PcmFormat, data: &[u8], num_frames: usize) -> usize {
        if num_frames == 0 {
            let mut ring = self.ring.lock().unwrap();
            ring.playing = false;
            while let Some(buf) = ring.full.pop_front() {
                ring.free.push_back(buf);
            }
            ring.flush_sink = true;
            self.cond.notify_all();
            return 0;
        }

        self.ensure_started();

        let mut ring = self.ring.lock().unwrap();
        ring.playing = true;

        if let Some(last) = ring.last_format {
            if last != *format {
                tracing::debug!(
                    "delivery format changed: {} Hz/{}ch -> {} Hz/{}ch",
                    last.sample_rate,
                    last.channels,
                    format.sample_rate,
                    format.channels
                );
            }
        }
        ring.last_format = Some(*format);

        let Some(mut buf) = ring.free.pop_front() else {
            return 0;
        };

        let frame_size = format.frame_size();
        let frames = (BUFFER_CAPACITY_BYTES / frame_size).min(num_frames);
        let size = frames * frame_size;
        buf.data.clear();
        buf.data.extend_from_slice(&data[..size]);
        buf.frames = frames;
        buf.format = *format;

        ring.full.push_back(buf);
        self.cond.notify_all();
        frames
    }

    pub fn stats(&self) -> PipelineStats {
        let mut ring = self.ring.lock().unwrap();
        let queued_frames = ring.full.iter().map(|b| b.frames).sum();
        let stutters = ring.stutters;
        ring.stutters = 0;
        if stutters > 0 {
            tracing::debug!(
                "audio stats: queued {} frames, {} stutters",
                queued_frames,
                stutters
            );
        }
        PipelineStats {
            queued_frames,
            stutters,
        }
    }

    /// Stop the consumer and wait for it to exit. Queued audio is dropped.
    pub fn shutdown(&self) {
        {
            let mut ring = self.ring.lock().unwrap();
            ring.shutdown = true;
            self.cond.notify_all();
        }
        if let Some(handle) = self.consumer.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    /// Allocate the buffer ring and spawn the consumer on first use.
    fn ensure_started(self: &Arc<Self>) {
        let mut consumer = self.consumer.lock().unwrap();
        if consumer.is_some() {
            return;
        }
        let factory = self
            .factory
            .lock()
            .unwrap()
            .take()
            .expect("pipeline restarted after shutdown");

        {
            let mut ring = self.ring.lock().unwrap();
            for _ in 0..BUFFER_COUNT {
                ring.free.push_back(FrameBuffer::new());
            }
        }

        let pipeline = self.clone();
        let handle = std::thread::Builder::new()
            .name("audio-consumer".to_string())
            .spawn(move || pipeline.consumer_loop(factory))
            .expect("spawn audio consumer");
        *consumer = Some(handle);
    }

    fn consumer_loop(self: Arc<Self>, factory: SinkFactory) {
        let mut sink = factory();
        let mut ring = self.ring.lock().unwrap();

        loop {
            if ring.shutdown {
                break;
            }

            if ring.flush_sink {
                ring.flush_sink = false;
                drop(ring);
                sink.flush();
                ring = self.ring.lock().unwrap();
                continue;
            }

            if let Some(buf) = ring.full.pop_front() {
                drop(ring);
                self.write_out(sink.as_mut(), &buf);
                ring = self.ring.lock().unwrap();
                ring.free.push_back(buf);
                continue;
            }

            // Starved. While the transport believes it is playing, that is
            // an underflow worth counting.
            if ring.playing {
                ring.stutters += 1;
            }

            let (guard, timeout) = self.cond.wait_timeout(ring, IDLE_CLOSE).unwrap();
            ring = guard;
            if timeout.timed_out() && ring.full.is_empty() && !ring.shutdown {
                // Playback has likely stopped for good; release the device
                // and sleep until the next delivery.
                drop(ring);
                sink.close();
                ring = self.ring.lock().unwrap();
                while ring.full.is_empty() && !ring.shutdown && !ring.flush_sink {
                    ring = self.cond.wait(ring).unwrap();
                }
            }
        }

        drop(ring);
        sink.close();
        tracing::debug!("audio consumer thread exiting");
    }

    /// Write one buffer to the sink, re-offering the remainder after short
    /// writes until it is fully consumed or shutdown is requested.
    fn write_out(&self, sink: &mut dyn OutputSink, buf: &FrameBuffer) {
        let frame_size = buf.format.frame_size();
        let mut offset = 0;
        while offset < buf.frames * frame_size {
            match sink.write(&buf.data[offset..buf.frames * frame_size], &buf.format) {
                Ok(0) => {
                    if self.ring.lock().unwrap().shutdown {
                        return;
                    }
                    std::thread::sleep(Duration::from_millis(2));
                }
                Ok(n) => offset += n * frame_size,
                Err(e) => {
                    tracing::warn!("output sink write failed, dropping buffer: {}", e);
                    return;
                }
            }
        }
    }
}
