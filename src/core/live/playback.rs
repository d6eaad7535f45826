//! Gapless playback scheduling for inbound speech.
//!
//! Chunks arrive faster than real time. Each decoded chunk is scheduled on
//! the output clock at `max(next_start_time, now)` and `next_start_time`
//! advances by the chunk's duration, so consecutive chunks play back to back
//! without overlap and late chunks start immediately.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::base::{EncodedAudio, LiveError, LiveResult};

/// Invoked by the output backend once a scheduled buffer finishes playing.
pub type PlaybackEndedCallback = Box<dyn FnOnce() + Send + 'static>;

/// Handle to one buffer scheduled on an [`AudioOutput`].
pub trait ScheduledPlayback: Send {
    /// Stop playback immediately. Calling it on a finished buffer is harmless.
    fn stop(&self);
}

/// Monotonic audio clock plus a way to schedule buffers against it.
pub trait AudioOutput: Send + Sync {
    /// Sample rate the output renders at.
    fn sample_rate(&self) -> u32;

    /// Current position of the output clock, in seconds.
    fn current_time(&self) -> f64;

    /// Schedule `buffer` to start at `start_time` on the output clock.
    fn schedule(
        &self,
        buffer: PcmBuffer,
        start_time: f64,
        on_ended: PlaybackEndedCallback,
    ) -> LiveResult<Box<dyn ScheduledPlayback>>;
}

/// Decoded mono audio ready for the output.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PcmBuffer {
    /// Playback length in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decode a base64 PCM16 LE chunk into normalized samples.
pub fn decode_chunk(chunk: &EncodedAudio, sample_rate: u32) -> LiveResult<PcmBuffer> {
    let bytes = BASE64_STANDARD
        .decode(chunk.data.as_bytes())
        .map_err(|e| LiveError::DecodeFailed(format!("invalid base64: {}", e)))?;

    if bytes.is_empty() {
        return Err(LiveError::DecodeFailed("empty audio chunk".to_string()));
    }
    if bytes.len() % 2 != 0 {
        return Err(LiveError::DecodeFailed(format!(
            "odd byte count {} for 16-bit PCM",
            bytes.len()
        )));
    }

    let samples = bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / 32768.0)
        .collect();

    Ok(PcmBuffer {
        samples,
        sample_rate,
    })
}

/// Placement of one scheduled chunk on the output clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledEntry {
    pub id: u64,
    pub start_time: f64,
    pub duration: f64,
}

#[derive(Default)]
struct LiveSet {
    entries: HashMap<u64, Box<dyn ScheduledPlayback>>,
    // Completions that fired before the entry was registered
    ended_early: HashSet<u64>,
    // Set by halt_all; nothing is scheduled or tracked afterwards
    halted: bool,
}

/// Schedules decoded chunks back to back and tracks what is still sounding.
pub struct PlaybackScheduler {
    output: Arc<dyn AudioOutput>,
    next_start_time: f64,
    next_id: u64,
    live: Arc<Mutex<LiveSet>>,
}

impl PlaybackScheduler {
    /// Create a scheduler seeded at the output's current time.
    pub fn new(output: Arc<dyn AudioOutput>) -> Self {
        let next_start_time = output.current_time();
        Self {
            output,
            next_start_time,
            next_id: 0,
            live: Arc::new(Mutex::new(LiveSet::default())),
        }
    }

    /// Earliest time the next chunk may start.
    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    /// Number of buffers scheduled and not yet finished.
    pub fn active_count(&self) -> usize {
        self.live.lock().entries.len()
    }

    pub fn is_halted(&self) -> bool {
        self.live.lock().halted
    }

    /// Decode and schedule one inbound chunk.
    ///
    /// On failure nothing is scheduled and `next_start_time` is unchanged.
    pub fn enqueue(&mut self, chunk: &EncodedAudio) -> LiveResult<ScheduledEntry> {
        let buffer = decode_chunk(chunk, self.output.sample_rate())?;
        self.schedule_buffer(buffer)
    }

    /// Schedule an already decoded buffer.
    ///
    /// Fails once the scheduler has been halted.
    pub fn schedule_buffer(&mut self, buffer: PcmBuffer) -> LiveResult<ScheduledEntry> {
        if self.live.lock().halted {
            return Err(LiveError::Playback("playback has been halted".to_string()));
        }

        let now = self.output.current_time();
        let start_time = self.next_start_time.max(now);
        let duration = buffer.duration();

        let id = self.next_id;
        self.next_id += 1;

        let live = Arc::downgrade(&self.live);
        let on_ended: PlaybackEndedCallback = Box::new(move || {
            if let Some(live) = live.upgrade() {
                let mut set = live.lock();
                if set.entries.remove(&id).is_none() && !set.halted {
                    set.ended_early.insert(id);
                }
            }
        });

        let handle = self.output.schedule(buffer, start_time, on_ended)?;
        {
            let mut set = self.live.lock();
            if !set.ended_early.remove(&id) {
                set.entries.insert(id, handle);
            }
        }

        self.next_start_time = start_time + duration;
        trace!(
            "Scheduled chunk {} at {:.3}s for {:.3}s (now {:.3}s)",
            id, start_time, duration, now
        );

        Ok(ScheduledEntry {
            id,
            start_time,
            duration,
        })
    }

    /// Stop everything still playing and forget it. Returns how many were
    /// stopped.
    ///
    /// The scheduler stays halted: later chunks are rejected.
    pub fn halt_all(&mut self) -> usize {
        let handles: Vec<Box<dyn ScheduledPlayback>> = {
            let mut set = self.live.lock();
            set.halted = true;
            set.ended_early.clear();
            set.entries.drain().map(|(_, handle)| handle).collect()
        };

        // Backends may fire completion from stop(); the lock is released first.
        for handle in &handles {
            handle.stop();
        }

        if !handles.is_empty() {
            debug!("Halted {} playing buffers", handles.len());
        }
        handles.len()
    }
}
