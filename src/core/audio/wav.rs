//! WAV file audio backends.
//!
//! [`WavFileInput`] plays a recorded utterance into the capture pipeline in
//! real time, and [`WavRecorderOutput`] renders the scheduled playback
//! timeline to a WAV file. Together they let a full conversation run without
//! a sound card.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::core::live::{
    AudioInput, AudioOutput, AudioSource, LiveError, LiveResult, PLAYBACK_SAMPLE_RATE, PcmBuffer,
    PlaybackEndedCallback, ScheduledPlayback,
};

/// Read a WAV file as mono f32 samples at `target_rate`.
///
/// Channels are averaged and the signal is linearly resampled.
pub fn read_wav_mono(path: &Path, target_rate: u32) -> LiveResult<Vec<f32>> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| LiveError::DeviceUnavailable(format!("{}: {}", path.display(), e)))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| LiveError::DeviceUnavailable(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| LiveError::DeviceUnavailable(e.to_string()))?
        }
    };

    let mono = downmix(&interleaved, spec.channels as usize);
    debug!(
        "Loaded {} ({} Hz, {} ch, {} frames)",
        path.display(),
        spec.sample_rate,
        spec.channels,
        mono.len()
    );
    Ok(resample_linear(&mono, spec.sample_rate, target_rate))
}

/// Average interleaved channels into one.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Linear-interpolation resampler.
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).round() as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos.floor() as usize;
            if idx >= last {
                return samples[last];
            }
            let frac = (pos - idx as f64) as f32;
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        })
        .collect()
}

/// Write mono f32 samples as 16-bit PCM WAV.
pub fn write_wav_mono(path: &Path, samples: &[f32], sample_rate: u32) -> LiveResult<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| LiveError::Playback(format!("{}: {}", path.display(), e)))?;
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(value)
            .map_err(|e| LiveError::Playback(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| LiveError::Playback(e.to_string()))
}

// =============================================================================
// Input
// =============================================================================

/// Capture input backed by a WAV file.
#[derive(Debug, Clone)]
pub struct WavFileInput {
    path: PathBuf,
    paced: bool,
}

impl WavFileInput {
    /// Blocks are released at the rate a microphone would produce them.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            paced: true,
        }
    }

    /// Release blocks as fast as they are consumed.
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AudioInput for WavFileInput {
    fn open(&self, sample_rate: u32, block_size: usize) -> LiveResult<Box<dyn AudioSource>> {
        if block_size == 0 {
            return Err(LiveError::InvalidConfiguration(
                "block size must be positive".to_string(),
            ));
        }
        let samples = read_wav_mono(&self.path, sample_rate)?;
        info!(
            "Capturing from {} ({:.1}s)",
            self.path.display(),
            samples.len() as f64 / sample_rate as f64
        );

        let period = self
            .paced
            .then(|| Duration::from_secs_f64(block_size as f64 / sample_rate as f64));

        Ok(Box::new(WavFileSource {
            samples,
            position: 0,
            block_size,
            period,
            interval: None,
        }))
    }
}

struct WavFileSource {
    samples: Vec<f32>,
    position: usize,
    block_size: usize,
    period: Option<Duration>,
    interval: Option<Interval>,
}

#[async_trait]
impl AudioSource for WavFileSource {
    async fn next_block(&mut self) -> Option<Vec<f32>> {
        if self.position >= self.samples.len() {
            return None;
        }

        if let Some(period) = self.period {
            let interval = self.interval.get_or_insert_with(|| {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                interval
            });
            interval.tick().await;
        }

        let end = (self.position + self.block_size).min(self.samples.len());
        let mut block = self.samples[self.position..end].to_vec();
        block.resize(self.block_size, 0.0);
        self.position = end;
        Some(block)
    }
}

// =============================================================================
// Output
// =============================================================================

/// One buffer on the recorded timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSegment {
    pub start_time: f64,
    pub duration: f64,
    /// Clock time at which the buffer was stopped early
    pub halted_at: Option<f64>,
}

struct Segment {
    start_time: f64,
    samples: Arc<Vec<f32>>,
    halted_at: Option<f64>,
}

struct RecorderInner {
    epoch: Instant,
    sample_rate: u32,
    segments: Mutex<Vec<Segment>>,
}

impl RecorderInner {
    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

/// Playback output that records the timeline instead of sounding it.
///
/// The clock is wall time since creation. Completion callbacks fire when a
/// buffer's scheduled end passes.
#[derive(Clone)]
pub struct WavRecorderOutput {
    inner: Arc<RecorderInner>,
}

impl Default for WavRecorderOutput {
    fn default() -> Self {
        Self::new(PLAYBACK_SAMPLE_RATE)
    }
}

impl WavRecorderOutput {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            inner: Arc::new(RecorderInner {
                epoch: Instant::now(),
                sample_rate,
                segments: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Every buffer scheduled so far, in scheduling order.
    pub fn timeline(&self) -> Vec<RecordedSegment> {
        let rate = self.inner.sample_rate as f64;
        self.inner
            .segments
            .lock()
            .iter()
            .map(|s| RecordedSegment {
                start_time: s.start_time,
                duration: s.samples.len() as f64 / rate,
                halted_at: s.halted_at,
            })
            .collect()
    }

    /// Mix the timeline into one signal starting at clock zero.
    ///
    /// Halted buffers are cut at the moment they were stopped.
    pub fn render(&self) -> Vec<f32> {
        let rate = self.inner.sample_rate as f64;
        let segments = self.inner.segments.lock();

        let total = segments
            .iter()
            .map(|s| (s.start_time * rate).round() as usize + audible_len(s, rate))
            .max()
            .unwrap_or(0);

        let mut mix = vec![0.0f32; total];
        for segment in segments.iter() {
            let offset = (segment.start_time * rate).round() as usize;
            let len = audible_len(segment, rate);
            for (i, &sample) in segment.samples[..len].iter().enumerate() {
                mix[offset + i] += sample;
            }
        }
        mix
    }

    /// Render the timeline to a 16-bit WAV file.
    pub fn write_wav(&self, path: &Path) -> LiveResult<()> {
        let mix = self.render();
        write_wav_mono(path, &mix, self.inner.sample_rate)?;
        info!(
            "Wrote {:.1}s of agent audio to {}",
            mix.len() as f64 / self.inner.sample_rate as f64,
            path.display()
        );
        Ok(())
    }
}

fn audible_len(segment: &Segment, rate: f64) -> usize {
    match segment.halted_at {
        Some(halted) if halted <= segment.start_time => 0,
        Some(halted) => {
            let played = ((halted - segment.start_time) * rate).round() as usize;
            played.min(segment.samples.len())
        }
        None => segment.samples.len(),
    }
}

impl AudioOutput for WavRecorderOutput {
    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.inner.now()
    }

    fn schedule(
        &self,
        buffer: PcmBuffer,
        start_time: f64,
        on_ended: PlaybackEndedCallback,
    ) -> LiveResult<Box<dyn ScheduledPlayback>> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| LiveError::Playback(e.to_string()))?;

        let end_time = start_time + buffer.duration();
        let index = {
            let mut segments = self.inner.segments.lock();
            segments.push(Segment {
                start_time,
                samples: Arc::new(buffer.samples),
                halted_at: None,
            });
            segments.len() - 1
        };

        let delay = (end_time - self.inner.now()).max(0.0);
        let timer = runtime.spawn(async move {
            tokio::time::sleep(Duration::from_secs_f64(delay)).await;
            on_ended();
        });

        Ok(Box::new(RecordedPlayback {
            inner: self.inner.clone(),
            index,
            timer,
        }))
    }
}

struct RecordedPlayback {
    inner: Arc<RecorderInner>,
    index: usize,
    timer: JoinHandle<()>,
}

impl ScheduledPlayback for RecordedPlayback {
    fn stop(&self) {
        if self.timer.is_finished() {
            return;
        }
        self.timer.abort();
        let now = self.inner.now();
        if let Some(segment) = self.inner.segments.lock().get_mut(self.index) {
            segment.halted_at.get_or_insert(now);
        }
    }
}
