//! System audio device backends using CPAL.
//!
//! CPAL streams are not `Send`, so each stream lives on a dedicated thread
//! that holds it until told to stop. Captured blocks cross into async code
//! through a bounded channel; playback is a mixer whose clock is the number
//! of frames the device has consumed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::thread;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::live::{
    AudioInput, AudioOutput, AudioSource, LiveError, LiveResult, PLAYBACK_SAMPLE_RATE, PcmBuffer,
    PlaybackEndedCallback, ScheduledPlayback,
};

/// Captured blocks waiting for the capture task. Older audio is dropped
/// beyond this.
const CAPTURE_QUEUE_DEPTH: usize = 8;

fn mono_config(sample_rate: u32) -> StreamConfig {
    StreamConfig {
        channels: 1,
        sample_rate: SampleRate(sample_rate),
        buffer_size: BufferSize::Default,
    }
}

/// Keeps a stream thread alive until dropped.
struct StreamGuard {
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        // Dropping the sender wakes the thread.
        self.stop_tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Audio stream thread panicked");
            }
        }
    }
}

/// Spawn a thread that builds a stream with `build`, plays it, and keeps it
/// until the guard is dropped.
fn spawn_stream<F>(name: &str, build: F) -> LiveResult<StreamGuard>
where
    F: FnOnce() -> LiveResult<cpal::Stream> + Send + 'static,
{
    let (ready_tx, ready_rx) = std_mpsc::channel::<LiveResult<()>>();
    let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

    let thread = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let stream = match build() {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(LiveError::DeviceUnavailable(e.to_string())));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            // Blocks until the guard drops its sender.
            let _ = stop_rx.recv();
            drop(stream);
        })
        .map_err(|e| LiveError::InternalError(e.to_string()))?;

    let guard = StreamGuard {
        stop_tx: Some(stop_tx),
        thread: Some(thread),
    };

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(guard),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(LiveError::DeviceUnavailable(
            "audio stream thread exited".to_string(),
        )),
    }
}

// =============================================================================
// Input
// =============================================================================

/// Default system microphone.
#[derive(Debug, Default, Clone)]
pub struct CpalInput;

impl CpalInput {
    pub fn new() -> Self {
        Self
    }

    /// List available input devices.
    pub fn list_devices() -> LiveResult<Vec<String>> {
        let devices = cpal::default_host()
            .input_devices()
            .map_err(|e| LiveError::DeviceUnavailable(e.to_string()))?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }
}

impl AudioInput for CpalInput {
    fn open(&self, sample_rate: u32, block_size: usize) -> LiveResult<Box<dyn AudioSource>> {
        let (block_tx, block_rx) = mpsc::channel::<Vec<f32>>(CAPTURE_QUEUE_DEPTH);

        let guard = spawn_stream("tutor-capture", move || {
            let device = cpal::default_host()
                .default_input_device()
                .ok_or_else(|| LiveError::DeviceUnavailable("No input device available".to_string()))?;
            info!(
                "Using input device: {}",
                device.name().unwrap_or_else(|_| "Unknown".to_string())
            );

            let mut pending = Vec::with_capacity(block_size);
            device
                .build_input_stream(
                    &mono_config(sample_rate),
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        for &sample in data {
                            pending.push(sample);
                            if pending.len() >= block_size {
                                let block = std::mem::replace(
                                    &mut pending,
                                    Vec::with_capacity(block_size),
                                );
                                if block_tx.try_send(block).is_err() {
                                    debug!("Capture queue full, dropping block");
                                }
                            }
                        }
                    },
                    |err| warn!("Audio input stream error: {}", err),
                    None,
                )
                .map_err(|e| LiveError::DeviceUnavailable(e.to_string()))
        })?;

        Ok(Box::new(CpalSource {
            blocks: block_rx,
            _guard: guard,
        }))
    }
}

struct CpalSource {
    blocks: mpsc::Receiver<Vec<f32>>,
    _guard: StreamGuard,
}

#[async_trait]
impl AudioSource for CpalSource {
    async fn next_block(&mut self) -> Option<Vec<f32>> {
        self.blocks.recv().await
    }
}

// =============================================================================
// Output
// =============================================================================

struct Voice {
    start_frame: u64,
    samples: Vec<f32>,
    stopped: Arc<AtomicBool>,
    on_ended: Option<PlaybackEndedCallback>,
}

#[derive(Default)]
struct Mixer {
    voices: Vec<Voice>,
}

struct OutputShared {
    sample_rate: u32,
    frames_rendered: AtomicU64,
    mixer: Mutex<Mixer>,
}

impl OutputShared {
    fn render(&self, data: &mut [f32], channels: usize) {
        let base = self.frames_rendered.load(Ordering::Acquire);
        let frames = data.len() / channels.max(1);
        data.fill(0.0);

        let finished: Vec<PlaybackEndedCallback> = {
            let mut mixer = self.mixer.lock();
            for voice in &mixer.voices {
                if voice.stopped.load(Ordering::Acquire) {
                    continue;
                }
                let voice_end = voice.start_frame + voice.samples.len() as u64;
                for frame in 0..frames {
                    let t = base + frame as u64;
                    if t < voice.start_frame || t >= voice_end {
                        continue;
                    }
                    let sample = voice.samples[(t - voice.start_frame) as usize];
                    for channel in 0..channels {
                        data[frame * channels + channel] += sample;
                    }
                }
            }

            let now = base + frames as u64;
            let mut finished = Vec::new();
            mixer.voices.retain_mut(|voice| {
                let stopped = voice.stopped.load(Ordering::Acquire);
                let done = voice.start_frame + voice.samples.len() as u64 <= now;
                if done && !stopped {
                    if let Some(callback) = voice.on_ended.take() {
                        finished.push(callback);
                    }
                }
                !(done || stopped)
            });
            finished
        };

        self.frames_rendered
            .store(base + frames as u64, Ordering::Release);
        for callback in finished {
            callback();
        }
    }
}

/// Default system speaker.
pub struct CpalOutput {
    shared: Arc<OutputShared>,
    _guard: StreamGuard,
}

impl CpalOutput {
    /// Open the default output device at the playback rate.
    pub fn open() -> LiveResult<Self> {
        Self::with_sample_rate(PLAYBACK_SAMPLE_RATE)
    }

    pub fn with_sample_rate(sample_rate: u32) -> LiveResult<Self> {
        let shared = Arc::new(OutputShared {
            sample_rate,
            frames_rendered: AtomicU64::new(0),
            mixer: Mutex::new(Mixer::default()),
        });

        let render_shared = shared.clone();
        let guard = spawn_stream("tutor-playback", move || {
            let device = cpal::default_host()
                .default_output_device()
                .ok_or_else(|| LiveError::DeviceUnavailable("No output device available".to_string()))?;
            info!(
                "Using output device: {}",
                device.name().unwrap_or_else(|_| "Unknown".to_string())
            );

            let config = mono_config(sample_rate);
            let channels = config.channels as usize;
            device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        render_shared.render(data, channels);
                    },
                    |err| warn!("Audio output stream error: {}", err),
                    None,
                )
                .map_err(|e| LiveError::DeviceUnavailable(e.to_string()))
        })?;

        Ok(Self {
            shared,
            _guard: guard,
        })
    }
}

struct VoiceHandle {
    stopped: Arc<AtomicBool>,
}

impl ScheduledPlayback for VoiceHandle {
    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.shared.frames_rendered.load(Ordering::Acquire) as f64 / self.shared.sample_rate as f64
    }

    fn schedule(
        &self,
        buffer: PcmBuffer,
        start_time: f64,
        on_ended: PlaybackEndedCallback,
    ) -> LiveResult<Box<dyn ScheduledPlayback>> {
        if buffer.sample_rate != self.shared.sample_rate {
            return Err(LiveError::Playback(format!(
                "buffer rate {} does not match output rate {}",
                buffer.sample_rate, self.shared.sample_rate
            )));
        }

        let stopped = Arc::new(AtomicBool::new(false));
        let start_frame = (start_time * self.shared.sample_rate as f64).round().max(0.0) as u64;
        self.shared.mixer.lock().voices.push(Voice {
            start_frame,
            samples: buffer.samples,
            stopped: stopped.clone(),
            on_ended: Some(on_ended),
        });

        Ok(Box::new(VoiceHandle { stopped }))
    }
}
