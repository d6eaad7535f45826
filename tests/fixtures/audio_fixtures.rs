//! Audio Test Fixtures
//!
//! Programmatically generated audio so tests need no checked-in files.
//!
//! - Student speech: 16kHz mono WAV files written with `hound`
//! - Teacher speech: 24kHz 16-bit little-endian PCM, base64 encoded as the
//!   live agent sends it

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use std::f32::consts::PI;
use std::path::Path;

/// Capture rate (16kHz)
pub const CAPTURE_RATE: u32 = 16000;

/// Agent speech rate (24kHz)
pub const PLAYBACK_RATE: u32 = 24000;

/// Generate a sine wave tone at `sample_rate`
pub fn generate_sine_wave(
    duration_samples: usize,
    frequency: f32,
    amplitude: f32,
    sample_rate: u32,
) -> Vec<i16> {
    let max_amplitude = amplitude * i16::MAX as f32;
    let angular_freq = 2.0 * PI * frequency / sample_rate as f32;

    (0..duration_samples)
        .map(|i| ((angular_freq * i as f32).sin() * max_amplitude) as i16)
        .collect()
}

/// Speech-like pattern: a tone whose amplitude rises and falls like syllables
pub fn generate_speech_pattern(duration_samples: usize, sample_rate: u32) -> Vec<i16> {
    let syllable = (sample_rate / 5) as usize;
    generate_sine_wave(duration_samples, 220.0, 0.5, sample_rate)
        .into_iter()
        .enumerate()
        .map(|(i, s)| {
            let phase = (i % syllable) as f32 / syllable as f32;
            (s as f32 * (PI * phase).sin()) as i16
        })
        .collect()
}

/// Convert i16 samples to little-endian bytes
pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Write a mono 16-bit WAV file
pub fn write_wav(path: &Path, samples: &[i16], sample_rate: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for &sample in samples {
        writer.write_sample(sample).unwrap();
    }
    writer.finalize().unwrap();
}

/// Write `duration_ms` of student speech as a 16kHz WAV file
pub fn write_student_wav(path: &Path, duration_ms: u32) {
    let samples = (CAPTURE_RATE * duration_ms / 1000) as usize;
    write_wav(path, &generate_speech_pattern(samples, CAPTURE_RATE), CAPTURE_RATE);
}

/// `duration_ms` of teacher speech as the agent's base64 payload
pub fn teacher_speech_base64(duration_ms: u32) -> String {
    let samples = (PLAYBACK_RATE * duration_ms / 1000) as usize;
    BASE64_STANDARD.encode(samples_to_bytes(&generate_speech_pattern(
        samples,
        PLAYBACK_RATE,
    )))
}
