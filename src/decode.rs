// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Decoding raw asset bytes into a playable in-memory sample.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, info};

use crate::error::EngineError;

/// A decoded sample. The audio data sits behind an Arc so every voice can
/// share it without copying.
#[derive(Clone)]
pub struct Sample {
    /// Interleaved f32 samples.
    data: Arc<Vec<f32>>,
    /// Number of channels.
    channel_count: u16,
    /// Sample rate of the data.
    sample_rate: u32,
}

impl Sample {
    /// Creates a new sample from interleaved data.
    pub fn new(data: Vec<f32>, channel_count: u16, sample_rate: u32) -> Sample {
        Sample {
            data: Arc::new(data),
            channel_count: channel_count.max(1),
            sample_rate,
        }
    }

    /// Returns the number of channels.
    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    /// Returns the sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the number of frames.
    pub fn frame_count(&self) -> usize {
        self.data.len() / self.channel_count as usize
    }

    /// Returns the duration at the native playback rate.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_count() as f64 / self.sample_rate as f64)
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }

    /// Reads one channel at a fractional frame position with linear
    /// interpolation. Positions outside the data are silent.
    pub fn value_at(&self, position: f64, channel: usize) -> f32 {
        let frames = self.frame_count();
        if position < 0.0 || frames == 0 {
            return 0.0;
        }

        let channels = self.channel_count as usize;
        let channel = channel % channels;
        let frame = position as usize;
        if frame >= frames {
            return 0.0;
        }

        let s0 = self.data[frame * channels + channel];
        let s1 = if frame + 1 < frames {
            self.data[(frame + 1) * channels + channel]
        } else {
            s0
        };
        let frac = (position - frame as f64) as f32;
        s0 + (s1 - s0) * frac
    }
}

impl std::fmt::Debug for Sample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sample")
            .field("channels", &self.channel_count)
            .field("sample_rate", &self.sample_rate)
            .field("frames", &self.frame_count())
            .field("memory_kb", &(self.memory_size() / 1024))
            .finish()
    }
}

/// Turns raw asset bytes into a sample.
pub trait SampleDecoder: Send + Sync {
    /// Decodes the bytes and resamples the result to the target sample rate.
    /// The bytes are consumed; callers that may need to retry must pass a copy.
    fn decode(&self, bytes: Vec<u8>, target_sample_rate: u32) -> Result<Sample, EngineError>;
}

/// Decodes MP3, WAV, FLAC and the other formats symphonia supports.
pub struct SymphoniaDecoder {
    /// File extension used to help the format probe.
    extension: Option<String>,
}

impl SymphoniaDecoder {
    /// Creates a decoder that probes the format from the bytes alone.
    pub fn new() -> SymphoniaDecoder {
        SymphoniaDecoder { extension: None }
    }

    /// Creates a decoder that uses the asset location's extension as a hint.
    pub fn for_location(location: &str) -> SymphoniaDecoder {
        SymphoniaDecoder {
            extension: Path::new(location)
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.to_lowercase()),
        }
    }

    /// Reads the next packet. EOF is reported as Ok(None).
    fn read_next_packet(
        format_reader: &mut dyn FormatReader,
    ) -> Result<Option<Packet>, SymphoniaError> {
        match format_reader.next_packet() {
            Ok(packet) => Ok(Some(packet)),
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Ok(None)
            }
            // Some readers report the end of the stream as a decode error.
            Err(SymphoniaError::DecodeError(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Default for SymphoniaDecoder {
    fn default() -> Self {
        SymphoniaDecoder::new()
    }
}

impl SampleDecoder for SymphoniaDecoder {
    fn decode(&self, bytes: Vec<u8>, target_sample_rate: u32) -> Result<Sample, EngineError> {
        let failure = |e: SymphoniaError| EngineError::DecodeFailure(e.to_string());

        let byte_len = bytes.len();
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = &self.extension {
            hint.with_extension(extension);
        }

        let probed = get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(failure)?;
        let mut format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| EngineError::DecodeFailure("no audio track found".to_string()))?;
        let track_id = track.id;
        let mut decoder = get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(failure)?;

        let mut samples: Vec<f32> = Vec::new();
        let mut channels: u16 = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(0);
        let mut source_rate = track.codec_params.sample_rate.unwrap_or(0);

        loop {
            let packet = match Self::read_next_packet(format_reader.as_mut()) {
                Ok(Some(packet)) => packet,
                Ok(None) => break,
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                Err(e) => return Err(failure(e)),
            };
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    // A corrupt packet is skipped rather than failing the whole sample.
                    debug!(error = e, "Skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(failure(e)),
            };

            let spec = *decoded.spec();
            channels = spec.channels.count() as u16;
            source_rate = spec.rate;

            let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            buffer.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buffer.samples());
        }

        if samples.is_empty() || channels == 0 || source_rate == 0 {
            return Err(EngineError::DecodeFailure(
                "no audio frames decoded".to_string(),
            ));
        }

        let samples = if source_rate != target_sample_rate {
            debug!(
                source_rate,
                target_rate = target_sample_rate,
                "Resampling sample"
            );
            resample_linear(&samples, channels, source_rate, target_sample_rate)
        } else {
            samples
        };

        let sample = Sample::new(samples, channels, target_sample_rate);
        info!(
            bytes = byte_len,
            channels,
            sample_rate = target_sample_rate,
            duration_ms = sample.duration().as_millis(),
            memory_kb = sample.memory_size() / 1024,
            "Sample decoded"
        );
        Ok(sample)
    }
}

/// Resamples interleaved audio using linear interpolation. Good enough for a
/// short one-shot pad hit.
pub fn resample_linear(
    samples: &[f32],
    channel_count: u16,
    source_rate: u32,
    target_rate: u32,
) -> Vec<f32> {
    let channels = channel_count.max(1) as usize;
    let ratio = target_rate as f64 / source_rate as f64;
    let source_frames = samples.len() / channels;
    let target_frames = (source_frames as f64 * ratio).ceil() as usize;

    let mut output = Vec::with_capacity(target_frames * channels);
    for target_frame in 0..target_frames {
        let source_pos = target_frame as f64 / ratio;
        let source_frame = source_pos.floor() as usize;
        let frac = source_pos.fract() as f32;

        for channel in 0..channels {
            let s0 = samples
                .get(source_frame * channels + channel)
                .copied()
                .unwrap_or(0.0);
            let s1 = samples
                .get((source_frame + 1) * channels + channel)
                .copied()
                .unwrap_or(s0);
            output.push(s0 + (s1 - s0) * frac);
        }
    }

    output
}
