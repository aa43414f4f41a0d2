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
// Voice mixing that's independent of any audio backend.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::voice::Voice;

/// A frame counter shared between the renderer and whoever reads the clock.
#[derive(Clone, Default)]
pub struct Clock {
    frames: Arc<AtomicU64>,
}

impl Clock {
    pub fn new() -> Clock {
        Clock::default()
    }

    /// Returns the number of frames rendered so far.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Returns the clock time in seconds for the given sample rate.
    pub fn seconds(&self, sample_rate: u32) -> f64 {
        self.frames() as f64 / sample_rate as f64
    }

    fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::AcqRel);
    }
}

/// Sums all active voices into interleaved output frames and advances the clock.
pub struct VoiceMixer {
    /// Voices that haven't reached their stop time.
    voices: Vec<Voice>,
    /// Number of output channels.
    num_channels: u16,
    /// Output sample rate.
    sample_rate: u32,
    /// The context clock, advanced by every rendered frame.
    clock: Clock,
}

impl VoiceMixer {
    /// Creates a new mixer.
    pub fn new(num_channels: u16, sample_rate: u32, clock: Clock) -> VoiceMixer {
        VoiceMixer {
            voices: Vec::new(),
            num_channels: num_channels.max(1),
            sample_rate,
            clock,
        }
    }

    /// Adds a voice to the mix.
    pub fn add_voice(&mut self, voice: Voice) {
        self.voices.push(voice);
    }

    /// Returns the number of voices that haven't finished.
    pub fn active_count(&self) -> usize {
        self.voices.len()
    }

    /// Gets the number of output channels.
    pub fn num_channels(&self) -> u16 {
        self.num_channels
    }

    /// Gets the sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Renders into an interleaved output buffer. Any trailing partial frame is
    /// zeroed. Voices whose stop time has passed are dropped.
    pub fn process_into_output(&mut self, output: &mut [f32]) {
        output.fill(0.0);

        let channels = self.num_channels as usize;
        let frames = output.len() / channels;
        let base = self.clock.frames();
        let rate = self.sample_rate as f64;

        if !self.voices.is_empty() {
            for (frame_index, frame) in output.chunks_exact_mut(channels).enumerate() {
                let time = (base + frame_index as u64) as f64 / rate;
                for voice in self.voices.iter() {
                    if !voice.is_sounding_at(time) {
                        continue;
                    }
                    for (channel, out) in frame.iter_mut().enumerate() {
                        *out += voice.value_at(time, channel);
                    }
                }
            }
        }

        self.clock.advance(frames as u64);
        let now = self.clock.seconds(self.sample_rate);
        self.voices.retain(|voice| voice.stop_at() > now);
    }
}
