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

//! A single triggered playback of the sample.

use std::sync::atomic::{AtomicU64, Ordering};

use super::envelope::{Envelope, VOICE_SECONDS};
use crate::decode::Sample;

/// Global voice ID counter.
static NEXT_VOICE_ID: AtomicU64 = AtomicU64::new(1);

/// One independent playback of the sample at a fixed rate with its own
/// envelope. Voices are never modified after they're created.
#[derive(Clone)]
pub struct Voice {
    /// Unique ID for this voice.
    id: u64,
    /// The shared sample data.
    sample: Sample,
    /// Playback rate multiplier relative to the sample's native pitch.
    playback_rate: f64,
    /// The gain envelope.
    envelope: Envelope,
    /// Context time the voice starts.
    start_at: f64,
    /// Context time the voice stops.
    stop_at: f64,
}

/// A snapshot of a voice's schedule, returned to callers that trigger voices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceInfo {
    pub id: u64,
    pub playback_rate: f64,
    pub start_at: f64,
    pub floor_at: f64,
    pub stop_at: f64,
}

impl Voice {
    /// Creates a voice that starts at `now` and stops on its own.
    pub fn new(sample: Sample, playback_rate: f64, now: f64) -> Voice {
        Voice {
            id: NEXT_VOICE_ID.fetch_add(1, Ordering::Relaxed),
            sample,
            playback_rate,
            envelope: Envelope::anchored(now),
            start_at: now,
            stop_at: now + VOICE_SECONDS,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn start_at(&self) -> f64 {
        self.start_at
    }

    pub fn stop_at(&self) -> f64 {
        self.stop_at
    }

    /// Returns true if the voice produces sound at the given context time.
    pub fn is_sounding_at(&self, time: f64) -> bool {
        time >= self.start_at && time < self.stop_at
    }

    /// Renders the voice's value for one output channel at the given context time.
    pub fn value_at(&self, time: f64, channel: usize) -> f32 {
        if !self.is_sounding_at(time) {
            return 0.0;
        }
        let elapsed = time - self.start_at;
        let position = elapsed * self.sample.sample_rate() as f64 * self.playback_rate;
        self.sample.value_at(position, channel) * self.envelope.gain_at(time)
    }

    /// Returns the voice's schedule.
    pub fn info(&self) -> VoiceInfo {
        VoiceInfo {
            id: self.id,
            playback_rate: self.playback_rate,
            start_at: self.start_at,
            floor_at: self.envelope.floor_at(),
            stop_at: self.stop_at,
        }
    }
}

impl std::fmt::Debug for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Voice")
            .field("id", &self.id)
            .field("playback_rate", &self.playback_rate)
            .field("start_at", &self.start_at)
            .field("stop_at", &self.stop_at)
            .finish()
    }
}
