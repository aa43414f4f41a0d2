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

/// Gain applied at the moment a voice starts.
pub const PEAK_GAIN: f64 = 0.6;

/// Gain the decay settles on.
pub const FLOOR_GAIN: f64 = 0.001;

/// Seconds from the start of a voice until the decay reaches the floor.
pub const DECAY_SECONDS: f64 = 0.8;

/// Seconds from the start of a voice until it stops, a tenth of a second after
/// the floor is reached.
pub const VOICE_SECONDS: f64 = 0.9;

/// A fixed percussive envelope: jump to the peak, then decay exponentially to
/// the floor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    /// Context time the envelope is anchored at.
    start: f64,
    /// Context time the floor is reached.
    floor_at: f64,
}

impl Envelope {
    /// Creates the envelope anchored at the given context time.
    pub fn anchored(now: f64) -> Envelope {
        Envelope {
            start: now,
            floor_at: now + DECAY_SECONDS,
        }
    }

    /// The time the envelope starts.
    pub fn start(&self) -> f64 {
        self.start
    }

    /// The time the decay reaches the floor.
    pub fn floor_at(&self) -> f64 {
        self.floor_at
    }

    /// The gain at the given context time.
    pub fn gain_at(&self, time: f64) -> f32 {
        if time < self.start {
            return 0.0;
        }
        if time >= self.floor_at {
            return FLOOR_GAIN as f32;
        }

        let progress = (time - self.start) / (self.floor_at - self.start);
        (PEAK_GAIN * (FLOOR_GAIN / PEAK_GAIN).powf(progress)) as f32
    }
}
