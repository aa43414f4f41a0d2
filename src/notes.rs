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

//! Note names, the pitch table and the computer keyboard mapping.

use std::{fmt, str::FromStr};

use rand::Rng;

/// The playback rate used for tokens that aren't in the pitch table.
pub const DEFAULT_PLAYBACK_RATE: f64 = 1.0;

/// Computer keyboard keys mapped onto one octave of the scale.
const KEY_MAP: [(char, NoteName); 8] = [
    ('a', NoteName::C),
    ('s', NoteName::D),
    ('d', NoteName::E),
    ('f', NoteName::F),
    ('g', NoteName::G),
    ('h', NoteName::A),
    ('j', NoteName::B),
    ('k', NoteName::C2),
];

/// One octave of a major scale. C2 is the tonic an octave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteName {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
    C2,
}

#[derive(Debug, PartialEq, thiserror::Error)]
#[error("unknown note '{0}'")]
pub struct UnknownNote(String);

impl NoteName {
    /// All notes in scale order.
    pub const ALL: [NoteName; 8] = [
        NoteName::C,
        NoteName::D,
        NoteName::E,
        NoteName::F,
        NoteName::G,
        NoteName::A,
        NoteName::B,
        NoteName::C2,
    ];

    /// The playback rate multiplier relative to the sample's recorded pitch.
    /// These are fixed approximations of the scale ratios, not 2^(n/12).
    pub fn playback_rate(self) -> f64 {
        match self {
            NoteName::C => 1.0,
            NoteName::D => 1.122,
            NoteName::E => 1.26,
            NoteName::F => 1.335,
            NoteName::G => 1.498,
            NoteName::A => 1.682,
            NoteName::B => 1.888,
            NoteName::C2 => 2.0,
        }
    }

    /// The token used for this note.
    pub fn as_str(self) -> &'static str {
        match self {
            NoteName::C => "C",
            NoteName::D => "D",
            NoteName::E => "E",
            NoteName::F => "F",
            NoteName::G => "G",
            NoteName::A => "A",
            NoteName::B => "B",
            NoteName::C2 => "C2",
        }
    }

    /// Picks a note uniformly from the scale.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> NoteName {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    /// Returns the computer keyboard key that plays this note.
    pub fn key(self) -> char {
        KEY_MAP
            .iter()
            .find(|(_, note)| *note == self)
            .map(|(key, _)| *key)
            .unwrap_or('?')
    }
}

impl FromStr for NoteName {
    type Err = UnknownNote;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|note| note.as_str() == s)
            .ok_or_else(|| UnknownNote(s.to_string()))
    }
}

impl fmt::Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolves a note token to a playback rate. Unknown tokens play at the
/// sample's native pitch.
pub fn resolve_rate(token: &str) -> f64 {
    token
        .parse::<NoteName>()
        .map(NoteName::playback_rate)
        .unwrap_or(DEFAULT_PLAYBACK_RATE)
}

/// Maps a computer keyboard key to a note, ignoring case.
pub fn note_for_key(key: char) -> Option<NoteName> {
    let key = key.to_ascii_lowercase();
    KEY_MAP
        .iter()
        .find(|(mapped, _)| *mapped == key)
        .map(|(_, note)| *note)
}
