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

/// Errors produced while loading the sample or driving the audio output.
///
/// The engine shares in-flight results between callers, so the error is `Clone`
/// and carries rendered messages rather than the underlying error values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Sample asset {location} unavailable: {reason}")]
    AssetUnavailable { location: String, reason: String },

    #[error("Audio output unsupported: {0}")]
    PlatformUnsupported(String),

    #[error("Sample decode failed: {0}")]
    DecodeFailure(String),

    #[error("Audio output context failed: {0}")]
    ContextFailure(String),

    #[error("Voice trigger failed: {0}")]
    TriggerFailure(String),

    #[error("Sample engine is not ready")]
    NotReady,
}

impl EngineError {
    /// Creates an AssetUnavailable error for the given location.
    pub fn unavailable(location: &str, reason: impl ToString) -> EngineError {
        EngineError::AssetUnavailable {
            location: location.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if retrying the failed operation can never succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(self, EngineError::PlatformUnsupported(_))
    }
}
