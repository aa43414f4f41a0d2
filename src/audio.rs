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
use std::{error::Error, fmt, sync::Arc};

use futures_util::future::BoxFuture;

use crate::config;
use crate::error::EngineError;

pub mod cpal;
pub mod envelope;
pub mod mixer;
pub mod mock;
pub mod voice;

pub use envelope::Envelope;
pub use voice::{Voice, VoiceInfo};

/// Whether an output context is currently producing sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Suspended,
    Running,
}

/// The handle to an audio output: its clock and its destination for voices.
pub trait OutputContext: fmt::Display + Send + Sync {
    /// Returns the current state.
    fn state(&self) -> ContextState;

    /// Resumes a suspended context. Resuming a running context is a no-op.
    fn resume(&self) -> BoxFuture<'static, Result<(), EngineError>>;

    /// Suspends the context. The clock stops while suspended.
    fn suspend(&self) -> Result<(), EngineError>;

    /// The context clock in seconds.
    fn current_time(&self) -> f64;

    /// The output sample rate.
    fn sample_rate(&self) -> u32;

    /// Hands a voice to the output. The voice plays and stops on its own schedule.
    fn start_voice(&self, voice: Voice) -> Result<(), EngineError>;
}

/// Creates output contexts. Creation is deferred until a user gesture asks for
/// sound, so the engine holds a provider rather than a context.
pub trait ContextProvider: Send + Sync {
    fn create(&self) -> Result<Arc<dyn OutputContext>, EngineError>;
}

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<String>, Box<dyn Error>> {
    cpal::list_devices()
}

/// Gets the context provider for the given audio configuration. Device names
/// starting with "mock" produce a mock context that doesn't play anything.
pub fn get_provider(config: Option<&config::Audio>) -> Arc<dyn ContextProvider> {
    let config = config.cloned().unwrap_or_default();
    if config.device().starts_with("mock") {
        return Arc::new(mock::Provider::new(Arc::new(mock::Context::new(
            config.device(),
            config.sample_rate().unwrap_or(mock::DEFAULT_SAMPLE_RATE),
        ))));
    }

    Arc::new(cpal::Provider::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_provider_from_config() {
        let provider = get_provider(Some(&config::Audio::new("mock-device")));
        let context = provider.create().unwrap();
        assert_eq!(context.to_string(), "mock-device (Mock)");
        assert_eq!(context.sample_rate(), mock::DEFAULT_SAMPLE_RATE);
        assert_eq!(context.state(), ContextState::Running);
    }
}
