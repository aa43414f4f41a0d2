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
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use futures_util::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;
use tracing::info;

use super::{ContextProvider, ContextState, OutputContext, Voice};
use crate::error::EngineError;

pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// A mock output context. Doesn't actually play anything; it records the
/// voices it's given and has a clock that only moves when told to.
pub struct Context {
    name: String,
    sample_rate: u32,
    state: Mutex<ContextState>,
    time: Mutex<f64>,
    voices: Mutex<Vec<Voice>>,
    resume_count: AtomicUsize,
    fail_triggers: AtomicBool,
}

impl Context {
    /// Creates a running mock context with its clock at zero.
    pub fn new(name: &str, sample_rate: u32) -> Context {
        Context {
            name: name.to_string(),
            sample_rate,
            state: Mutex::new(ContextState::Running),
            time: Mutex::new(0.0),
            voices: Mutex::new(Vec::new()),
            resume_count: AtomicUsize::new(0),
            fail_triggers: AtomicBool::new(false),
        }
    }

    /// Sets the clock.
    pub fn set_time(&self, time: f64) {
        *self.time.lock() = time;
    }

    /// Moves the clock forward.
    pub fn advance(&self, seconds: f64) {
        *self.time.lock() += seconds;
    }

    /// Returns every voice started on this context.
    pub fn voices(&self) -> Vec<Voice> {
        self.voices.lock().clone()
    }

    /// Returns the voices that sound at the given time.
    pub fn sounding_at(&self, time: f64) -> Vec<Voice> {
        self.voices
            .lock()
            .iter()
            .filter(|voice| voice.is_sounding_at(time))
            .cloned()
            .collect()
    }

    /// Returns how many times resume found the context suspended.
    pub fn resume_count(&self) -> usize {
        self.resume_count.load(Ordering::Relaxed)
    }

    /// Makes start_voice fail until cleared.
    pub fn set_fail_triggers(&self, fail: bool) {
        self.fail_triggers.store(fail, Ordering::Relaxed);
    }
}

impl OutputContext for Context {
    fn state(&self) -> ContextState {
        *self.state.lock()
    }

    fn resume(&self) -> BoxFuture<'static, Result<(), EngineError>> {
        let mut state = self.state.lock();
        if *state == ContextState::Suspended {
            *state = ContextState::Running;
            self.resume_count.fetch_add(1, Ordering::Relaxed);
            info!(context = self.name, "Mock context resumed");
        }
        future::ready(Ok(())).boxed()
    }

    fn suspend(&self) -> Result<(), EngineError> {
        *self.state.lock() = ContextState::Suspended;
        Ok(())
    }

    fn current_time(&self) -> f64 {
        *self.time.lock()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start_voice(&self, voice: Voice) -> Result<(), EngineError> {
        if self.fail_triggers.load(Ordering::Relaxed) {
            return Err(EngineError::TriggerFailure(
                "mock context rejected voice".to_string(),
            ));
        }
        info!(
            context = self.name,
            voice = voice.id(),
            rate = voice.playback_rate(),
            start = voice.start_at(),
            "Mock voice started"
        );
        self.voices.lock().push(voice);
        Ok(())
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

/// Hands out a single shared mock context, optionally failing first.
pub struct Provider {
    context: Arc<Context>,
    created: AtomicUsize,
    failures_remaining: AtomicUsize,
    unsupported: bool,
}

impl Provider {
    /// Creates a provider that always succeeds.
    pub fn new(context: Arc<Context>) -> Provider {
        Provider {
            context,
            created: AtomicUsize::new(0),
            failures_remaining: AtomicUsize::new(0),
            unsupported: false,
        }
    }

    /// Creates a provider for a platform without audio output.
    pub fn unsupported(context: Arc<Context>) -> Provider {
        Provider {
            unsupported: true,
            ..Provider::new(context)
        }
    }

    /// Creates a provider whose first `failures` creations fail.
    pub fn failing(context: Arc<Context>, failures: usize) -> Provider {
        Provider {
            failures_remaining: AtomicUsize::new(failures),
            ..Provider::new(context)
        }
    }

    /// Returns how many times create was called.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Returns the mock context.
    pub fn context(&self) -> Arc<Context> {
        self.context.clone()
    }
}

impl ContextProvider for Provider {
    fn create(&self) -> Result<Arc<dyn OutputContext>, EngineError> {
        self.created.fetch_add(1, Ordering::Relaxed);
        if self.unsupported {
            return Err(EngineError::PlatformUnsupported(
                "mock platform has no audio output".to_string(),
            ));
        }
        let failed = self
            .failures_remaining
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(EngineError::ContextFailure(
                "mock context creation failed".to_string(),
            ));
        }
        Ok(self.context.clone())
    }
}
