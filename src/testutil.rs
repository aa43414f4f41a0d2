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
    collections::VecDeque,
    error::Error,
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
    time::{Duration, SystemTime},
};

use futures_util::future::{BoxFuture, FutureExt};
use hound::{SampleFormat, WavSpec, WavWriter};
use parking_lot::Mutex;

use crate::decode::{Sample, SampleDecoder};
use crate::error::EngineError;
use crate::fetch::AssetFetcher;

/// Wait for the given predicate to return true or fail.
pub async fn eventually<F>(predicate: F, error_msg: &str)
where
    F: Fn() -> bool,
{
    let start = SystemTime::now();
    let tick = Duration::from_millis(10);
    let timeout = Duration::from_secs(3);

    loop {
        let elapsed = start.elapsed();
        if elapsed.is_err() {
            panic!("System time error");
        }
        let elapsed = elapsed.unwrap();

        if elapsed > timeout {
            panic!("{}", error_msg);
        }
        if predicate() {
            return;
        }
        tokio::time::sleep(tick).await;
    }
}

/// Writes a mono 16 bit WAV file.
pub fn write_wav(path: &Path, samples: &[i16], sample_rate: u32) -> Result<(), Box<dyn Error>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for sample in samples {
        writer.write_sample(*sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// A fetcher that serves canned outcomes, counting requests.
pub struct MockFetcher {
    calls: AtomicUsize,
    outcomes: Mutex<VecDeque<Result<Vec<u8>, EngineError>>>,
    delay: Duration,
}

impl MockFetcher {
    /// Always succeeds with a few bytes.
    pub fn new() -> MockFetcher {
        MockFetcher {
            calls: AtomicUsize::new(0),
            outcomes: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
        }
    }

    /// Serves the given outcomes in order, then succeeds.
    pub fn with_outcomes(outcomes: Vec<Result<Vec<u8>, EngineError>>) -> MockFetcher {
        MockFetcher {
            outcomes: Mutex::new(outcomes.into()),
            ..MockFetcher::new()
        }
    }

    /// Holds every response for the given duration.
    pub fn delayed(mut self, delay: Duration) -> MockFetcher {
        self.delay = delay;
        self
    }

    /// Returns how many fetches were issued.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockFetcher {
    fn default() -> Self {
        MockFetcher::new()
    }
}

impl AssetFetcher for MockFetcher {
    fn fetch(&self, _location: &str) -> BoxFuture<'static, Result<Vec<u8>, EngineError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .outcomes
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(vec![1, 2, 3, 4]));
        let delay = self.delay;
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            outcome
        }
        .boxed()
    }
}

/// A decoder that produces a flat one second sample, optionally failing first.
pub struct MockDecoder {
    calls: AtomicUsize,
    failures_remaining: AtomicUsize,
    inputs: Mutex<Vec<Vec<u8>>>,
}

impl MockDecoder {
    pub fn new() -> MockDecoder {
        MockDecoder::failing(0)
    }

    /// The first `failures` decodes fail.
    pub fn failing(failures: usize) -> MockDecoder {
        MockDecoder {
            calls: AtomicUsize::new(0),
            failures_remaining: AtomicUsize::new(failures),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns the bytes handed to every decode call.
    pub fn inputs(&self) -> Vec<Vec<u8>> {
        self.inputs.lock().clone()
    }
}

impl Default for MockDecoder {
    fn default() -> Self {
        MockDecoder::new()
    }
}

impl SampleDecoder for MockDecoder {
    fn decode(&self, mut bytes: Vec<u8>, target_sample_rate: u32) -> Result<Sample, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().push(bytes.clone());
        // Decoding is allowed to consume its input.
        bytes.clear();

        let failed = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(EngineError::DecodeFailure("mock decode failure".to_string()));
        }
        Ok(Sample::new(
            vec![0.5; target_sample_rate as usize],
            1,
            target_sample_rate,
        ))
    }
}
