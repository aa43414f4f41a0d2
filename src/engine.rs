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

//! The sample trigger engine.
//!
//! The engine owns one decoded sample and one output context and plays
//! pitch-shifted voices of the sample on request. Everything it needs is
//! acquired lazily:
//!
//! 1. The raw sample bytes are fetched once (`prefetch_data`).
//! 2. The output context is created and resumed on the first request for sound.
//! 3. A private copy of the raw bytes is decoded at the context's sample rate.
//!
//! Loading and initialization are single-flight: the first caller starts the
//! work and stores a shared future, and every concurrent or later caller awaits
//! that same future. A failed future is removed so the next caller starts over.

use std::fmt;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Weak,
};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{error, info, warn};

use crate::audio::{self, ContextProvider, ContextState, OutputContext, Voice, VoiceInfo};
use crate::config;
use crate::decode::{Sample, SampleDecoder, SymphoniaDecoder};
use crate::fetch::{self, AssetFetcher};
use crate::notes;

pub use crate::error::EngineError;

type FetchFuture = Shared<BoxFuture<'static, Result<Arc<Vec<u8>>, EngineError>>>;
type InitFuture = Shared<BoxFuture<'static, bool>>;

/// Where the engine is in its lazy initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Nothing has been requested yet.
    Uninitialized,
    /// The raw sample bytes are being fetched.
    DataLoading,
    /// The raw sample bytes are cached.
    DataReady,
    /// The output context is being created.
    ContextCreating,
    /// The output context exists but the sample isn't decoded.
    ContextReady,
    /// The sample is being decoded.
    Decoding,
    /// Voices can be triggered.
    Ready,
    /// There's no audio output on this platform. Terminal.
    Unsupported,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::DataLoading => "data loading",
            EngineState::DataReady => "data ready",
            EngineState::ContextCreating => "context creating",
            EngineState::ContextReady => "context ready",
            EngineState::Decoding => "decoding",
            EngineState::Ready => "ready",
            EngineState::Unsupported => "unsupported",
        };
        write!(f, "{}", name)
    }
}

/// Plays voices of a single sample. Cloning is cheap and every clone drives the
/// same sample and output context.
#[derive(Clone)]
pub struct SampleEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    /// Where the sample is fetched from.
    location: String,
    fetcher: Arc<dyn AssetFetcher>,
    decoder: Arc<dyn SampleDecoder>,
    provider: Arc<dyn ContextProvider>,
    /// The runtime the engine was created on, used by callers outside of it.
    runtime: Option<Handle>,

    /// The in-flight or completed fetch, tagged with the ID that created it.
    fetch: Mutex<Option<(u64, FetchFuture)>>,
    /// The in-flight or completed initialization.
    init: Mutex<Option<(u64, InitFuture)>>,
    next_id: AtomicU64,

    context: Mutex<Option<Arc<dyn OutputContext>>>,
    sample: Mutex<Option<Sample>>,

    creating: AtomicBool,
    decoding: AtomicBool,
    unsupported: AtomicBool,
}

impl EngineInner {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// The caller's runtime, or the one the engine was created on.
    fn runtime(&self) -> Option<Handle> {
        Handle::try_current().ok().or_else(|| self.runtime.clone())
    }
}

/// Clears a single-flight slot, unless a newer future already replaced ours.
fn clear_slot<T>(slot: &Mutex<Option<(u64, T)>>, id: u64) {
    let mut slot = slot.lock();
    if matches!(slot.as_ref(), Some((current, _)) if *current == id) {
        *slot = None;
    }
}

impl SampleEngine {
    /// Creates an engine. Nothing is fetched or opened until requested. When
    /// created inside a tokio runtime, the engine keeps a handle to it so `play`
    /// and `prefetch` work from any thread.
    pub fn new(
        location: &str,
        fetcher: Arc<dyn AssetFetcher>,
        decoder: Arc<dyn SampleDecoder>,
        provider: Arc<dyn ContextProvider>,
    ) -> SampleEngine {
        SampleEngine {
            inner: Arc::new(EngineInner {
                location: location.to_string(),
                fetcher,
                decoder,
                provider,
                runtime: Handle::try_current().ok(),
                fetch: Mutex::new(None),
                init: Mutex::new(None),
                next_id: AtomicU64::new(0),
                context: Mutex::new(None),
                sample: Mutex::new(None),
                creating: AtomicBool::new(false),
                decoding: AtomicBool::new(false),
                unsupported: AtomicBool::new(false),
            }),
        }
    }

    /// Creates an engine with the fetcher, decoder and output configured.
    pub fn from_config(config: &config::Engine) -> Result<SampleEngine, EngineError> {
        let location = config.asset();
        Ok(SampleEngine::new(
            location,
            fetch::for_location(location)?,
            Arc::new(SymphoniaDecoder::for_location(location)),
            audio::get_provider(config.audio()),
        ))
    }

    /// The sample location.
    pub fn location(&self) -> &str {
        &self.inner.location
    }

    /// Fetches the raw sample bytes, sharing any fetch that's in flight or done.
    pub async fn prefetch_data(&self) -> Result<Arc<Vec<u8>>, EngineError> {
        self.fetch_future().await
    }

    /// Starts fetching the raw sample bytes in the background.
    pub fn prefetch(&self) {
        let Some(handle) = self.inner.runtime() else {
            error!(location = self.inner.location, "No runtime to prefetch on");
            return;
        };
        let fetch = self.fetch_future();
        handle.spawn(async move {
            // The outcome is logged by the fetch itself.
            let _ = fetch.await;
        });
    }

    fn fetch_future(&self) -> FetchFuture {
        let mut slot = self.inner.fetch.lock();
        if let Some((_, fetch)) = slot.as_ref() {
            return fetch.clone();
        }

        let id = self.inner.next_id();
        let weak: Weak<EngineInner> = Arc::downgrade(&self.inner);
        let location = self.inner.location.clone();
        let request = self.inner.fetcher.fetch(&location);
        let fetch = async move {
            info!(location, "Fetching sample");
            match request.await {
                Ok(bytes) => {
                    info!(location, bytes = bytes.len(), "Sample fetched");
                    Ok(Arc::new(bytes))
                }
                Err(e) => {
                    warn!(location, err = %e, "Sample fetch failed");
                    if let Some(inner) = weak.upgrade() {
                        clear_slot(&inner.fetch, id);
                    }
                    Err(e)
                }
            }
        }
        .boxed()
        .shared();

        *slot = Some((id, fetch.clone()));
        fetch
    }

    /// Makes sure the output context exists and is running and the sample is
    /// decoded. A suspended context is resumed on every call. Failures are
    /// logged and reported as false.
    pub async fn ensure_ready(&self) -> bool {
        if self.inner.unsupported.load(Ordering::Acquire) {
            return false;
        }

        if let Some((context, _)) = self.ready_parts() {
            return match resume(&context).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(err = %e, "Unable to resume output context");
                    false
                }
            };
        }

        self.init_future().await
    }

    fn init_future(&self) -> InitFuture {
        let mut slot = self.inner.init.lock();
        if let Some((_, init)) = slot.as_ref() {
            return init.clone();
        }

        let id = self.inner.next_id();
        let weak: Weak<EngineInner> = Arc::downgrade(&self.inner);
        let init = async move {
            let Some(inner) = weak.upgrade() else {
                return false;
            };
            let engine = SampleEngine { inner };
            match engine.initialize().await {
                Ok(()) => {
                    info!(location = engine.inner.location, "Sample engine ready");
                    true
                }
                Err(e) => {
                    if e.is_permanent() {
                        error!(err = %e, "Audio output is unavailable, playback disabled");
                    } else {
                        warn!(err = %e, "Sample engine initialization failed");
                    }
                    clear_slot(&engine.inner.init, id);
                    false
                }
            }
        }
        .boxed()
        .shared();

        *slot = Some((id, init.clone()));
        init
    }

    async fn initialize(&self) -> Result<(), EngineError> {
        let context = self.output_context().await?;
        resume(&context).await?;

        let raw = self.fetch_future().await?;
        if self.inner.sample.lock().is_some() {
            return Ok(());
        }
        let sample = self.decode(raw, context.sample_rate()).await?;
        *self.inner.sample.lock() = Some(sample);
        Ok(())
    }

    async fn output_context(&self) -> Result<Arc<dyn OutputContext>, EngineError> {
        let existing = self.inner.context.lock().clone();
        if let Some(context) = existing {
            return Ok(context);
        }

        self.inner.creating.store(true, Ordering::Release);
        let provider = self.inner.provider.clone();
        let result = match tokio::task::spawn_blocking(move || provider.create()).await {
            Ok(result) => result,
            Err(e) => Err(EngineError::ContextFailure(e.to_string())),
        };
        self.inner.creating.store(false, Ordering::Release);

        match result {
            Ok(context) => {
                info!(context = %context, "Output context created");
                *self.inner.context.lock() = Some(context.clone());
                Ok(context)
            }
            Err(e) => {
                if e.is_permanent() {
                    self.inner.unsupported.store(true, Ordering::Release);
                }
                Err(e)
            }
        }
    }

    /// Decodes a private copy of the raw bytes. The cached bytes stay intact so
    /// a failed decode can be retried without fetching again.
    async fn decode(
        &self,
        raw: Arc<Vec<u8>>,
        target_sample_rate: u32,
    ) -> Result<Sample, EngineError> {
        self.inner.decoding.store(true, Ordering::Release);
        let decoder = self.inner.decoder.clone();
        let bytes = raw.as_ref().clone();
        let result =
            match tokio::task::spawn_blocking(move || decoder.decode(bytes, target_sample_rate))
                .await
            {
                Ok(result) => result,
                Err(e) => Err(EngineError::DecodeFailure(e.to_string())),
            };
        self.inner.decoding.store(false, Ordering::Release);
        result
    }

    fn ready_parts(&self) -> Option<(Arc<dyn OutputContext>, Sample)> {
        let context = self.inner.context.lock().clone()?;
        let sample = self.inner.sample.lock().clone()?;
        Some((context, sample))
    }

    /// Returns true if voices can be triggered right now.
    pub fn is_ready(&self) -> bool {
        self.ready_parts().is_some()
    }

    /// Returns the current initialization state.
    pub fn state(&self) -> EngineState {
        if self.inner.unsupported.load(Ordering::Acquire) {
            return EngineState::Unsupported;
        }
        let has_context = self.inner.context.lock().is_some();
        if has_context && self.inner.sample.lock().is_some() {
            return EngineState::Ready;
        }
        if self.inner.decoding.load(Ordering::Acquire) {
            return EngineState::Decoding;
        }
        if self.inner.creating.load(Ordering::Acquire) {
            return EngineState::ContextCreating;
        }
        if has_context {
            return EngineState::ContextReady;
        }
        match self.inner.fetch.lock().as_ref() {
            None => EngineState::Uninitialized,
            Some((_, fetch)) => match fetch.peek() {
                Some(Ok(_)) => EngineState::DataReady,
                _ => EngineState::DataLoading,
            },
        }
    }

    /// Starts a voice for the note on a ready engine and returns its schedule.
    /// Unknown notes play at the sample's native pitch.
    pub fn trigger(&self, note: &str) -> Result<VoiceInfo, EngineError> {
        let (context, sample) = self.ready_parts().ok_or(EngineError::NotReady)?;
        let rate = notes::resolve_rate(note);
        let voice = Voice::new(sample, rate, context.current_time());
        let info = voice.info();
        context.start_voice(voice)?;
        info!(
            note,
            rate,
            start = info.start_at,
            stop = info.stop_at,
            "Voice started"
        );
        Ok(info)
    }

    /// Plays the note. Safe to call at any time: if the engine isn't ready the
    /// note plays once initialization finishes. Errors are logged, never
    /// returned.
    pub fn play(&self, note: &str) {
        if self.inner.unsupported.load(Ordering::Acquire) {
            return;
        }

        if let Some((context, _)) = self.ready_parts() {
            if context.state() == ContextState::Running {
                self.trigger_logged(note);
                return;
            }
        }

        let Some(handle) = self.inner.runtime() else {
            error!(note, "No runtime to initialize the sample engine on");
            return;
        };
        let engine = self.clone();
        let note = note.to_string();
        handle.spawn(async move {
            if engine.ensure_ready().await {
                engine.trigger_logged(&note);
            }
        });
    }

    fn trigger_logged(&self, note: &str) {
        if let Err(e) = self.trigger(note) {
            warn!(note, err = %e, "Unable to play note");
        }
    }
}

async fn resume(context: &Arc<dyn OutputContext>) -> Result<(), EngineError> {
    if context.state() == ContextState::Suspended {
        info!(context = %context, "Resuming suspended output context");
        context.resume().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::future::join_all;

    use super::*;
    use crate::audio::mock;
    use crate::notes::NoteName;
    use crate::testutil::{eventually, write_wav, MockDecoder, MockFetcher};

    struct Harness {
        engine: SampleEngine,
        fetcher: Arc<MockFetcher>,
        decoder: Arc<MockDecoder>,
        provider: Arc<mock::Provider>,
    }

    impl Harness {
        fn new() -> Harness {
            Harness::with(
                MockFetcher::default(),
                MockDecoder::default(),
                mock::Provider::new(mock_context()),
            )
        }

        fn with(fetcher: MockFetcher, decoder: MockDecoder, provider: mock::Provider) -> Harness {
            let fetcher = Arc::new(fetcher);
            let decoder = Arc::new(decoder);
            let provider = Arc::new(provider);
            let engine = SampleEngine::new(
                "static/audio/pads/Pad_02.mp3",
                fetcher.clone(),
                decoder.clone(),
                provider.clone(),
            );
            Harness {
                engine,
                fetcher,
                decoder,
                provider,
            }
        }

        fn context(&self) -> Arc<mock::Context> {
            self.provider.context()
        }
    }

    fn mock_context() -> Arc<mock::Context> {
        Arc::new(mock::Context::new("mock", 1000))
    }

    fn http_500() -> EngineError {
        EngineError::unavailable("static/audio/pads/Pad_02.mp3", "HTTP 500")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_every_note_uses_its_rate() {
        let harness = Harness::new();
        assert!(harness.engine.ensure_ready().await);

        for note in NoteName::ALL {
            let info = harness.engine.trigger(note.as_str()).unwrap();
            assert_eq!(info.playback_rate, note.playback_rate());
        }
        let rates: Vec<f64> = harness
            .context()
            .voices()
            .iter()
            .map(|voice| voice.playback_rate())
            .collect();
        assert_eq!(
            rates,
            vec![1.0, 1.122, 1.26, 1.335, 1.498, 1.682, 1.888, 2.0]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_note_plays_native_pitch() {
        let harness = Harness::new();
        assert!(harness.engine.ensure_ready().await);

        for note in ["H", "c", "C3", ""] {
            assert_eq!(harness.engine.trigger(note).unwrap().playback_rate, 1.0);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_prefetch_fetches_once() {
        let harness = Harness::with(
            MockFetcher::new().delayed(Duration::from_millis(50)),
            MockDecoder::new(),
            mock::Provider::new(mock_context()),
        );

        let results = join_all((0..10).map(|_| harness.engine.prefetch_data())).await;
        assert_eq!(harness.fetcher.calls(), 1);
        let first = results[0].as_ref().unwrap();
        for result in results.iter() {
            assert!(Arc::ptr_eq(first, result.as_ref().unwrap()));
        }

        // Later calls see the cached bytes.
        let later = harness.engine.prefetch_data().await.unwrap();
        assert!(Arc::ptr_eq(first, &later));
        assert_eq!(harness.fetcher.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_prefetch_shares_failure() {
        let harness = Harness::with(
            MockFetcher::with_outcomes(vec![Err(http_500())])
                .delayed(Duration::from_millis(50)),
            MockDecoder::new(),
            mock::Provider::new(mock_context()),
        );

        let results = join_all((0..5).map(|_| harness.engine.prefetch_data())).await;
        assert_eq!(harness.fetcher.calls(), 1);
        for result in results {
            assert_eq!(result, Err(http_500()));
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fetch_failure_is_retryable() {
        let harness = Harness::with(
            MockFetcher::with_outcomes(vec![Err(http_500())]),
            MockDecoder::new(),
            mock::Provider::new(mock_context()),
        );

        assert_eq!(harness.engine.prefetch_data().await, Err(http_500()));
        assert_eq!(harness.engine.state(), EngineState::Uninitialized);

        assert!(harness.engine.ensure_ready().await);
        assert_eq!(harness.fetcher.calls(), 2);
        assert!(harness.engine.trigger("C").is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_ensure_ready_failure_is_retryable() {
        let harness = Harness::with(
            MockFetcher::with_outcomes(vec![Err(http_500())]),
            MockDecoder::new(),
            mock::Provider::new(mock_context()),
        );

        assert!(!harness.engine.ensure_ready().await);
        assert!(!harness.engine.is_ready());
        assert!(harness.engine.ensure_ready().await);
        assert!(harness.engine.is_ready());
        // The context created by the first attempt is reused.
        assert_eq!(harness.provider.created_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_decode_failure_keeps_raw_bytes() {
        let harness = Harness::with(
            MockFetcher::with_outcomes(vec![Ok(vec![9, 8, 7])]),
            MockDecoder::failing(1),
            mock::Provider::new(mock_context()),
        );

        assert!(!harness.engine.ensure_ready().await);
        assert_eq!(harness.engine.state(), EngineState::ContextReady);
        assert!(harness.engine.ensure_ready().await);

        assert_eq!(harness.fetcher.calls(), 1);
        assert_eq!(harness.decoder.calls(), 2);
        // Both attempts saw the full original bytes.
        assert_eq!(harness.decoder.inputs(), vec![vec![9, 8, 7], vec![9, 8, 7]]);
        assert_eq!(*harness.engine.prefetch_data().await.unwrap(), vec![9, 8, 7]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_context_failure_is_retryable() {
        let harness = Harness::with(
            MockFetcher::new(),
            MockDecoder::new(),
            mock::Provider::failing(mock_context(), 1),
        );

        assert!(!harness.engine.ensure_ready().await);
        assert_ne!(harness.engine.state(), EngineState::Unsupported);
        assert!(harness.engine.ensure_ready().await);
        assert_eq!(harness.provider.created_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_decodes_at_context_rate() {
        let harness = Harness::new();
        assert!(harness.engine.ensure_ready().await);
        let info = harness.engine.trigger("C").unwrap();
        let voice = harness
            .context()
            .voices()
            .into_iter()
            .find(|voice| voice.id() == info.id)
            .unwrap();
        // The mock decoder produces one second at the requested rate.
        assert_eq!(voice.playback_rate(), 1.0);
        assert_eq!(harness.context().sample_rate(), 1000);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_play_before_ready_is_not_dropped() {
        let harness = Harness::with(
            MockFetcher::new().delayed(Duration::from_millis(100)),
            MockDecoder::new(),
            mock::Provider::new(mock_context()),
        );

        harness.engine.play("C");
        harness.engine.play("G");
        assert!(!harness.engine.is_ready());

        let context = harness.context();
        eventually(
            || context.voices().len() == 2,
            "Both early notes never sounded",
        )
        .await;

        let mut rates: Vec<f64> = context
            .voices()
            .iter()
            .map(|voice| voice.playback_rate())
            .collect();
        rates.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(rates, vec![1.0, 1.498]);
        assert_eq!(harness.fetcher.calls(), 1);
        assert_eq!(harness.decoder.calls(), 1);
        assert_eq!(harness.provider.created_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_ensure_ready_initializes_once() {
        let harness = Harness::with(
            MockFetcher::new().delayed(Duration::from_millis(50)),
            MockDecoder::new(),
            mock::Provider::new(mock_context()),
        );

        let results = join_all((0..8).map(|_| harness.engine.ensure_ready())).await;
        assert!(results.into_iter().all(|ready| ready));
        assert_eq!(harness.fetcher.calls(), 1);
        assert_eq!(harness.decoder.calls(), 1);
        assert_eq!(harness.provider.created_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_voice_schedule() {
        let harness = Harness::new();
        assert!(harness.engine.ensure_ready().await);

        let context = harness.context();
        for now in [0.0, 0.1, 2.5] {
            context.set_time(now);
            let info = harness.engine.trigger("E").unwrap();
            assert_eq!(info.start_at, now);
            assert_eq!(info.floor_at, now + 0.8);
            assert_eq!(info.stop_at, now + 0.9);
        }
        // Overlapping voices don't change each other's schedule.
        let voices = context.voices();
        assert_eq!(voices[1].start_at(), 0.1);
        assert_eq!(voices[1].stop_at(), 0.1 + 0.9);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rapid_notes_overlap() {
        let harness = Harness::new();
        assert!(harness.engine.ensure_ready().await);

        let context = harness.context();
        harness.engine.play("C");
        context.advance(0.05);
        harness.engine.play("G");

        assert_eq!(context.voices().len(), 2);
        let sounding = context.sounding_at(0.1);
        assert_eq!(sounding.len(), 2);
        assert_eq!(sounding[0].playback_rate(), 1.0);
        assert_eq!(sounding[1].playback_rate(), 1.498);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_trigger_before_ready() {
        let harness = Harness::new();
        assert_eq!(harness.engine.trigger("C"), Err(EngineError::NotReady));
        assert!(harness.context().voices().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_trigger_failure_is_swallowed() {
        let harness = Harness::new();
        assert!(harness.engine.ensure_ready().await);

        let context = harness.context();
        context.set_fail_triggers(true);
        harness.engine.play("C");
        assert!(matches!(
            harness.engine.trigger("C"),
            Err(EngineError::TriggerFailure(_))
        ));
        assert!(context.voices().is_empty());

        context.set_fail_triggers(false);
        harness.engine.play("D");
        assert_eq!(context.voices().len(), 1);
        assert!(harness.engine.is_ready());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_suspended_context_resumed_every_time() {
        let harness = Harness::new();
        let context = harness.context();
        context.suspend().unwrap();

        assert!(harness.engine.ensure_ready().await);
        assert_eq!(context.state(), ContextState::Running);
        assert_eq!(context.resume_count(), 1);

        context.suspend().unwrap();
        assert!(harness.engine.ensure_ready().await);
        assert_eq!(context.resume_count(), 2);

        // Playing on a suspended context resumes it first.
        context.suspend().unwrap();
        harness.engine.play("A");
        eventually(|| context.voices().len() == 1, "Note never sounded").await;
        assert_eq!(context.resume_count(), 3);
        assert_eq!(context.state(), ContextState::Running);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unsupported_platform_disables_play() {
        let harness = Harness::with(
            MockFetcher::new(),
            MockDecoder::new(),
            mock::Provider::unsupported(mock_context()),
        );

        assert!(!harness.engine.ensure_ready().await);
        assert_eq!(harness.engine.state(), EngineState::Unsupported);
        assert_eq!(harness.provider.created_count(), 1);

        harness.engine.play("C");
        assert!(!harness.engine.ensure_ready().await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(harness.provider.created_count(), 1);
        assert!(harness.context().voices().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_state_progression() {
        let harness = Harness::with(
            MockFetcher::new().delayed(Duration::from_millis(100)),
            MockDecoder::new(),
            mock::Provider::new(mock_context()),
        );
        assert_eq!(harness.engine.state(), EngineState::Uninitialized);

        harness.engine.prefetch();
        assert_eq!(harness.engine.state(), EngineState::DataLoading);

        let engine = harness.engine.clone();
        eventually(
            move || engine.state() == EngineState::DataReady,
            "Prefetch never finished",
        )
        .await;
        assert_eq!(harness.decoder.calls(), 0);

        assert!(harness.engine.ensure_ready().await);
        assert_eq!(harness.engine.state(), EngineState::Ready);
        assert_eq!(harness.fetcher.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_play_from_plain_thread() {
        let harness = Harness::with(
            MockFetcher::new().delayed(Duration::from_millis(50)),
            MockDecoder::new(),
            mock::Provider::new(mock_context()),
        );

        let engine = harness.engine.clone();
        std::thread::spawn(move || {
            engine.prefetch();
            engine.play("C");
            engine.play("G");
        })
        .join()
        .unwrap();

        let context = harness.context();
        eventually(
            || context.voices().len() == 2,
            "Notes played off the runtime never sounded",
        )
        .await;
        assert_eq!(harness.fetcher.calls(), 1);
        assert_eq!(harness.provider.created_count(), 1);
    }

    #[test]
    fn test_play_without_runtime_is_harmless() {
        let harness = Harness::new();
        harness.engine.play("C");
        harness.engine.prefetch();
        assert_eq!(harness.engine.state(), EngineState::Uninitialized);
        assert_eq!(harness.fetcher.calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_from_config_plays_wav_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pad.wav");
        let samples: Vec<i16> = (0..2000).map(|i| ((i % 100) * 300) as i16).collect();
        write_wav(&path, &samples, 44100).unwrap();

        let path = path.to_string_lossy().to_string();
        let config = config::Engine::new(Some(path.clone()), Some(config::Audio::new("mock")));
        let engine = SampleEngine::from_config(&config).unwrap();
        assert_eq!(engine.location(), path);

        assert!(engine.ensure_ready().await);
        let info = engine.trigger("C2").unwrap();
        assert_eq!(info.playback_rate, 2.0);
        assert_eq!(info.stop_at - info.start_at, 0.9);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_file_is_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pad.wav");
        let location = path.to_string_lossy().to_string();
        let config = config::Engine::new(Some(location), Some(config::Audio::new("mock")));
        let engine = SampleEngine::from_config(&config).unwrap();

        assert!(!engine.ensure_ready().await);
        assert!(matches!(
            engine.prefetch_data().await,
            Err(EngineError::AssetUnavailable { .. })
        ));

        write_wav(&path, &[0, 1000, 2000, 1000], 44100).unwrap();
        assert!(engine.ensure_ready().await);
        assert!(engine.trigger("B").is_ok());
    }
}
