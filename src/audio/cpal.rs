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
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use futures_util::future::{BoxFuture, FutureExt};
use tokio::sync::oneshot;
use tracing::{error, info, span, Level};

use super::mixer::{Clock, VoiceMixer};
use super::{ContextProvider, ContextState, OutputContext, Voice};
use crate::config;
use crate::error::EngineError;

const DEFAULT_DEVICE: &str = "default";

/// Commands serviced by the output thread, which owns the stream.
enum Control {
    Resume(oneshot::Sender<Result<(), EngineError>>),
    Suspend(crossbeam_channel::Sender<Result<(), EngineError>>),
}

/// An output context backed by a cpal output stream. Voices are mixed directly
/// in the stream callback; the clock advances with every rendered frame.
pub struct Context {
    /// The name of the device.
    name: String,
    /// The output sample rate.
    sample_rate: u32,
    /// The number of output channels.
    num_channels: u16,
    /// Frames rendered by the stream callback.
    clock: Clock,
    /// Whether the stream is playing. Cleared on pause or a stream error.
    running: Arc<AtomicBool>,
    /// Hands new voices to the stream callback.
    voice_tx: crossbeam_channel::Sender<Voice>,
    /// Sends play/pause commands to the output thread.
    control_tx: crossbeam_channel::Sender<Control>,
}

impl Context {
    /// Opens the configured device and starts a running output stream.
    fn open(config: &config::Audio) -> Result<Context, EngineError> {
        let host = cpal::default_host();
        let device = find_device(&host, config.device())?;
        let name = device
            .name()
            .unwrap_or_else(|_| config.device().to_string());

        let supported = device
            .default_output_config()
            .map_err(|e| EngineError::ContextFailure(e.to_string()))?;
        let sample_format = supported.sample_format();
        let mut stream_config: cpal::StreamConfig = supported.config();
        if let Some(sample_rate) = config.sample_rate() {
            stream_config.sample_rate = cpal::SampleRate(sample_rate);
        }
        let sample_rate = stream_config.sample_rate.0;
        let num_channels = stream_config.channels;

        let clock = Clock::new();
        let mixer = VoiceMixer::new(num_channels, sample_rate, clock.clone());
        let running = Arc::new(AtomicBool::new(false));
        let (voice_tx, voice_rx) = crossbeam_channel::unbounded::<Voice>();
        let (control_tx, control_rx) = crossbeam_channel::unbounded::<Control>();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), EngineError>>(1);

        let thread_name = name.clone();
        let stream_running = running.clone();
        // The stream isn't Send on every platform, so it's created and kept on
        // its own thread for the life of the context.
        thread::spawn(move || {
            let span = span!(Level::INFO, "audio output", device = thread_name);
            let _enter = span.enter();

            let renderer = Renderer::new(mixer, voice_rx, &stream_config);
            let stream = match build_stream(
                &device,
                &stream_config,
                sample_format,
                renderer,
                stream_running.clone(),
            ) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(EngineError::ContextFailure(e.to_string())));
                return;
            }
            stream_running.store(true, Ordering::Release);
            info!("Output stream started");
            let _ = ready_tx.send(Ok(()));

            // Runs until the context is dropped and the control channel closes.
            while let Ok(command) = control_rx.recv() {
                match command {
                    Control::Resume(reply) => {
                        let result = stream
                            .play()
                            .map_err(|e| EngineError::ContextFailure(e.to_string()));
                        let _ = reply.send(result);
                    }
                    Control::Suspend(reply) => {
                        let result = stream
                            .pause()
                            .map_err(|e| EngineError::ContextFailure(e.to_string()));
                        let _ = reply.send(result);
                    }
                }
            }
            info!("Output stream closed");
        });

        ready_rx
            .recv()
            .map_err(|_| EngineError::ContextFailure("output thread exited".to_string()))??;

        Ok(Context {
            name,
            sample_rate,
            num_channels,
            clock,
            running,
            voice_tx,
            control_tx,
        })
    }
}

impl OutputContext for Context {
    fn state(&self) -> ContextState {
        state_of(&self.running)
    }

    fn resume(&self) -> BoxFuture<'static, Result<(), EngineError>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = self.control_tx.send(Control::Resume(reply_tx));
        let running = self.running.clone();
        async move {
            sent.map_err(|_| EngineError::ContextFailure("output thread exited".to_string()))?;
            reply_rx
                .await
                .map_err(|_| EngineError::ContextFailure("output thread exited".to_string()))??;
            running.store(true, Ordering::Release);
            Ok(())
        }
        .boxed()
    }

    fn suspend(&self) -> Result<(), EngineError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.control_tx
            .send(Control::Suspend(reply_tx))
            .map_err(|_| EngineError::ContextFailure("output thread exited".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| EngineError::ContextFailure("output thread exited".to_string()))??;
        self.running.store(false, Ordering::Release);
        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.clock.seconds(self.sample_rate)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start_voice(&self, voice: Voice) -> Result<(), EngineError> {
        self.voice_tx
            .send(voice)
            .map_err(|_| EngineError::TriggerFailure("output stream is closed".to_string()))
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({}Hz)",
            self.name, self.num_channels, self.sample_rate
        )
    }
}

/// Opens cpal output contexts for a configured device.
pub struct Provider {
    config: config::Audio,
}

impl Provider {
    pub fn new(config: config::Audio) -> Provider {
        Provider { config }
    }
}

impl ContextProvider for Provider {
    fn create(&self) -> Result<Arc<dyn OutputContext>, EngineError> {
        Ok(Arc::new(Context::open(&self.config)?))
    }
}

/// Finds the named output device, or the host default.
fn find_device(host: &cpal::Host, name: &str) -> Result<cpal::Device, EngineError> {
    if name == DEFAULT_DEVICE {
        return host.default_output_device().ok_or_else(|| {
            EngineError::PlatformUnsupported(format!(
                "host {} has no default output device",
                host.id().name()
            ))
        });
    }

    let mut devices = host
        .output_devices()
        .map_err(|e| EngineError::PlatformUnsupported(e.to_string()))?;
    devices
        .find(|device| {
            device
                .name()
                .map(|device_name| device_name.trim() == name)
                .unwrap_or(false)
        })
        .ok_or_else(|| {
            EngineError::PlatformUnsupported(format!("no device found with name {}", name))
        })
}

/// Reports running unless the stream was paused or has failed.
fn state_of(running: &AtomicBool) -> ContextState {
    if running.load(Ordering::Acquire) {
        ContextState::Running
    } else {
        ContextState::Suspended
    }
}

/// Marks the context suspended when the stream reports an error, so the next
/// request for sound resumes it.
fn stream_error_handler(running: Arc<AtomicBool>) -> impl FnMut(cpal::StreamError) + Send {
    move |err| {
        error!(err = %err, "CPAL output stream error");
        running.store(false, Ordering::Release);
    }
}

/// Frames assumed per callback when the stream doesn't fix a buffer size.
const DEFAULT_CALLBACK_FRAMES: usize = 4096;

/// The work done in the stream callback: pick up new voices, mix them and
/// convert to the device format.
struct Renderer {
    mixer: VoiceMixer,
    voice_rx: crossbeam_channel::Receiver<Voice>,
    /// Mix buffer, allocated up front.
    scratch: Vec<f32>,
}

impl Renderer {
    fn new(
        mixer: VoiceMixer,
        voice_rx: crossbeam_channel::Receiver<Voice>,
        config: &cpal::StreamConfig,
    ) -> Renderer {
        let frames = match config.buffer_size {
            cpal::BufferSize::Fixed(frames) => frames as usize,
            cpal::BufferSize::Default => DEFAULT_CALLBACK_FRAMES,
        };
        Renderer {
            scratch: vec![0.0; frames * mixer.num_channels() as usize],
            mixer,
            voice_rx,
        }
    }

    fn render<T>(&mut self, data: &mut [T])
    where
        T: cpal::Sample + cpal::FromSample<f32>,
    {
        while let Ok(voice) = self.voice_rx.try_recv() {
            self.mixer.add_voice(voice);
        }

        // Only grows if the host hands over a larger buffer than expected.
        if self.scratch.len() < data.len() {
            self.scratch.resize(data.len(), 0.0);
        }
        let scratch = &mut self.scratch[..data.len()];
        self.mixer.process_into_output(scratch);
        for (dst, src) in data.iter_mut().zip(scratch.iter()) {
            *dst = T::from_sample(*src);
        }
    }
}

/// Builds an output stream in the device's native sample format.
fn build_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    renderer: Renderer,
    running: Arc<AtomicBool>,
) -> Result<cpal::Stream, EngineError> {
    let result = match sample_format {
        cpal::SampleFormat::F32 => build_typed_stream::<f32>(device, config, renderer, running),
        cpal::SampleFormat::I16 => build_typed_stream::<i16>(device, config, renderer, running),
        cpal::SampleFormat::U16 => build_typed_stream::<u16>(device, config, renderer, running),
        cpal::SampleFormat::I32 => build_typed_stream::<i32>(device, config, renderer, running),
        other => {
            return Err(EngineError::ContextFailure(format!(
                "unsupported sample format {:?}",
                other
            )))
        }
    };
    result.map_err(|e| EngineError::ContextFailure(e.to_string()))
}

fn build_typed_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut renderer: Renderer,
    running: Arc<AtomicBool>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| renderer.render(data),
        stream_error_handler(running),
        None,
    )
}

/// Lists output devices across all available hosts.
pub fn list_devices() -> Result<Vec<String>, Box<dyn Error>> {
    // Suppress noisy output here.
    let _shh_stdout = shh::stdout()?;
    let _shh_stderr = shh::stderr()?;

    let mut devices: Vec<String> = Vec::new();
    for host_id in cpal::available_hosts() {
        let host_devices = match cpal::host_from_id(host_id)?.output_devices() {
            Ok(host_devices) => host_devices,
            Err(e) => {
                error!(
                    err = e.to_string(),
                    host = host_id.name(),
                    "Unable to list devices for host"
                );
                continue;
            }
        };

        for device in host_devices {
            let Ok(output_configs) = device.supported_output_configs() else {
                continue;
            };
            let max_channels = output_configs
                .map(|output_config| output_config.channels())
                .max()
                .unwrap_or(0);

            if max_channels > 0 {
                devices.push(format!(
                    "{} (Channels={}) ({})",
                    device.name()?,
                    max_channels,
                    host_id.name()
                ));
            }
        }
    }

    devices.sort();
    Ok(devices)
}
