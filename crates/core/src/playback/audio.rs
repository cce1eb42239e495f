use crate::playback::{AudioOutput, PlaybackError, PlayingAudio};
use crate::tts::SpeechAudio;
use rodio::cpal::traits::DeviceTrait;
use rodio::cpal::traits::HostTrait;
use rodio::source::Source;
use rodio::{OutputStream, OutputStreamBuilder, Sink, StreamError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

const LOG_TARGET: &str = "playback::audio";

/// Poison-tolerant lazy slot. The rodio [`OutputStream`] has to outlive every
/// sink connected to it, so one stream is opened on first use and shared.
struct LazyInit<T> {
    value: Mutex<Option<T>>,
}

impl<T> LazyInit<T> {
    fn new() -> Self {
        Self {
            value: Mutex::new(None),
        }
    }

    fn get_or_try_init_with<R, E>(
        &self,
        init: impl FnOnce() -> Result<T, E>,
        f: impl FnOnce(&T) -> R,
        invariant_err: impl FnOnce() -> E,
    ) -> Result<R, E> {
        let mut guard = match self.value.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!(target: LOG_TARGET, "output stream cache lock poisoned, recovering");
                poisoned.into_inner()
            }
        };

        if guard.is_none() {
            *guard = Some(init()?);
        }

        match guard.as_ref() {
            Some(v) => Ok(f(v)),
            None => Err(invariant_err()),
        }
    }
}

struct RateLimitedWarn {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimitedWarn {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    fn should_log(&self) -> bool {
        let mut guard = match self.last.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };

        let now = Instant::now();
        match *guard {
            None => {
                *guard = Some(now);
                true
            }
            Some(prev) if now.duration_since(prev) >= self.interval => {
                *guard = Some(now);
                true
            }
            Some(_) => false,
        }
    }
}

/// Speaker output through rodio. Clones share one output stream.
#[derive(Clone)]
pub struct RodioOutput {
    output_device_name: Option<String>,
    disabled: Arc<AtomicBool>,
    disabled_details: Arc<OnceLock<String>>,
    output_stream: Arc<LazyInit<OutputStream>>,
    output_stream_open_attempts: Arc<AtomicUsize>,
    blank_audio_warn: Arc<RateLimitedWarn>,
}

impl RodioOutput {
    pub fn new() -> Self {
        Self {
            output_device_name: None,
            disabled: Arc::new(AtomicBool::new(false)),
            disabled_details: Arc::new(OnceLock::new()),
            output_stream: Arc::new(LazyInit::new()),
            output_stream_open_attempts: Arc::new(AtomicUsize::new(0)),
            blank_audio_warn: Arc::new(RateLimitedWarn::new(Duration::from_secs(5))),
        }
    }

    pub fn with_output_device_name<S: Into<String>>(mut self, name: S) -> Self {
        self.output_device_name = Some(name.into());
        self
    }

    /// Why output was switched off after a missing-device error, if it was.
    pub fn disabled_details(&self) -> Option<&str> {
        self.disabled_details.get().map(String::as_str)
    }

    fn open_output_stream(&self) -> Result<OutputStream, PlaybackError> {
        let attempt = self
            .output_stream_open_attempts
            .fetch_add(1, Ordering::Relaxed)
            + 1;
        tracing::debug!(
            target: LOG_TARGET,
            attempt,
            configured_output_device = %self.output_device_name.as_deref().unwrap_or("<default>"),
            "opening rodio output stream"
        );

        match self.output_device_name.as_deref() {
            Some(wanted) => match open_named_output_stream(wanted) {
                Ok(stream) => Ok(stream),
                Err(NamedDeviceStreamError::DeviceNotFound { wanted, available }) => {
                    tracing::warn!(
                        target: LOG_TARGET,
                        wanted_device = %wanted,
                        available_devices = %format_device_list(&available),
                        "output device not found, using default device"
                    );
                    open_default(Some(wanted.as_str()), "default device after named device not found")
                }
                Err(NamedDeviceStreamError::OpenFailed {
                    wanted,
                    error,
                    available,
                }) => {
                    tracing::warn!(
                        target: LOG_TARGET,
                        wanted_device = %wanted,
                        error = %error,
                        available_devices = %format_device_list(&available),
                        "failed to open output device, using default device"
                    );
                    open_default(Some(wanted.as_str()), "default device after named device open failed")
                }
            },
            None => open_default(None, "open default output stream"),
        }
    }

    fn connect_sink(&self) -> Result<Sink, PlaybackError> {
        self.output_stream.get_or_try_init_with(
            || self.open_output_stream(),
            |stream| Sink::connect_new(stream.mixer()),
            || PlaybackError::AudioOutputUnavailable {
                details: "output stream cache empty after init".to_owned(),
            },
        )
    }

    fn is_playable(&self, audio: &SpeechAudio) -> bool {
        if audio.sample_rate_hz != 0 && !audio.samples.is_empty() {
            return true;
        }
        if self.blank_audio_warn.should_log() {
            tracing::warn!(
                target: LOG_TARGET,
                sample_rate_hz = audio.sample_rate_hz,
                samples = audio.samples.len(),
                "skipping empty or invalid PCM (rate-limited)"
            );
        } else {
            tracing::debug!(
                target: LOG_TARGET,
                sample_rate_hz = audio.sample_rate_hz,
                samples = audio.samples.len(),
                "skipping empty or invalid PCM"
            );
        }
        false
    }
}

impl Default for RodioOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for RodioOutput {
    fn start(&self, audio: Arc<SpeechAudio>) -> Result<PlayingAudio, PlaybackError> {
        if self.disabled.load(Ordering::Relaxed) || !self.is_playable(&audio) {
            return Ok(PlayingAudio::silent());
        }

        let sink = match self.connect_sink() {
            Ok(s) => s,
            Err(e) => {
                #[allow(irrefutable_let_patterns)]
                if let PlaybackError::AudioOutputUnavailable { details } = &e {
                    if details.contains("NoDevice") {
                        self.disabled.store(true, Ordering::Relaxed);
                        let _ = self.disabled_details.set(details.clone());
                    }
                }
                return Err(e);
            }
        };

        sink.append(PcmSource::new(audio));
        Ok(PlayingAudio::new(move || sink.stop()))
    }
}

fn open_default(wanted: Option<&str>, context: &str) -> Result<OutputStream, PlaybackError> {
    OutputStreamBuilder::open_default_stream().map_err(|e| PlaybackError::AudioOutputUnavailable {
        details: format_stream_error_details(e, wanted, context),
    })
}

#[derive(Debug)]
enum NamedDeviceStreamError {
    DeviceNotFound {
        wanted: String,
        available: Vec<String>,
    },
    OpenFailed {
        wanted: String,
        error: StreamError,
        available: Vec<String>,
    },
}

fn normalize_device_name(s: &str) -> String {
    s.trim().to_ascii_lowercase()
}

fn open_named_output_stream(wanted: &str) -> Result<OutputStream, NamedDeviceStreamError> {
    let wanted_norm = normalize_device_name(wanted);

    let host = rodio::cpal::default_host();
    let devices = host.output_devices().ok();
    let mut available: Vec<String> = Vec::new();
    let mut selected = None;

    if let Some(devices) = devices {
        for d in devices {
            let name = d.name().unwrap_or_else(|_| "<unnamed>".to_owned());
            if normalize_device_name(&name) == wanted_norm {
                selected = Some(d);
            }
            available.push(name.to_owned());
        }
    }

    let Some(device) = selected else {
        return Err(NamedDeviceStreamError::DeviceNotFound {
            wanted: wanted.to_owned(),
            available,
        });
    };

    match OutputStreamBuilder::from_device(device).and_then(|b| b.open_stream_or_fallback()) {
        Ok(stream) => Ok(stream),
        Err(error) => Err(NamedDeviceStreamError::OpenFailed {
            wanted: wanted.to_owned(),
            error,
            available,
        }),
    }
}

fn format_device_list(devices: &[String]) -> String {
    if devices.is_empty() {
        return "<unknown>".to_owned();
    }
    devices.join(", ")
}

fn format_stream_error_details(err: StreamError, wanted: Option<&str>, context: &str) -> String {
    let mut s = format!("{context}: {err}");
    if let Some(w) = wanted {
        s.push_str(&format!(" (configured_device={w})"));
    }
    #[cfg(feature = "playback-device-enum")]
    {
        if let Ok(devices) = enumerate_output_device_names() {
            if devices.is_empty() {
                s.push_str("; available_output_devices=<none>");
            } else {
                s.push_str("; available_output_devices=");
                s.push_str(&devices.join(", "));
            }
        }
    }
    s
}

#[cfg(feature = "playback-device-enum")]
pub fn enumerate_output_device_names() -> Result<Vec<String>, PlaybackError> {
    let host = rodio::cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| PlaybackError::AudioOutputUnavailable {
            details: format!("failed to list output devices: {e}"),
        })?;

    let mut out = Vec::new();
    for d in devices {
        let name = d.name().unwrap_or_else(|_| "<unnamed>".to_owned());
        out.push(name);
    }
    Ok(out)
}


/// Mono f32 PCM shared with the volume tracker.
struct PcmSource {
    audio: Arc<SpeechAudio>,
    next: usize,
}

impl PcmSource {
    fn new(audio: Arc<SpeechAudio>) -> Self {
        Self { audio, next: 0 }
    }
}

impl Iterator for PcmSource {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        let s = self.audio.samples.get(self.next).copied()?;
        self.next += 1;
        Some(s)
    }
}

impl Source for PcmSource {
    fn current_span_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.audio.sample_rate_hz
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f64(self.audio.duration_ms() / 1000.0))
    }
}
