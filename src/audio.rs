//! # Audio Capture
//!
//! Real-time audio capture using CPAL (Cross-Platform Audio Library).
//! Keeps the device-selection and stream-buffering shape this module has
//! always used (collect callback data into a growable buffer, slice off
//! fixed-size frames, hand them downstream), generalized from a single
//! fixed 44.1kHz/f32/mono configuration to an enumerate/open/read/close
//! contract over mono 16-bit PCM with an endianness-toggling retry budget.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SupportedStreamConfigRange};
use crossbeam_channel::{Receiver, Sender};
use std::time::Duration;

use crate::error::{PracticeError, Result};
use crate::model::AudioDeviceInfo;

/// Number of times `open` will retry a transient format/config failure.
const OPEN_RETRY_ATTEMPTS: usize = 3;
/// Delay between retry attempts.
const OPEN_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Byte order tried for the device's native 16-bit PCM format. `open`
/// toggles between these across retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

impl Endian {
    fn toggled(self) -> Self {
        match self {
            Endian::Little => Endian::Big,
            Endian::Big => Endian::Little,
        }
    }
}

/// A lazily opened, mono, 16-bit-native audio input line that yields frames
/// of `f32` samples in `[-1, 1]`.
pub struct AudioSource {
    stream: Option<cpal::Stream>,
    frame_rx: Option<Receiver<Vec<f32>>>,
    error_rx: Option<Receiver<String>>,
    frame_samples: usize,
}

impl AudioSource {
    /// Always returns the synthetic default plus every device exposing an
    /// input line. Never fails; unreachable devices are silently skipped.
    pub fn list_devices() -> Vec<AudioDeviceInfo> {
        let host = cpal::default_host();
        let default_name = host.default_input_device().and_then(|d| d.name().ok());

        let mut devices = vec![AudioDeviceInfo {
            id: "default".to_string(),
            name: default_name.clone().unwrap_or_else(|| "Default".to_string()),
            is_default: true,
        }];

        if let Ok(inputs) = host.input_devices() {
            for (i, device) in inputs.enumerate() {
                let Ok(name) = device.name() else { continue };
                let is_default = default_name.as_deref() == Some(name.as_str());
                devices.push(AudioDeviceInfo {
                    id: format!("device:{i}:{name}"),
                    name,
                    is_default,
                });
            }
        }
        devices
    }

    /// Resolves `device_id` (or the default device when `None`), acquires a
    /// mono/16-bit-native line, and starts streaming. Retries up to
    /// [`OPEN_RETRY_ATTEMPTS`] times on a transient format failure,
    /// toggling the attempted byte order each time. Does not fall back to
    /// the default device when a named device fails — the caller decides.
    pub fn open(device_id: Option<&str>, sample_rate_hz: u32, frame_samples: usize) -> Result<Self> {
        let host = cpal::default_host();
        let device = Self::resolve_device(&host, device_id)?;

        let mut endian = Endian::Little;
        let mut last_err: Option<String> = None;
        for attempt in 0..OPEN_RETRY_ATTEMPTS {
            match Self::try_open(&device, sample_rate_hz, frame_samples, endian) {
                Ok(source) => return Ok(source),
                Err(e) => {
                    last_err = Some(e);
                    endian = endian.toggled();
                    if attempt + 1 < OPEN_RETRY_ATTEMPTS {
                        std::thread::sleep(OPEN_RETRY_DELAY);
                    }
                }
            }
        }
        Err(PracticeError::DeviceUnavailable(
            last_err.unwrap_or_else(|| "no supported stream format".to_string()),
        ))
    }

    fn resolve_device(host: &cpal::Host, device_id: Option<&str>) -> Result<cpal::Device> {
        match device_id {
            None | Some("default") => host
                .default_input_device()
                .ok_or_else(|| PracticeError::NoDevice("no default input device".into())),
            Some(id) => {
                let wanted_name = id.splitn(3, ':').last().unwrap_or(id);
                host.input_devices()
                    .map_err(|e| PracticeError::NoDevice(e.to_string()))?
                    .find(|d| d.name().map(|n| n == wanted_name).unwrap_or(false))
                    .ok_or_else(|| PracticeError::NoDevice(format!("device not found: {id}")))
            }
        }
    }

    fn try_open(
        device: &cpal::Device,
        sample_rate_hz: u32,
        frame_samples: usize,
        endian: Endian,
    ) -> std::result::Result<Self, String> {
        let configs = device
            .supported_input_configs()
            .map_err(|e| e.to_string())?
            .collect::<Vec<_>>();
        let chosen = Self::find_supported_config(configs, sample_rate_hz)
            .ok_or_else(|| "no suitable mono 16-bit input format found".to_string())?;

        let sample_rate = cpal::SampleRate(sample_rate_hz);
        let supported = chosen.with_sample_rate(sample_rate);
        let stream_config: cpal::StreamConfig = supported.into();

        let (tx, rx): (Sender<Vec<f32>>, Receiver<Vec<f32>>) = crossbeam_channel::bounded(64);
        let (err_tx, err_rx): (Sender<String>, Receiver<String>) = crossbeam_channel::bounded(16);
        let mut pending: Vec<f32> = Vec::with_capacity(frame_samples * 2);
        let err_fn = move |err: cpal::StreamError| {
            eprintln!("[audio] stream error: {err}");
            let _ = err_tx.try_send(err.to_string());
        };

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    for &raw in data {
                        let sample = decode_i16(raw, endian);
                        pending.push(sample);
                    }
                    while pending.len() >= frame_samples {
                        let frame = pending[..frame_samples].to_vec();
                        let _ = tx.try_send(frame);
                        pending.drain(..frame_samples);
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| e.to_string())?;

        stream.play().map_err(|e| e.to_string())?;

        Ok(Self {
            stream: Some(stream),
            frame_rx: Some(rx),
            error_rx: Some(err_rx),
            frame_samples,
        })
    }

    fn find_supported_config(
        configs: Vec<SupportedStreamConfigRange>,
        target_rate: u32,
    ) -> Option<SupportedStreamConfigRange> {
        configs
            .into_iter()
            .filter(|c| c.channels() == 1 && c.sample_format() == SampleFormat::I16)
            .min_by_key(|c| {
                let min_diff = (c.min_sample_rate().0 as i64 - target_rate as i64).abs();
                let max_diff = (c.max_sample_rate().0 as i64 - target_rate as i64).abs();
                min_diff.min(max_diff)
            })
    }

    /// Blocks until one frame of `frame_samples` floats is available, or
    /// returns `None` once the stream has been closed.
    pub fn read_frame(&self) -> Option<Vec<f32>> {
        self.frame_rx.as_ref()?.recv().ok()
    }

    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    /// Drains one pending transient stream error, if any, without blocking.
    pub fn try_recv_error(&self) -> Option<String> {
        self.error_rx.as_ref()?.try_recv().ok()
    }

    /// Clones of the internal channels, for a worker that needs to
    /// `select!` between frames, errors, and a shutdown signal rather than
    /// block solely on [`read_frame`](Self::read_frame).
    pub(crate) fn channels(&self) -> (Option<Receiver<Vec<f32>>>, Option<Receiver<String>>) {
        (self.frame_rx.clone(), self.error_rx.clone())
    }

    /// Idempotent: stops and releases the line. Safe to call more than
    /// once and safe to rely on via `Drop`.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
            drop(stream);
        }
        self.frame_rx = None;
        self.error_rx = None;
    }
}

impl Drop for AudioSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Converts one native 16-bit PCM sample to a float in `[-1, 1]`:
/// `sample / 32768`. `raw` arrives from cpal already decoded in
/// host-native order; `endian` reflects which byte order this attempt
/// assumed when the line was opened, swapped on retry.
fn decode_i16(raw: i16, endian: Endian) -> f32 {
    let value = match endian {
        Endian::Little => raw,
        Endian::Big => raw.swap_bytes(),
    };
    value as f32 / 32_768.0
}
