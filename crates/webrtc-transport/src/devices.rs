//! Local audio endpoints: where captured audio comes from and where remote
//! audio goes.

use parley_core::MediaAccessError;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::audio_utils::PCMU_SAMPLE_RATE;

/// Frames buffered between a capture device and the track writer.
pub(crate) const CAPTURE_QUEUE: usize = 64;

/// A running input stream delivering mono f32 frames.
pub struct AudioCapture {
    pub sample_rate: u32,
    pub frames: mpsc::Receiver<Vec<f32>>,
    // Dropping this stops the underlying device stream.
    _guard: Option<Box<dyn Send + Sync>>,
}

impl AudioCapture {
    pub fn new(
        sample_rate: u32,
        frames: mpsc::Receiver<Vec<f32>>,
        guard: Option<Box<dyn Send + Sync>>,
    ) -> Self {
        Self {
            sample_rate,
            frames,
            _guard: guard,
        }
    }
}

/// A sink for remote audio.
pub trait AudioPlayback: Send + Sync {
    fn sample_rate(&self) -> u32;

    /// Queues mono samples at [`AudioPlayback::sample_rate`].
    fn play(&self, samples: &[f32]);

    fn stop(&self);
}

/// Opens local audio devices on behalf of the transport.
pub trait AudioDevices: Send + Sync {
    fn open_capture(&self) -> Result<AudioCapture, MediaAccessError>;

    fn open_playback(&self) -> Result<Arc<dyn AudioPlayback>, MediaAccessError>;
}

/// Devices for headless use: capture yields nothing, playback discards.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentDevices;

struct DiscardPlayback;

impl AudioPlayback for DiscardPlayback {
    fn sample_rate(&self) -> u32 {
        PCMU_SAMPLE_RATE
    }

    fn play(&self, _samples: &[f32]) {}

    fn stop(&self) {}
}

impl AudioDevices for SilentDevices {
    fn open_capture(&self) -> Result<AudioCapture, MediaAccessError> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(AudioCapture::new(PCMU_SAMPLE_RATE, rx, None))
    }

    fn open_playback(&self) -> Result<Arc<dyn AudioPlayback>, MediaAccessError> {
        Ok(Arc::new(DiscardPlayback))
    }
}

#[cfg(feature = "device-audio")]
pub use cpal_devices::CpalDevices;

#[cfg(feature = "device-audio")]
mod cpal_devices {
    use super::{AudioCapture, AudioDevices, AudioPlayback, CAPTURE_QUEUE};
    use cpal::{
        SampleFormat, StreamConfig,
        traits::{DeviceTrait, HostTrait, StreamTrait},
    };
    use parley_core::MediaAccessError;
    use ringbuf::{
        HeapProd, HeapRb,
        traits::{Consumer, Producer, Split},
    };
    use std::{
        sync::{Arc, Mutex, mpsc as std_mpsc},
        thread,
    };
    use tokio::sync::mpsc;
    use tracing::{error, info, warn};

    /// Two seconds of output at 48 kHz.
    const PLAYBACK_BUFFER: usize = 96_000;

    /// The host's default input and output devices.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct CpalDevices;

    /// Keeps a device stream alive on its own thread until dropped.
    ///
    /// `cpal::Stream` cannot cross threads, so the stream is built and owned by
    /// a dedicated thread that parks until the stop sender goes away.
    struct StreamThread {
        _stop: std_mpsc::Sender<()>,
    }

    fn spawn_stream<F>(name: &str, build: F) -> Result<(StreamThread, u32), MediaAccessError>
    where
        F: FnOnce() -> Result<(cpal::Stream, u32), MediaAccessError> + Send + 'static,
    {
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std_mpsc::channel();
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let stream = match build() {
                    Ok((stream, rate)) => {
                        let _ = ready_tx.send(Ok(rate));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Returns once the sender is dropped.
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| MediaAccessError::Unavailable(e.to_string()))?;

        let rate = ready_rx
            .recv()
            .map_err(|_| MediaAccessError::Unavailable("audio thread exited".to_string()))??;
        Ok((StreamThread { _stop: stop_tx }, rate))
    }

    fn unavailable(e: impl std::fmt::Display) -> MediaAccessError {
        MediaAccessError::Unavailable(e.to_string())
    }

    fn build_input(tx: mpsc::Sender<Vec<f32>>) -> Result<(cpal::Stream, u32), MediaAccessError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(MediaAccessError::NoDevice)?;
        let supported = device.default_input_config().map_err(unavailable)?;
        let format = supported.sample_format();
        let config: StreamConfig = supported.into();
        let channels = config.channels as usize;
        let rate = config.sample_rate.0;
        info!(device = device.name().unwrap_or_default(), rate, channels, ?format, "Opening input device");

        let on_error = |e: cpal::StreamError| error!(error = %e, "Input stream error");
        let stream = match format {
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mono = data.chunks(channels).map(|f| f[0]).collect();
                    if tx.try_send(mono).is_err() {
                        warn!("Capture queue full, dropping frame");
                    }
                },
                on_error,
                None,
            ),
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let mono = data
                        .chunks(channels)
                        .map(|f| f[0] as f32 / 32768.0)
                        .collect();
                    if tx.try_send(mono).is_err() {
                        warn!("Capture queue full, dropping frame");
                    }
                },
                on_error,
                None,
            ),
            other => {
                return Err(MediaAccessError::Unavailable(format!(
                    "unsupported input sample format {other:?}"
                )));
            }
        }
        .map_err(unavailable)?;
        stream.play().map_err(unavailable)?;
        Ok((stream, rate))
    }

    fn build_output(
        mut consumer: ringbuf::HeapCons<f32>,
    ) -> Result<(cpal::Stream, u32), MediaAccessError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(MediaAccessError::NoDevice)?;
        let supported = device.default_output_config().map_err(unavailable)?;
        if supported.sample_format() != SampleFormat::F32 {
            return Err(MediaAccessError::Unavailable(format!(
                "unsupported output sample format {:?}",
                supported.sample_format()
            )));
        }
        let config: StreamConfig = supported.into();
        let channels = config.channels as usize;
        let rate = config.sample_rate.0;
        info!(device = device.name().unwrap_or_default(), rate, channels, "Opening output device");

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(channels) {
                        let sample = consumer.try_pop().unwrap_or(0.0);
                        frame.fill(sample);
                    }
                },
                |e: cpal::StreamError| error!(error = %e, "Output stream error"),
                None,
            )
            .map_err(unavailable)?;
        stream.play().map_err(unavailable)?;
        Ok((stream, rate))
    }

    struct CpalPlayback {
        rate: u32,
        producer: Mutex<HeapProd<f32>>,
        thread: Mutex<Option<StreamThread>>,
    }

    impl AudioPlayback for CpalPlayback {
        fn sample_rate(&self) -> u32 {
            self.rate
        }

        fn play(&self, samples: &[f32]) {
            let mut producer = self.producer.lock().unwrap_or_else(|e| e.into_inner());
            let written = producer.push_slice(samples);
            if written < samples.len() {
                warn!(dropped = samples.len() - written, "Playback buffer full");
            }
        }

        fn stop(&self) {
            self.thread.lock().unwrap_or_else(|e| e.into_inner()).take();
        }
    }

    impl AudioDevices for CpalDevices {
        fn open_capture(&self) -> Result<AudioCapture, MediaAccessError> {
            let (tx, rx) = mpsc::channel(CAPTURE_QUEUE);
            let (thread, rate) = spawn_stream("parley-capture", move || build_input(tx))?;
            Ok(AudioCapture::new(rate, rx, Some(Box::new(thread))))
        }

        fn open_playback(&self) -> Result<Arc<dyn AudioPlayback>, MediaAccessError> {
            let (producer, consumer) = HeapRb::<f32>::new(PLAYBACK_BUFFER).split();
            let (thread, rate) = spawn_stream("parley-playback", move || build_output(consumer))?;
            Ok(Arc::new(CpalPlayback {
                rate,
                producer: Mutex::new(producer),
                thread: Mutex::new(Some(thread)),
            }))
        }
    }
}
