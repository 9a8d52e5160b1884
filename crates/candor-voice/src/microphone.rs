//! Bare-metal microphone via CPAL.
//!
//! The cpal `Stream` is !Send on some platforms, so each open capture runs on its own
//! thread which owns the stream; the returned handle talks to it over a channel.
//! Samples are downmixed to mono at the device's native rate.

use crate::capture::{CaptureStream, DeviceFault, MicrophoneBackend, PermissionState, RecordedAudio};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{info, warn};

enum Control {
    Pause,
    Resume,
    Stop,
}

/// Default input device of the default host.
#[derive(Debug, Default)]
pub struct CpalMicrophone;

impl CpalMicrophone {
    pub fn new() -> Self {
        Self
    }

    /// Names of the available input devices.
    pub fn list_input_devices() -> Vec<String> {
        match cpal::default_host().input_devices() {
            Ok(devices) => devices.filter_map(|d| d.name().ok()).collect(),
            Err(e) => {
                warn!("could not enumerate input devices: {}", e);
                Vec::new()
            }
        }
    }
}

fn build_fault(err: &cpal::BuildStreamError) -> DeviceFault {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => DeviceFault::NotFound,
        cpal::BuildStreamError::StreamConfigNotSupported
        | cpal::BuildStreamError::InvalidArgument => DeviceFault::Overconstrained,
        _ => DeviceFault::NotReadable,
    }
}

#[async_trait]
impl MicrophoneBackend for CpalMicrophone {
    async fn query_permission(&self) -> PermissionState {
        // Desktop hosts expose no permission query short of opening the device.
        PermissionState::Unknown
    }

    async fn request(&self) -> Result<(), DeviceFault> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or(DeviceFault::NotFound)?;
        device
            .default_input_config()
            .map(|_| ())
            .map_err(|e| {
                warn!("input device unusable: {}", e);
                DeviceFault::NotReadable
            })
    }

    async fn open(&self) -> Result<Box<dyn CaptureStream>, DeviceFault> {
        let samples = Arc::new(Mutex::new(Vec::<f32>::new()));
        let (control_tx, control_rx) = std_mpsc::channel::<Control>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<u32, DeviceFault>>();

        let buffer = samples.clone();
        let worker = thread::spawn(move || {
            let opened = (|| -> Result<(cpal::Stream, u32), DeviceFault> {
                let device = cpal::default_host()
                    .default_input_device()
                    .ok_or(DeviceFault::NotFound)?;
                info!(
                    "using input device: {}",
                    device.name().unwrap_or_else(|_| "Unknown".to_string())
                );
                let config = device
                    .default_input_config()
                    .map_err(|_| DeviceFault::NotReadable)?
                    .config();
                let channels = config.channels.max(1) as usize;
                let stream = device
                    .build_input_stream(
                        &config,
                        move |data: &[f32], _: &cpal::InputCallbackInfo| {
                            let mut buf = buffer.lock();
                            buf.extend(
                                data.chunks(channels)
                                    .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
                            );
                        },
                        |err| warn!("audio stream error: {}", err),
                        None,
                    )
                    .map_err(|e| build_fault(&e))?;
                stream.play().map_err(|_| DeviceFault::NotReadable)?;
                Ok((stream, config.sample_rate.0))
            })();

            let stream = match opened {
                Ok((stream, rate)) => {
                    let _ = ready_tx.send(Ok(rate));
                    stream
                }
                Err(fault) => {
                    let _ = ready_tx.send(Err(fault));
                    return;
                }
            };
            while let Ok(cmd) = control_rx.recv() {
                match cmd {
                    Control::Pause => {
                        if let Err(e) = stream.pause() {
                            warn!("pause failed: {}", e);
                        }
                    }
                    Control::Resume => {
                        if let Err(e) = stream.play() {
                            warn!("resume failed: {}", e);
                        }
                    }
                    Control::Stop => break,
                }
            }
            drop(stream);
            info!("microphone released");
        });

        let sample_rate = ready_rx.await.map_err(|_| DeviceFault::NotReadable)??;
        Ok(Box::new(CpalStream {
            control: control_tx,
            samples,
            sample_rate,
            worker: Some(worker),
        }))
    }
}

struct CpalStream {
    control: std_mpsc::Sender<Control>,
    samples: Arc<Mutex<Vec<f32>>>,
    sample_rate: u32,
    worker: Option<JoinHandle<()>>,
}

impl CaptureStream for CpalStream {
    fn pause(&mut self) {
        let _ = self.control.send(Control::Pause);
    }

    fn resume(&mut self) {
        let _ = self.control.send(Control::Resume);
    }

    fn finish(mut self: Box<Self>) -> RecordedAudio {
        let _ = self.control.send(Control::Stop);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        let samples = std::mem::take(&mut *self.samples.lock());
        let duration = Duration::from_secs_f64(samples.len() as f64 / self.sample_rate.max(1) as f64);
        RecordedAudio {
            samples,
            sample_rate: self.sample_rate,
            duration,
        }
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        let _ = self.control.send(Control::Stop);
    }
}
