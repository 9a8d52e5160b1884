//! Reply playback. `play` resolves when the audio has finished or `stop` was called.
//!
//! Output is keyed by session: stopping one interview never cuts off another's reply.

use crate::error::VoiceResult;
use crate::tts::AudioHandle;
use async_trait::async_trait;
use candor_core::SessionId;
use std::sync::atomic::{AtomicUsize, Ordering};

#[async_trait]
pub trait Playback: Send + Sync {
    async fn play(&self, session_id: &SessionId, handle: &AudioHandle) -> VoiceResult<()>;

    /// Interrupt the session's audio. Safe to call when it is silent.
    fn stop(&self, session_id: &SessionId);

    fn is_playing(&self, session_id: &SessionId) -> bool;
}

/// Discards audio immediately. Used headless.
#[derive(Debug, Default)]
pub struct NullPlayback {
    plays: AtomicUsize,
    stops: AtomicUsize,
}

impl NullPlayback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Playback for NullPlayback {
    async fn play(&self, _session_id: &SessionId, _handle: &AudioHandle) -> VoiceResult<()> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self, _session_id: &SessionId) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn is_playing(&self, _session_id: &SessionId) -> bool {
        false
    }
}

#[cfg(feature = "hardware")]
mod speaker {
    use super::*;
    use crate::error::VoiceError;
    use crate::tts::AudioSource;
    use dashmap::DashMap;
    use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
    use std::io::Cursor;
    use std::sync::atomic::AtomicBool;
    use std::sync::{mpsc as std_mpsc, Arc};
    use std::thread;
    use std::time::Duration;
    use tokio::sync::Notify;
    use tracing::{info, warn};

    const POLL: Duration = Duration::from_millis(50);

    /// One session's output: its own sink on the shared mixer.
    struct Channel {
        sink: Sink,
        stopped: Notify,
        direct_playing: AtomicBool,
    }

    /// Default output device through `rodio`, one `Sink` per session.
    ///
    /// `OutputStream` is !Send, so a dedicated thread owns it for the lifetime of this
    /// value; sinks are created from its handle and mixed by rodio.
    pub struct SpeakerPlayback {
        handle: OutputStreamHandle,
        channels: DashMap<SessionId, Arc<Channel>>,
        _shutdown: std_mpsc::Sender<()>,
    }

    impl SpeakerPlayback {
        pub fn new() -> VoiceResult<Self> {
            let (ready_tx, ready_rx) = std_mpsc::channel::<VoiceResult<OutputStreamHandle>>();
            let (shutdown_tx, shutdown_rx) = std_mpsc::channel::<()>();
            thread::spawn(move || match OutputStream::try_default() {
                Ok((_stream, handle)) => {
                    let _ = ready_tx.send(Ok(handle));
                    // Keep the stream alive until the owner is dropped.
                    let _ = shutdown_rx.recv();
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(VoiceError::Playback(e.to_string())));
                }
            });
            let handle = ready_rx
                .recv()
                .map_err(|_| VoiceError::Playback("output thread exited".to_string()))??;
            info!("speaker playback ready");
            Ok(Self {
                handle,
                channels: DashMap::new(),
                _shutdown: shutdown_tx,
            })
        }

        fn channel(&self, session_id: &SessionId) -> VoiceResult<Arc<Channel>> {
            if let Some(existing) = self.channels.get(session_id) {
                return Ok(existing.clone());
            }
            let sink = Sink::try_new(&self.handle).map_err(|e| VoiceError::Playback(e.to_string()))?;
            let channel = Arc::new(Channel {
                sink,
                stopped: Notify::new(),
                direct_playing: AtomicBool::new(false),
            });
            Ok(self
                .channels
                .entry(session_id.clone())
                .or_insert(channel)
                .clone())
        }
    }

    async fn wait_until_empty(sink: &Sink) {
        while !sink.empty() {
            tokio::time::sleep(POLL).await;
        }
    }

    #[async_trait]
    impl Playback for SpeakerPlayback {
        async fn play(&self, session_id: &SessionId, handle: &AudioHandle) -> VoiceResult<()> {
            let channel = self.channel(session_id)?;
            // Registered before any audio starts so a concurrent stop() is never missed.
            let stopped = channel.stopped.notified();
            tokio::pin!(stopped);
            stopped.as_mut().enable();

            match &handle.source {
                AudioSource::Asset { bytes, .. } => {
                    let source = rodio::Decoder::new(Cursor::new(bytes.clone()))
                        .map_err(|e| VoiceError::Playback(format!("Decode failed: {}", e)))?;
                    channel.sink.append(source.convert_samples::<f32>());
                    tokio::select! {
                        _ = &mut stopped => {}
                        _ = wait_until_empty(&channel.sink) => {}
                    }
                }
                AudioSource::DirectPlayback => {
                    // Already audible; hold the turn for its spoken length.
                    channel.direct_playing.store(true, Ordering::SeqCst);
                    tokio::select! {
                        _ = &mut stopped => {}
                        _ = tokio::time::sleep(handle.duration) => {}
                    }
                    channel.direct_playing.store(false, Ordering::SeqCst);
                }
            }
            Ok(())
        }

        fn stop(&self, session_id: &SessionId) {
            let Some((_, channel)) = self.channels.remove(session_id) else {
                return;
            };
            if !channel.sink.empty() || channel.direct_playing.load(Ordering::SeqCst) {
                warn!(session = %session_id, "playback interrupted");
            }
            channel.sink.stop();
            channel.stopped.notify_waiters();
        }

        fn is_playing(&self, session_id: &SessionId) -> bool {
            self.channels
                .get(session_id)
                .map(|c| !c.sink.empty() || c.direct_playing.load(Ordering::SeqCst))
                .unwrap_or(false)
        }
    }
}

#[cfg(feature = "hardware")]
pub use speaker::SpeakerPlayback;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn null_playback_counts() {
        let p = NullPlayback::new();
        let session = SessionId::from("s1");
        let handle = AudioHandle::asset(vec![0], "audio/mpeg", Duration::from_secs(1), "test");
        tokio_test::assert_ok!(tokio_test::block_on(p.play(&session, &handle)));
        p.stop(&session);
        assert_eq!(p.plays(), 1);
        assert_eq!(p.stops(), 1);
        assert!(!p.is_playing(&session));
    }
}
