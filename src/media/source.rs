use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;
use webrtc::media::Sample;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

/// One local capture track.
///
/// `enabled` gates the sample pump: a disabled track swallows writes
/// instead of feeding the peer connection, which is how mute/video-off
/// work without renegotiation.
#[derive(Clone)]
pub struct LocalTrack {
    track: Arc<TrackLocalStaticSample>,
    kind: MediaKind,
    enabled: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl LocalTrack {
    fn new(track: TrackLocalStaticSample, kind: MediaKind, stopped: Arc<AtomicBool>) -> Self {
        Self {
            track: Arc::new(track),
            kind,
            enabled: Arc::new(AtomicBool::new(true)),
            stopped,
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// The RTP-side track handle attached to the peer connection.
    pub fn rtp(&self) -> Arc<TrackLocalStaticSample> {
        Arc::clone(&self.track)
    }

    /// Feed one captured sample. Returns `false` when the sample was
    /// dropped because the track is disabled or capture was released.
    pub async fn write_sample(&self, sample: &Sample) -> Result<bool, webrtc::Error> {
        if self.stopped.load(Ordering::Relaxed) || !self.is_enabled() {
            return Ok(false);
        }
        self.track.write_sample(sample).await?;
        Ok(true)
    }
}

/// The local capture handle: one audio and one video track, owned
/// exclusively by the session controller and only lent to the peer
/// session for track attachment.
pub struct LocalMediaSource {
    tracks: Vec<LocalTrack>,
    stopped: Arc<AtomicBool>,
}

impl LocalMediaSource {
    pub(crate) fn new(audio: TrackLocalStaticSample, video: TrackLocalStaticSample) -> Self {
        let stopped = Arc::new(AtomicBool::new(false));
        let tracks = vec![
            LocalTrack::new(audio, MediaKind::Audio, Arc::clone(&stopped)),
            LocalTrack::new(video, MediaKind::Video, Arc::clone(&stopped)),
        ];
        Self { tracks, stopped }
    }

    pub fn tracks(&self) -> &[LocalTrack] {
        &self.tracks
    }

    /// Flip the enabled flag of every track of `kind`.
    pub fn set_enabled(&self, kind: MediaKind, enabled: bool) {
        for track in self.tracks.iter().filter(|t| t.kind() == kind) {
            track.set_enabled(enabled);
        }
    }

    /// Whether every track of `kind` is currently enabled.
    pub fn is_enabled(&self, kind: MediaKind) -> bool {
        self.tracks
            .iter()
            .filter(|t| t.kind() == kind)
            .all(LocalTrack::is_enabled)
    }

    /// Stop capture. Idempotent: the second call is a no-op.
    pub fn release(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("local media source released");
    }

    pub fn is_released(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl Drop for LocalMediaSource {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::media::devices::{MediaDevices, SyntheticDevices};

    async fn source() -> LocalMediaSource {
        SyntheticDevices::default().acquire().await.unwrap()
    }

    fn sample() -> Sample {
        Sample {
            data: Bytes::from_static(&[0u8; 16]),
            duration: Duration::from_millis(20),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn tracks_start_enabled() {
        let source = source().await;
        assert!(source.is_enabled(MediaKind::Audio));
        assert!(source.is_enabled(MediaKind::Video));
    }

    #[tokio::test]
    async fn mute_gates_audio_only() {
        let source = source().await;
        source.set_enabled(MediaKind::Audio, false);
        assert!(!source.is_enabled(MediaKind::Audio));
        assert!(source.is_enabled(MediaKind::Video));

        for track in source.tracks() {
            let delivered = track.write_sample(&sample()).await.unwrap();
            assert_eq!(delivered, track.kind() == MediaKind::Video);
        }
    }

    #[tokio::test]
    async fn mute_unmute_restores_state() {
        let source = source().await;
        source.set_enabled(MediaKind::Audio, false);
        source.set_enabled(MediaKind::Audio, true);
        assert!(source.is_enabled(MediaKind::Audio));
        assert!(source.is_enabled(MediaKind::Video));
    }

    #[tokio::test]
    async fn release_is_idempotent_and_stops_writes() {
        let source = source().await;
        source.release();
        source.release();
        assert!(source.is_released());
        for track in source.tracks() {
            assert!(!track.write_sample(&sample()).await.unwrap());
        }
    }
}
