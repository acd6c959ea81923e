use async_trait::async_trait;
use log::info;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::error::MediaAccessError;
use crate::media::source::LocalMediaSource;

/// Platform capture seam.
///
/// `acquire` requests combined audio+video capture. Denial, device
/// absence and device-in-use surface as [`MediaAccessError`]; callers
/// must not retry automatically (the platform will not re-prompt once
/// denied within a page lifetime).
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn acquire(&self) -> Result<LocalMediaSource, MediaAccessError>;
}

/// Built-in capture backend producing a silent Opus track and a blank
/// VP8 track. Stands in for real camera/microphone capture in demos and
/// tests; a UI shell supplies its own [`MediaDevices`] implementation.
#[derive(Debug, Default, Clone)]
pub struct SyntheticDevices {
    pub stream_id: Option<String>,
}

#[async_trait]
impl MediaDevices for SyntheticDevices {
    async fn acquire(&self) -> Result<LocalMediaSource, MediaAccessError> {
        let stream_id = self.stream_id.clone().unwrap_or_else(|| "proxichat".to_owned());
        let audio = TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48_000,
                channels: 2,
                ..Default::default()
            },
            "audio".to_owned(),
            stream_id.clone(),
        );
        let video = TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90_000,
                ..Default::default()
            },
            "video".to_owned(),
            stream_id,
        );
        info!("synthetic media source acquired");
        Ok(LocalMediaSource::new(audio, video))
    }
}
