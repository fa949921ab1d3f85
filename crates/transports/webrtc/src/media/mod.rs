//! Local media track state
//!
//! The capture tracks a participant sends to its peer, plus the enabled
//! flags that tutor control commands act on. Tracks are owned exclusively
//! by the process that captured them; remote commands only ever reach
//! them through [`LocalMedia::set_enabled`], never by direct reference.
//!
//! Sample pumps (whatever feeds captured frames into the tracks) must
//! check [`LocalMedia::should_send`] per frame; a muted or stopped track
//! keeps its transceiver but goes silent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::error::{Error, Result};

/// Media track kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Microphone audio
    Audio,
    /// Camera video
    Video,
}

impl MediaKind {
    /// Kind name for logging
    pub fn name(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

/// Provides local capture tracks
///
/// The embedding application implements this against its capture stack.
/// [`NullCaptureDevice`] produces placeholder tracks for headless
/// deployments and tests.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Open the microphone track
    async fn open_audio(&self) -> Result<Arc<TrackLocalStaticSample>>;
    /// Open the camera track
    async fn open_video(&self) -> Result<Arc<TrackLocalStaticSample>>;
}

/// Capture device producing tracks that are never fed samples
pub struct NullCaptureDevice;

#[async_trait]
impl CaptureDevice for NullCaptureDevice {
    async fn open_audio(&self) -> Result<Arc<TrackLocalStaticSample>> {
        Ok(Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                ..Default::default()
            },
            "audio".to_owned(),
            "lessonlive".to_owned(),
        )))
    }

    async fn open_video(&self) -> Result<Arc<TrackLocalStaticSample>> {
        Ok(Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                ..Default::default()
            },
            "video".to_owned(),
            "lessonlive".to_owned(),
        )))
    }
}

/// Outcome of local media acquisition
///
/// A failed track degrades the session instead of aborting it: an
/// audio-only or video-only lesson is still a lesson.
pub struct MediaAcquisition {
    /// The usable local media, possibly with missing tracks
    pub media: LocalMedia,
    /// Why audio is unavailable, if it is
    pub audio_error: Option<Error>,
    /// Why video is unavailable, if it is
    pub video_error: Option<Error>,
}

impl MediaAcquisition {
    /// Whether at least one track failed to open
    pub fn is_degraded(&self) -> bool {
        self.audio_error.is_some() || self.video_error.is_some()
    }
}

/// Local capture tracks and their control flags
///
/// Cheap to clone; clones share the flags, so a UI can hold one clone
/// for mute indicators while the controller owns another.
#[derive(Clone)]
pub struct LocalMedia {
    audio: Option<Arc<TrackLocalStaticSample>>,
    video: Option<Arc<TrackLocalStaticSample>>,
    audio_enabled: Arc<AtomicBool>,
    video_enabled: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl LocalMedia {
    /// Acquire local capture, degrading per-track on failure
    pub async fn acquire(device: &dyn CaptureDevice) -> MediaAcquisition {
        let (audio, audio_error) = match device.open_audio().await {
            Ok(track) => (Some(track), None),
            Err(e) => {
                warn!(error = %e, "Audio capture failed, continuing without audio");
                (None, Some(e))
            }
        };
        let (video, video_error) = match device.open_video().await {
            Ok(track) => (Some(track), None),
            Err(e) => {
                warn!(error = %e, "Video capture failed, continuing without video");
                (None, Some(e))
            }
        };

        MediaAcquisition {
            media: Self {
                audio,
                video,
                audio_enabled: Arc::new(AtomicBool::new(true)),
                video_enabled: Arc::new(AtomicBool::new(true)),
                stopped: Arc::new(AtomicBool::new(false)),
            },
            audio_error,
            video_error,
        }
    }

    /// The tracks to attach to a peer connection
    pub fn tracks(&self) -> Vec<Arc<dyn TrackLocal + Send + Sync>> {
        let mut tracks: Vec<Arc<dyn TrackLocal + Send + Sync>> = Vec::new();
        if let Some(audio) = &self.audio {
            tracks.push(Arc::clone(audio) as Arc<dyn TrackLocal + Send + Sync>);
        }
        if let Some(video) = &self.video {
            tracks.push(Arc::clone(video) as Arc<dyn TrackLocal + Send + Sync>);
        }
        tracks
    }

    /// Whether an audio track was acquired
    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    /// Whether a video track was acquired
    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    /// Enable or disable a track kind
    pub fn set_enabled(&self, kind: MediaKind, enabled: bool) {
        let flag = match kind {
            MediaKind::Audio => &self.audio_enabled,
            MediaKind::Video => &self.video_enabled,
        };
        flag.store(enabled, Ordering::Release);
    }

    /// Whether the audio track is enabled
    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled.load(Ordering::Acquire)
    }

    /// Whether the video track is enabled
    pub fn video_enabled(&self) -> bool {
        self.video_enabled.load(Ordering::Acquire)
    }

    /// Whether a sample pump should feed this track kind right now
    pub fn should_send(&self, kind: MediaKind) -> bool {
        if self.stopped.load(Ordering::Acquire) {
            return false;
        }
        match kind {
            MediaKind::Audio => self.audio.is_some() && self.audio_enabled(),
            MediaKind::Video => self.video.is_some() && self.video_enabled(),
        }
    }

    /// Stop all capture; used on session teardown
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// Whether capture has been stopped
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}
