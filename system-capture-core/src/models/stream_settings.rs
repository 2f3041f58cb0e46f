use std::time::Duration;

use super::config::CaptureConfiguration;

/// Smallest video surface the capture APIs accept without complaint.
pub const MINIMAL_VIDEO_WIDTH: u32 = 100;
pub const MINIMAL_VIDEO_HEIGHT: u32 = 100;

/// One video frame per second at most.
pub const MINIMAL_FRAME_INTERVAL: Duration = Duration::from_secs(1);

pub const STREAM_QUEUE_DEPTH: u32 = 3;

/// Everything a backend needs to build an OS capture stream.
///
/// Screen capture APIs only deliver audio from a video-capable stream, so
/// video stays nominally enabled at the cheapest settings and its frames are
/// discarded by the session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamSettings {
    pub captures_audio: bool,
    pub sample_rate: f64,
    pub channel_count: u16,
    pub excludes_current_process_audio: bool,
    pub width: u32,
    pub height: u32,
    pub minimum_frame_interval: Duration,
    pub queue_depth: u32,
    pub shows_cursor: bool,
}

impl StreamSettings {
    /// Audio-only settings for the given configuration.
    pub fn for_audio(config: &CaptureConfiguration) -> Self {
        Self {
            captures_audio: true,
            sample_rate: config.sample_rate,
            channel_count: config.channel_count,
            excludes_current_process_audio: true,
            width: MINIMAL_VIDEO_WIDTH,
            height: MINIMAL_VIDEO_HEIGHT,
            minimum_frame_interval: MINIMAL_FRAME_INTERVAL,
            queue_depth: STREAM_QUEUE_DEPTH,
            shows_cursor: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_settings_follow_configuration() {
        let config = CaptureConfiguration {
            sample_rate: 48000.0,
            channel_count: 2,
        };
        let settings = StreamSettings::for_audio(&config);

        assert!(settings.captures_audio);
        assert_eq!(settings.sample_rate, 48000.0);
        assert_eq!(settings.channel_count, 2);
        assert!(settings.excludes_current_process_audio);
        assert!(!settings.shows_cursor);
    }

    #[test]
    fn video_surface_is_minimal() {
        let settings = StreamSettings::for_audio(&CaptureConfiguration::default());

        assert_eq!((settings.width, settings.height), (100, 100));
        assert_eq!(settings.minimum_frame_interval, Duration::from_secs(1));
        assert_eq!(settings.queue_depth, 3);
    }
}
