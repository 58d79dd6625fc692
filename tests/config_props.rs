//! Property-based tests for settings validation and size negotiation

use crabcapture::device::pick_size;
use crabcapture::recording::RecordVideoOptions;
use crabcapture::types::Size;
use crabcapture::CaptureSettings;
use proptest::prelude::*;

proptest! {
    /// INVARIANT: fps is accepted exactly in 1..=240
    #[test]
    fn fps_validation_matches_range(fps in 0u32..400) {
        let mut settings = CaptureSettings::default();
        settings.video.fps = fps;
        prop_assert_eq!(settings.validate().is_ok(), (1..=240).contains(&fps));
    }

    /// INVARIANT: a negotiated size is always either the preferred one or a supported one
    #[test]
    fn picked_size_is_preferred_or_supported(
        preferred in (1u32..4000, 1u32..3000).prop_map(|(w, h)| Size::new(w, h)),
        supported in prop::collection::vec(
            (1u32..4000, 1u32..3000).prop_map(|(w, h)| Size::new(w, h)),
            0..5,
        ),
    ) {
        let picked = pick_size(preferred, &supported);
        if supported.is_empty() || supported.contains(&preferred) {
            prop_assert_eq!(picked, preferred);
        } else {
            prop_assert_eq!(picked, supported[0]);
        }
    }

    /// INVARIANT: recording options inherit the configured defaults
    #[test]
    fn video_options_follow_settings(fps in 1u32..=240, bitrate in 100_000u32..50_000_000) {
        let mut settings = CaptureSettings::default();
        settings.video.fps = fps;
        settings.video.bitrate = bitrate;
        let options = RecordVideoOptions::new("clip.mp4", &settings);
        prop_assert_eq!(options.fps, fps);
        prop_assert_eq!(options.bitrate, bitrate);
        prop_assert_eq!(options.size(), settings.video_size());
    }
}
