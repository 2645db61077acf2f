use proptest::prelude::*;
use soundbar_sdk::player::{level_to_device, round_level};
use soundbar_sdk::track::parse_duration;
use soundbar_sdk::{Callbacks, Soundbar, SoundbarConfig, SoundbarError, TransportState};

const KNOWN_STATES: [&str; 8] = [
    "idle",
    "NO_MEDIA_PRESENT",
    "playing",
    "PLAYING",
    "paused",
    "PAUSED_PLAYBACK",
    "off",
    "STOPPED",
];

proptest! {
    #[test]
    fn device_volume_stays_in_range(level in 0.0f64..=1.0) {
        let wire = level_to_device(level);
        prop_assert!((0..=100).contains(&wire));
        prop_assert!((round_level(level) - level).abs() <= 0.005 + 1e-9);
    }

    #[test]
    fn device_volume_round_trips_whole_steps(step in 0i64..=100) {
        prop_assert_eq!(level_to_device(step as f64 / 100.0), step);
    }

    #[test]
    fn local_volume_accepts_unit_range(level in 0.0f64..=1.0) {
        let soundbar = Soundbar::new(SoundbarConfig::for_ip("192.0.2.1"), Callbacks::new()).unwrap();
        soundbar.set_volume_level_local(level).unwrap();
        prop_assert_eq!(soundbar.player_state().volume_level, Some(round_level(level)));
    }

    #[test]
    fn local_volume_rejects_out_of_range(
        level in prop_oneof![1.0001f64..1000.0, -1000.0f64..-0.0001]
    ) {
        let soundbar = Soundbar::new(SoundbarConfig::for_ip("192.0.2.1"), Callbacks::new()).unwrap();
        let err = soundbar.set_volume_level_local(level).unwrap_err();
        prop_assert!(matches!(err, SoundbarError::InvalidParameter(_)));
        prop_assert_eq!(soundbar.player_state().volume_level, None);
    }

    #[test]
    fn unrecognised_transport_strings_are_unknown(value in "\\PC*") {
        prop_assume!(!KNOWN_STATES.contains(&value.trim()));
        prop_assert_eq!(TransportState::from_event(&value), TransportState::Unknown);
    }

    #[test]
    fn known_transport_strings_survive_padding(
        index in 0usize..KNOWN_STATES.len(),
        padding in "[ \t]{0,3}",
    ) {
        let value = format!("{padding}{}{padding}", KNOWN_STATES[index]);
        prop_assert_ne!(TransportState::from_event(&value), TransportState::Unknown);
        prop_assert_eq!(
            TransportState::from_event(&value),
            TransportState::from_event(KNOWN_STATES[index])
        );
    }

    #[test]
    fn durations_are_whole_seconds(h in 0u64..24, m in 0u64..60, s in 0u64..60, ms in 0u32..1000) {
        let text = format!("{h}:{m:02}:{s:02}.{ms:03}");
        prop_assert_eq!(parse_duration(&text), (h * 3600 + m * 60 + s) as f64);
    }

    #[test]
    fn garbage_durations_are_zero(text in "[a-zA-Z ]*") {
        prop_assert_eq!(parse_duration(&text), 0.0);
    }
}
