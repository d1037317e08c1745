//! Property-based tests for the pure parts of the capture core
//!
//! Run with: cargo test --test capture_props

use chrono::{TimeZone, Utc};
use cinecraft::capture::{candidate_list, CODEC_CANDIDATES};
use cinecraft::catalog::classify_devices;
use cinecraft::config::ZoomConfig;
use cinecraft::state::{SessionStateStore, StateAction};
use cinecraft::storage::generate_filename;
use cinecraft::types::{ArtifactKind, LensRole, RawDeviceInfo};
use cinecraft::zoom::{clamp_level, role_for_level};
use proptest::prelude::*;
use std::collections::HashSet;
use std::time::{Duration, Instant};

fn label_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just("Back Camera".to_string()),
        Just("Front Camera".to_string()),
        Just("camera2 1, facing front".to_string()),
        Just("Back Ultra Wide Camera".to_string()),
        Just("Back Telephoto Camera".to_string()),
        Just("camera 0, facing back".to_string()),
        Just("USB Camera".to_string()),
        "[a-zA-Z0-9 ]{0,24}",
    ]
}

fn raw_devices() -> impl Strategy<Value = Vec<RawDeviceInfo>> {
    prop::collection::vec(label_strategy(), 0..8).prop_map(|labels| {
        labels
            .into_iter()
            .enumerate()
            .map(|(i, label)| RawDeviceInfo::video(format!("cam:{}", i), label))
            .collect()
    })
}

// ═══════════════════════════════════════════════════════════════════════════
// ZOOM
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    /// Clamped levels always land in [1, max]
    #[test]
    fn clamped_level_in_range(level in prop::num::f64::ANY, max in 1.0f64..20.0) {
        let clamped = clamp_level(level, max);
        prop_assert!((1.0..=max).contains(&clamped), "{} clamped to {}", level, clamped);
    }

    /// Levels already in range are left alone
    #[test]
    fn in_range_level_unchanged(level in 1.0f64..10.0) {
        prop_assert_eq!(clamp_level(level, 10.0), level);
    }

    /// Higher levels never pick a wider lens
    #[test]
    fn lens_role_monotonic(a in 0.1f64..10.0, b in 0.1f64..10.0) {
        let config = ZoomConfig::default();
        let rank = |role: LensRole| match role {
            LensRole::Ultrawide => 0,
            LensRole::Main => 1,
            LensRole::Telephoto => 2,
        };
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(rank(role_for_level(low, &config)) <= rank(role_for_level(high, &config)));
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// DEVICE CLASSIFICATION
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    /// Classification is a pure function of the listing
    #[test]
    fn classification_is_deterministic(raw in raw_devices()) {
        prop_assert_eq!(classify_devices(&raw), classify_devices(&raw));
    }

    /// Classified devices come from the input, once each, in listing order
    #[test]
    fn classified_ids_are_ordered_subset(raw in raw_devices()) {
        let classified = classify_devices(&raw);
        let input: Vec<&str> = raw.iter().map(|d| d.id.as_str()).collect();

        let mut seen = HashSet::new();
        let mut last = None;
        for device in &classified {
            let position = input.iter().position(|id| *id == device.id);
            prop_assert!(position.is_some(), "{} not in input", device.id);
            prop_assert!(seen.insert(device.id.clone()));
            prop_assert!(last < position, "order not preserved");
            last = position;
        }
        prop_assert_eq!(classified.is_empty(), raw.is_empty());
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SESSION STATE
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    /// Accepted control toggles are at least the debounce window apart
    #[test]
    fn accepted_toggles_are_debounced(gaps in prop::collection::vec(0u64..600, 1..40)) {
        let store = SessionStateStore::new(Duration::from_millis(300));
        let base = Instant::now();

        let mut at = base;
        let mut accepted: Vec<Instant> = Vec::new();
        let mut visible = false;
        for gap in gaps {
            at += Duration::from_millis(gap);
            if store.dispatch_at(StateAction::ToggleControls, at) {
                visible = !visible;
                accepted.push(at);
            }
        }

        for pair in accepted.windows(2) {
            prop_assert!(pair[1] - pair[0] >= Duration::from_millis(300));
        }
        prop_assert_eq!(store.snapshot().controls_visible, visible);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// STORAGE AND CODECS
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    /// Filenames follow PREFIX_YYYY-MM-DD_HH-MM-SS.ext
    #[test]
    fn filename_pattern(secs in 0i64..4_102_444_800, photo in any::<bool>(), ext in "[a-z0-9]{1,5}") {
        let at = Utc.timestamp_opt(secs, 0).single().unwrap();
        let kind = if photo { ArtifactKind::Photo } else { ArtifactKind::Video };
        let name = generate_filename(kind, &ext, at);

        let prefix = if photo { "IMG_" } else { "VID_" };
        prop_assert!(name.starts_with(prefix));
        let suffix = format!(".{}", ext);
        prop_assert!(name.ends_with(&suffix));

        let stamp = &name[4..name.len() - suffix.len()];
        prop_assert_eq!(stamp.len(), 19);
        prop_assert_eq!(stamp, at.format("%Y-%m-%d_%H-%M-%S").to_string());
    }

    /// The preferred codec leads the candidate list, which never repeats a candidate
    #[test]
    fn preferred_codec_first_without_duplicates(
        preferred in prop_oneof![
            Just(None),
            prop::sample::select(CODEC_CANDIDATES).prop_map(|c| Some(c.to_string())),
            "video/[a-z0-9]{1,8}".prop_map(Some),
        ]
    ) {
        let list = candidate_list(preferred.as_deref());

        if let Some(preferred) = &preferred {
            prop_assert_eq!(&list[0], preferred);
        }
        let unique: HashSet<&String> = list.iter().collect();
        prop_assert_eq!(unique.len(), list.len());
        for candidate in CODEC_CANDIDATES {
            prop_assert!(list.iter().any(|c| c == candidate));
        }
    }
}
