//! Unit tests for the slot model.

use std::collections::HashSet;

use super::*;
use crate::constants::{DEFAULT_TEMPLATE, SAVE_FORMAT_VERSION};

#[test]
fn test_slot_names_are_unique() {
    let mut names = HashSet::new();
    for slot in 0..500 {
        assert!(names.insert(slot_info_name(slot)));
        assert!(names.insert(slot_data_name(slot)));
    }
}

#[test]
fn test_slot_names_format() {
    assert_eq!(slot_info_name(7), "7");
    assert_eq!(slot_data_name(7), "7_data");
}

#[test]
fn test_slot_info_bytes_roundtrip() {
    let info = SlotInfo {
        id: 3,
        name: "Harbor".to_string(),
        played_time: 42.5,
        map: "coast".to_string(),
        screenshot: Some("3.png".to_string()),
        ..Default::default()
    };

    let restored = SlotInfo::from_bytes(&info.to_bytes().unwrap()).unwrap();
    assert_eq!(restored, info);
}

#[test]
fn test_slot_info_legacy_fields_default() {
    let json = r#"{
        "id": 1,
        "name": "Old",
        "saved_at": "2020-01-01T00:00:00Z"
    }"#;

    let info = SlotInfo::from_bytes(json.as_bytes()).unwrap();
    assert_eq!(info.id, 1);
    assert!(info.version.is_empty());
    assert_eq!(info.template, DEFAULT_TEMPLATE);
    assert!(info.is_compatible());
}

#[test]
fn test_slot_data_region_lookup() {
    let mut data = SlotData::default();
    data.regions.insert("cave".to_string(), vec![1, 2, 3]);

    assert_eq!(data.region("cave"), Some(&[1u8, 2, 3][..]));
    assert!(data.region("tower").is_none());
}

// Version compatibility tests
#[test]
fn test_compatible_version_same() {
    assert!(is_compatible_version("1.2.0", "1.2.0"));
    assert!(is_compatible_version("1.0.0", "1.4.2"));
    assert!(is_compatible_version(SAVE_FORMAT_VERSION, SAVE_FORMAT_VERSION));
}

#[test]
fn test_incompatible_version() {
    assert!(!is_compatible_version("2.0.0", "1.9.0")); // Newer
    assert!(!is_compatible_version("1.0.0", "2.0.0")); // Major bump
    assert!(!is_compatible_version("0.1.0", "0.2.0")); // 0.x minor bump
    assert!(!is_compatible_version("garbage", "1.0.0"));
}

#[test]
fn test_templates_fall_back_to_default() {
    let templates = SlotTemplates::default();
    let info = templates.instantiate_info(Some("missing"));
    assert_eq!(info.template, DEFAULT_TEMPLATE);

    let data = templates.instantiate_data(None);
    assert_eq!(data.template, DEFAULT_TEMPLATE);
}

#[test]
fn test_templates_registered_factory() {
    let mut templates = SlotTemplates::default();
    templates.register_data("campaign", || SlotData {
        map: "intro".to_string(),
        ..Default::default()
    });

    let data = templates.instantiate_data(Some("campaign"));
    assert_eq!(data.map, "intro");
    assert_eq!(data.template, "campaign");
}
