// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `checksum.rs`

#[cfg(test)]
mod tests {
    use crate::checksum::{
        calculate_map_checksum, calculate_secret_checksum, get_object_checksum,
        is_rotation_requested, is_unchanged, mark_rotated, set_object_checksum,
    };
    use crate::labels::{LAST_ROTATION_ANNOTATION, ROTATE_ANNOTATION};
    use k8s_openapi::ByteString;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, Vec<u8>> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.as_bytes().to_vec()))
            .collect()
    }

    #[test]
    fn test_checksum_is_deterministic() {
        let a = data(&[("tls.crt", "cert"), ("tls.key", "key")]);
        let b = data(&[("tls.key", "key"), ("tls.crt", "cert")]);
        assert_eq!(calculate_map_checksum(&a), calculate_map_checksum(&b));
        assert_eq!(calculate_map_checksum(&a).len(), 64);
        assert!(calculate_map_checksum(&a)
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_secret_checksum_matches_raw_bytes() {
        let secret: BTreeMap<String, ByteString> = BTreeMap::from([
            ("tls.crt".to_string(), ByteString(b"cert".to_vec())),
            ("tls.key".to_string(), ByteString(b"key".to_vec())),
        ]);
        let raw = data(&[("tls.crt", "cert"), ("tls.key", "key")]);
        assert_eq!(calculate_secret_checksum(Some(&secret)), calculate_map_checksum(&raw));
        assert_eq!(
            calculate_secret_checksum(None),
            calculate_map_checksum(&BTreeMap::<String, Vec<u8>>::new())
        );
    }

    #[test]
    fn test_checksum_changes_on_single_byte() {
        let a = data(&[("tls.crt", "cert")]);
        let b = data(&[("tls.crt", "cerT")]);
        assert_ne!(calculate_map_checksum(&a), calculate_map_checksum(&b));
    }

    #[test]
    fn test_checksum_separates_keys_and_values() {
        let a = data(&[("ab", "c")]);
        let b = data(&[("a", "bc")]);
        assert_ne!(calculate_map_checksum(&a), calculate_map_checksum(&b));
    }

    #[test]
    fn test_checksum_accepts_string_values() {
        let mut strings = BTreeMap::new();
        strings.insert("config".to_string(), "value".to_string());
        let bytes = data(&[("config", "value")]);
        assert_eq!(
            calculate_map_checksum(&strings),
            calculate_map_checksum(&bytes)
        );
    }

    #[test]
    fn test_set_and_get_object_checksum() {
        let mut meta = ObjectMeta::default();
        assert!(get_object_checksum(&meta).is_none());
        set_object_checksum(&mut meta, "abc");
        assert_eq!(get_object_checksum(&meta), Some("abc"));
    }

    #[test]
    fn test_rotation_marker_round() {
        let mut meta = ObjectMeta {
            annotations: Some(BTreeMap::from([(
                ROTATE_ANNOTATION.to_string(),
                String::new(),
            )])),
            ..Default::default()
        };
        assert!(is_rotation_requested(&meta));

        mark_rotated(&mut meta, chrono::Utc::now());
        assert!(!is_rotation_requested(&meta));
        let annotations = meta.annotations.unwrap();
        assert!(annotations.contains_key(LAST_ROTATION_ANNOTATION));
    }

    #[test]
    fn test_is_unchanged_requires_matching_annotation_and_payload() {
        let payload = data(&[("ca.crt", "pem")]);
        let sum = calculate_map_checksum(&payload);

        let mut meta = ObjectMeta::default();
        assert!(!is_unchanged(&meta, &sum, &sum));

        set_object_checksum(&mut meta, &sum);
        assert!(is_unchanged(&meta, &sum, &sum));
        assert!(!is_unchanged(&meta, &sum, ""));

        let tampered = calculate_map_checksum(&data(&[("ca.crt", "other")]));
        assert!(!is_unchanged(&meta, &tampered, &sum));
    }
}
