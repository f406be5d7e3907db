// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `finalizers.rs`

#[cfg(test)]
mod tests {
    use crate::labels::FINALIZER_SOOT;
    use crate::reconcilers::finalizers::{
        has_finalizer, is_being_deleted, with_finalizer, without_finalizer,
    };
    use crate::test_support::tcp;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    const OTHER_FINALIZER: &str = "example.com/other";

    #[test]
    fn test_with_finalizer_appends_once() {
        let mut tcp = tcp("alpha");
        tcp.metadata.finalizers = Some(vec![OTHER_FINALIZER.to_string()]);

        let finalizers = with_finalizer(&tcp, FINALIZER_SOOT).unwrap();
        assert_eq!(finalizers, vec![OTHER_FINALIZER.to_string(), FINALIZER_SOOT.to_string()]);

        tcp.metadata.finalizers = Some(finalizers);
        assert!(has_finalizer(&tcp, FINALIZER_SOOT));
        assert!(with_finalizer(&tcp, FINALIZER_SOOT).is_none());
    }

    #[test]
    fn test_without_finalizer_keeps_others() {
        let mut tcp = tcp("alpha");
        assert!(without_finalizer(&tcp, FINALIZER_SOOT).is_none());

        tcp.metadata.finalizers = Some(vec![
            FINALIZER_SOOT.to_string(),
            OTHER_FINALIZER.to_string(),
        ]);
        assert_eq!(
            without_finalizer(&tcp, FINALIZER_SOOT).unwrap(),
            vec![OTHER_FINALIZER.to_string()]
        );
    }

    #[test]
    fn test_is_being_deleted() {
        let mut tcp = tcp("alpha");
        assert!(!is_being_deleted(&tcp));
        tcp.metadata.deletion_timestamp = Some(Time(jiff::Timestamp::now()));
        assert!(is_being_deleted(&tcp));
    }
}
