// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `trigger.rs`

#[cfg(test)]
mod tests {
    use crate::test_support::tcp;
    use crate::trigger::{Trigger, TriggerOutcome};
    use kube::ResourceExt;
    use std::time::Duration;

    #[tokio::test]
    async fn test_send_delivers() {
        let (trigger, mut rx) = Trigger::channel();
        assert_eq!(trigger.send(tcp("tenant-a")).await, TriggerOutcome::Sent);
        let received = rx.recv().await.unwrap();
        assert_eq!(received.name_any(), "tenant-a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_channel_times_out() {
        let (trigger, _rx) = Trigger::with_capacity(1, Duration::from_secs(10));
        assert_eq!(trigger.send(tcp("tenant-a")).await, TriggerOutcome::Sent);

        let started = tokio::time::Instant::now();
        assert_eq!(trigger.send(tcp("tenant-b")).await, TriggerOutcome::TimedOut);
        assert!(started.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_closed_channel() {
        let (trigger, rx) = Trigger::channel();
        drop(rx);
        assert_eq!(trigger.send(tcp("tenant-a")).await, TriggerOutcome::Closed);
    }
}
