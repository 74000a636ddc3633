#[cfg(test)]
mod tests {
    use crate::label_selector::parse_label_selector;
    use crate::tracker::{ObjectTracker, Patch, GVK, GVR};
    use crate::unstructured::Unstructured;
    use crate::watch::*;
    use crate::Error;
    use futures::StreamExt;
    use kube::core::Selector;
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn pods() -> (GVR, GVK) {
        (GVR::new("", "v1", "pods"), GVK::new("", "v1", "Pod"))
    }

    fn pod(name: &str, labels: &[(&str, &str)]) -> Unstructured {
        let mut pod = Unstructured::new("v1", "Pod");
        pod.set_name(name);
        pod.set_labels(
            labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        pod
    }

    fn tracker_with(capacity: usize, overflow: OverflowPolicy) -> ObjectTracker {
        ObjectTracker::with_watch_config(WatchConfig { capacity, overflow })
    }

    #[test]
    fn test_watch_only_sees_later_events() {
        let tracker = ObjectTracker::new();
        let (gvr, gvk) = pods();
        tracker.create(&gvr, &gvk, pod("before", &[]), "default").unwrap();

        let mut watch = tracker.watch(&gvr, None, Selector::default());
        assert!(watch.try_recv().is_none());

        tracker.create(&gvr, &gvk, pod("after", &[]), "default").unwrap();
        let event = watch.try_recv().unwrap().unwrap();
        assert_eq!(event.event_type, EventType::Added);
        assert_eq!(event.object.name(), Some("after"));
        assert_eq!(event.coordinate.name, "after");
    }

    #[test]
    fn test_watch_filters_by_resource_namespace_and_labels() {
        let tracker = ObjectTracker::new();
        let (gvr, gvk) = pods();
        let mut watch = tracker.watch(&gvr, Some("ns-1"), parse_label_selector("app=web").unwrap());

        tracker.create(&gvr, &gvk, pod("other-ns", &[("app", "web")]), "ns-2").unwrap();
        tracker.create(&gvr, &gvk, pod("unlabelled", &[]), "ns-1").unwrap();
        tracker
            .create(
                &GVR::new("", "v1", "configmaps"),
                &GVK::new("", "v1", "ConfigMap"),
                pod("wrong-resource", &[("app", "web")]),
                "ns-1",
            )
            .unwrap();
        tracker.create(&gvr, &gvk, pod("web", &[("app", "web")]), "ns-1").unwrap();

        let event = watch.try_recv().unwrap().unwrap();
        assert_eq!(event.object.name(), Some("web"));
        assert!(watch.try_recv().is_none());
    }

    #[test]
    fn test_events_arrive_in_mutation_order() {
        let tracker = ObjectTracker::new();
        let (gvr, gvk) = pods();
        let mut watch = tracker.watch(&gvr, None, Selector::default());

        for i in 0..10 {
            tracker
                .create(&gvr, &gvk, pod(&format!("pod-{}", i), &[]), "default")
                .unwrap();
        }

        for i in 0..10 {
            let event = watch.try_recv().unwrap().unwrap();
            assert_eq!(event.object.name(), Some(format!("pod-{}", i).as_str()));
        }
    }

    #[test]
    fn test_label_change_into_selector_is_added() {
        let tracker = ObjectTracker::new();
        let (gvr, gvk) = pods();
        tracker.create(&gvr, &gvk, pod("p", &[]), "default").unwrap();
        let mut watch = tracker.watch(&gvr, None, parse_label_selector("dp=1").unwrap());

        tracker
            .patch(
                &gvr,
                &gvk,
                "default",
                "p",
                &Patch::Merge(json!({"metadata": {"labels": {"dp": "1"}}})),
            )
            .unwrap();
        assert_eq!(
            watch.try_recv().unwrap().unwrap().event_type,
            EventType::Added
        );

        tracker
            .patch(
                &gvr,
                &gvk,
                "default",
                "p",
                &Patch::Merge(json!({"spec": {"nodeName": "node-1"}})),
            )
            .unwrap();
        assert_eq!(
            watch.try_recv().unwrap().unwrap().event_type,
            EventType::Modified
        );

        tracker
            .patch(
                &gvr,
                &gvk,
                "default",
                "p",
                &Patch::Merge(json!({"metadata": {"labels": {"dp": "2"}}})),
            )
            .unwrap();
        let left = watch.try_recv().unwrap().unwrap();
        assert_eq!(left.event_type, EventType::Deleted);
        assert_eq!(left.object.labels().get("dp").map(String::as_str), Some("2"));

        // No longer matching, so further changes are invisible
        tracker.delete(&gvr, "default", "p").unwrap();
        assert!(watch.try_recv().is_none());
    }

    #[test]
    fn test_overflow_drops_oldest_and_reports_gap() {
        let tracker = tracker_with(2, OverflowPolicy::DropOldest);
        let (gvr, gvk) = pods();
        let mut watch = tracker.watch(&gvr, None, Selector::default());

        for i in 0..5 {
            tracker
                .create(&gvr, &gvk, pod(&format!("pod-{}", i), &[]), "default")
                .unwrap();
        }

        match watch.try_recv() {
            Some(Err(Error::Expired { missed })) => assert_eq!(missed, 3),
            other => panic!("expected expired gap, got {:?}", other),
        }
        assert_eq!(
            watch.try_recv().unwrap().unwrap().object.name(),
            Some("pod-3")
        );
        assert_eq!(
            watch.try_recv().unwrap().unwrap().object.name(),
            Some("pod-4")
        );
        assert!(watch.try_recv().is_none());
        assert!(!watch.is_closed());
        assert_eq!(watch.missed_events(), 3);
    }

    #[test]
    fn test_overflow_close_policy_ends_watch() {
        let tracker = tracker_with(2, OverflowPolicy::Close);
        let (gvr, gvk) = pods();
        let mut watch = tracker.watch(&gvr, None, Selector::default());

        for i in 0..3 {
            tracker
                .create(&gvr, &gvk, pod(&format!("pod-{}", i), &[]), "default")
                .unwrap();
        }

        assert!(watch.is_closed());
        assert!(matches!(watch.try_recv(), Some(Err(Error::Expired { missed: 3 }))));
        assert!(watch.recv_blocking().is_none());
        assert_eq!(tracker.broadcaster().subscriber_count(), 0);

        // The writer is never affected by the closed watch
        tracker.create(&gvr, &gvk, pod("pod-3", &[]), "default").unwrap();
    }

    #[test]
    fn test_zero_capacity_holds_one_event() {
        let tracker = tracker_with(0, OverflowPolicy::DropOldest);
        assert_eq!(tracker.broadcaster().config().capacity, 1);
        let (gvr, gvk) = pods();
        let mut watch = tracker.watch(&gvr, None, Selector::default());

        tracker.create(&gvr, &gvk, pod("pod-0", &[]), "default").unwrap();

        let event = watch.try_recv().unwrap().unwrap();
        assert_eq!(event.event_type, EventType::Added);
        assert_eq!(event.object.name(), Some("pod-0"));
        assert!(watch.try_recv().is_none());
        assert_eq!(watch.missed_events(), 0);
    }

    #[test]
    fn test_slow_watcher_does_not_affect_others() {
        let tracker = tracker_with(1, OverflowPolicy::DropOldest);
        let (gvr, gvk) = pods();
        let mut slow = tracker.watch(&gvr, None, Selector::default());
        let mut fast = tracker.watch(&gvr, None, Selector::default());

        for i in 0..3 {
            tracker
                .create(&gvr, &gvk, pod(&format!("pod-{}", i), &[]), "default")
                .unwrap();
            assert!(fast.try_recv().unwrap().is_ok());
        }

        assert!(matches!(slow.try_recv(), Some(Err(Error::Expired { missed: 2 }))));
        assert_eq!(fast.missed_events(), 0);
    }

    #[test]
    fn test_stop_from_another_thread_unblocks_receiver() {
        let tracker = ObjectTracker::new();
        let (gvr, _) = pods();
        let mut watch = tracker.watch(&gvr, None, Selector::default());
        let handle = watch.stop_handle();

        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            handle.stop();
        });

        assert!(watch.recv_blocking().is_none());
        assert!(watch.is_closed());
        stopper.join().unwrap();
        assert_eq!(tracker.broadcaster().subscriber_count(), 0);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let tracker = ObjectTracker::new();
        let (gvr, gvk) = pods();
        let watch = tracker.watch(&gvr, None, Selector::default());
        let handle = watch.stop_handle();

        watch.stop();
        handle.stop();
        watch.stop();
        assert!(handle.is_closed());

        tracker.create(&gvr, &gvk, pod("p", &[]), "default").unwrap();
    }

    #[test]
    fn test_dropping_subscription_unregisters_it() {
        let tracker = ObjectTracker::new();
        let (gvr, _) = pods();

        let watch = tracker.watch(&gvr, None, Selector::default());
        assert_eq!(tracker.broadcaster().subscriber_count(), 1);
        drop(watch);
        assert_eq!(tracker.broadcaster().subscriber_count(), 0);
    }

    #[test]
    fn test_recv_timeout_returns_none_without_events() {
        let tracker = ObjectTracker::new();
        let (gvr, _) = pods();
        let mut watch = tracker.watch(&gvr, None, Selector::default());

        assert!(watch.recv_timeout(Duration::from_millis(20)).is_none());
        assert!(!watch.is_closed());
    }

    #[test]
    fn test_blocking_receiver_sees_events_from_writer_thread() {
        let tracker = Arc::new(ObjectTracker::new());
        let (gvr, gvk) = pods();
        let mut watch = tracker.watch(&gvr, None, Selector::default());

        let writer = {
            let tracker = Arc::clone(&tracker);
            thread::spawn(move || {
                for i in 0..20 {
                    tracker
                        .create(&gvr, &gvk, pod(&format!("pod-{}", i), &[]), "default")
                        .unwrap();
                }
            })
        };

        for i in 0..20 {
            let event = watch
                .recv_timeout(Duration::from_secs(5))
                .expect("event before timeout")
                .unwrap();
            assert_eq!(event.object.name(), Some(format!("pod-{}", i).as_str()));
        }
        writer.join().unwrap();
    }

    #[tokio::test]
    async fn test_async_recv_wakes_on_event() {
        let tracker = Arc::new(ObjectTracker::new());
        let (gvr, gvk) = pods();
        let mut watch = tracker.watch(&gvr, None, Selector::default());

        let writer = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                tracker.create(&gvr, &gvk, pod("late", &[]), "default").unwrap();
            })
        };

        let event = tokio::time::timeout(Duration::from_secs(5), watch.recv())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(event.object.name(), Some("late"));
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropping_tracker_ends_stream() {
        let tracker = ObjectTracker::new();
        let (gvr, gvk) = pods();
        let stream = tracker.watch(&gvr, None, Selector::default()).into_stream();

        tracker.create(&gvr, &gvk, pod("p", &[]), "default").unwrap();
        drop(tracker);

        // The queued event is discarded along with the closed watch
        let items: Vec<_> = tokio::time::timeout(Duration::from_secs(5), stream.collect::<Vec<_>>())
            .await
            .unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_close_all_closes_every_subscription() {
        let broadcaster = EventBroadcaster::default();
        let filter = WatchFilter::new(GVR::new("", "v1", "pods"), None, Selector::default());
        let first = broadcaster.subscribe(filter.clone());
        let second = broadcaster.subscribe(filter);

        broadcaster.close_all();
        assert!(first.is_closed());
        assert!(second.is_closed());
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[test]
    fn test_stream_is_usable_with_tokio_test() {
        let tracker = ObjectTracker::new();
        let (gvr, gvk) = pods();
        let mut stream = Box::pin(tracker.watch(&gvr, None, Selector::default()).into_stream());

        tracker.create(&gvr, &gvk, pod("p", &[]), "default").unwrap();
        let event = tokio_test::block_on(stream.next()).unwrap().unwrap();
        assert_eq!(event.event_type, EventType::Added);
    }
}
