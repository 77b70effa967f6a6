use async_trait::async_trait;
use claims::{assert_err, assert_matches, assert_ok, assert_some_eq};
use engine::common::{StorageError, StoreError};
use engine::config::{EnvironmentalRule, ThemeConfig, ThemeDimension, ThemeOption};
use engine::signal::{Headless, ManualSignals, SignalSource};
use engine::storage::{self, MemoryStorage, StorageAdapter};
use engine::store::{
    LifecyclePolicy, ResolvedSelection, Selection, StoreOptions, Subscription, ThemeStore,
};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

const DARK: &str = "dark-preference";

// Shared fixtures for store tests
mod store_helpers {
    use super::*;

    pub type Recorded = Arc<Mutex<Vec<(Selection, ResolvedSelection)>>>;

    /// colorScheme {system*, light, dark} with system resolved through the
    /// dark preference signal, and contrast {standard*, high}
    pub fn scenario_config() -> ThemeConfig {
        ThemeConfig::new(vec![
            ThemeDimension::new("colorScheme")
                .with_option(
                    ThemeOption::new("system")
                        .as_default()
                        .with_rule(EnvironmentalRule::new(DARK, "dark", "light")),
                )
                .with_option("light")
                .with_option("dark"),
            ThemeDimension::new("contrast")
                .with_option(ThemeOption::new("standard").as_default())
                .with_option("high"),
        ])
        .unwrap()
    }

    pub struct Harness {
        pub store: Arc<ThemeStore>,
        pub storage: MemoryStorage,
        pub signals: ManualSignals,
    }

    pub fn harness() -> Harness {
        harness_with(|options| options)
    }

    pub fn harness_with(customize: impl FnOnce(StoreOptions) -> StoreOptions) -> Harness {
        let storage = MemoryStorage::new();
        let signals = ManualSignals::new();
        let options = StoreOptions::new(scenario_config())
            .with_storage(storage.factory())
            .with_signals(Arc::new(signals.clone()));
        let store = ThemeStore::new(customize(options)).unwrap();
        Harness {
            store,
            storage,
            signals,
        }
    }

    pub fn record(store: &ThemeStore) -> (Subscription, Recorded) {
        let events: Recorded = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let subscription = store.subscribe(move |selection, resolved| {
            sink.lock()
                .unwrap()
                .push((selection.clone(), resolved.clone()));
        });
        (subscription, events)
    }

    pub fn selection(pairs: &[(&str, &str)]) -> Selection {
        pairs.iter().copied().collect()
    }

    /// Adapter that stores nothing, fails reads and has no capabilities
    pub struct BrokenAdapter;

    #[async_trait]
    impl StorageAdapter for BrokenAdapter {
        async fn get_item(&self, _key: &str) -> Result<Option<Value>, StorageError> {
            Err(StorageError::Backend {
                reason: "disk on fire".to_string(),
            })
        }

        async fn set_item(&self, _key: &str, _value: &Value) -> Result<(), StorageError> {
            Err(StorageError::Backend {
                reason: "disk on fire".to_string(),
            })
        }
    }

    /// Adapter that records whether subscribers had already been notified
    /// when a write started
    pub struct ObservingAdapter {
        pub notified: Arc<AtomicBool>,
        pub notified_before_write: Arc<AtomicBool>,
    }

    #[async_trait]
    impl StorageAdapter for ObservingAdapter {
        async fn get_item(&self, _key: &str) -> Result<Option<Value>, StorageError> {
            Ok(None)
        }

        async fn set_item(&self, _key: &str, _value: &Value) -> Result<(), StorageError> {
            self.notified_before_write
                .store(self.notified.load(Ordering::SeqCst), Ordering::SeqCst);
            Ok(())
        }
    }
}

use store_helpers::*;

// The colorScheme/contrast walkthrough
mod scenario {
    use super::*;

    #[test]
    fn test_inactive_signal_resolves_system_to_light() {
        let h = harness();
        assert_eq!(
            h.store.resolved_selection(),
            selection(&[("colorScheme", "light"), ("contrast", "standard")])
        );
    }

    #[tokio::test]
    async fn test_set_selection_persists_and_notifies() {
        let h = harness();
        let (_subscription, events) = record(&h.store);

        assert_ok!(h.store.set_selection([("contrast", "high")]).await);

        assert_some_eq!(
            h.storage.peek("palettez").await,
            json!({"colorScheme": "system", "contrast": "high"})
        );
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0],
            (
                selection(&[("colorScheme", "system"), ("contrast", "high")]),
                selection(&[("colorScheme", "light"), ("contrast", "high")]),
            )
        );
    }

    #[tokio::test]
    async fn test_signal_change_notifies_exactly_once() {
        let h = harness();
        let (_subscription, events) = record(&h.store);
        h.store
            .set_selection([("contrast", "high")])
            .await
            .unwrap();
        events.lock().unwrap().clear();

        h.signals.set(DARK, true);

        assert_eq!(
            h.store.resolved_selection(),
            selection(&[("colorScheme", "dark"), ("contrast", "high")])
        );
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].1.get("colorScheme"), Some("dark"));
    }

    #[tokio::test]
    async fn test_restore_without_record_yields_defaults() {
        let h = harness_with(|options| {
            options.with_initial_selection([("colorScheme", "dark"), ("contrast", "high")])
        });
        let (_subscription, events) = record(&h.store);

        h.store.restore().await;

        assert_eq!(h.store.selection(), h.store.config().default_selection());
        assert_eq!(events.lock().unwrap().len(), 1);
    }
}

// Resolution semantics and the signal observer lifecycle
mod resolution {
    use super::*;

    #[test]
    fn test_options_without_rule_resolve_to_their_key() {
        let h = harness_with(|options| {
            options.with_initial_selection([("colorScheme", "dark"), ("contrast", "high")])
        });
        for _ in 0..3 {
            assert_eq!(h.store.resolved_selection(), h.store.selection());
        }
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let h = harness();
        h.signals.set(DARK, true);
        let first = h.store.resolved_selection();
        let second = h.store.resolved_selection();
        assert_eq!(first, second);
        assert_eq!(first.get("colorScheme"), Some("dark"));
    }

    #[test]
    fn test_observers_are_registered_lazily() {
        let h = harness_with(|options| options.with_initial_selection([("colorScheme", "light")]));

        h.store.resolved_selection();
        assert_eq!(h.signals.observer_count(DARK), 0);
        assert_eq!(h.store.resolved_option_count(), 0);
    }

    #[tokio::test]
    async fn test_one_observer_per_selected_option() {
        let h = harness_with(|options| options.with_initial_selection([("colorScheme", "light")]));

        h.store
            .set_selection([("colorScheme", "system")])
            .await
            .unwrap();
        h.store.resolved_selection();
        h.store.resolved_selection();

        assert_eq!(h.signals.observer_count(DARK), 1);
        assert_eq!(h.store.resolved_option_count(), 1);
    }

    #[tokio::test]
    async fn test_change_for_unselected_option_is_silent_but_cached() {
        let h = harness();
        h.store.resolved_selection();
        h.store
            .set_selection([("colorScheme", "light")])
            .await
            .unwrap();
        let (_subscription, events) = record(&h.store);

        assert_eq!(h.signals.set(DARK, true), 1);
        assert!(events.lock().unwrap().is_empty());

        h.store
            .set_selection([("colorScheme", "system")])
            .await
            .unwrap();
        assert_eq!(h.store.resolved_selection().get("colorScheme"), Some("dark"));
    }

    #[test]
    fn test_headless_environment_leaves_option_unresolved() {
        let h = harness_with(|options| options.with_signals(Arc::new(Headless)));
        assert_eq!(
            h.store.resolved_selection(),
            selection(&[("colorScheme", "system"), ("contrast", "standard")])
        );
        assert_eq!(h.store.resolved_option_count(), 0);
    }

    #[test]
    fn test_custom_signal_source_is_queried_once() {
        struct CountingSignals {
            queries: Mutex<usize>,
        }

        impl SignalSource for CountingSignals {
            fn query(&self, _signal: &str) -> Result<bool, engine::SignalError> {
                *self.queries.lock().unwrap() += 1;
                Ok(true)
            }

            fn observe(
                &self,
                _signal: &str,
                _token: tokio_util::sync::CancellationToken,
                _callback: engine::signal::SignalCallback,
            ) -> Result<(), engine::SignalError> {
                Ok(())
            }
        }

        let signals = Arc::new(CountingSignals {
            queries: Mutex::new(0),
        });
        let h = harness_with(|options| options.with_signals(signals.clone()));
        for _ in 0..5 {
            assert_eq!(h.store.resolved_selection().get("colorScheme"), Some("dark"));
        }
        assert_eq!(*signals.queries.lock().unwrap(), 1);
    }
}

// Selection updates, persistence and validation
mod persistence {
    use super::*;

    #[tokio::test]
    async fn test_notification_precedes_write() {
        let notified = Arc::new(AtomicBool::new(false));
        let notified_before_write = Arc::new(AtomicBool::new(false));
        let adapter_flags = (notified.clone(), notified_before_write.clone());
        let factory = storage::factory(move |_token| {
            Ok(ObservingAdapter {
                notified: adapter_flags.0.clone(),
                notified_before_write: adapter_flags.1.clone(),
            })
        });
        let store = ThemeStore::new(
            StoreOptions::new(scenario_config())
                .with_storage(factory)
                .with_signals(Arc::new(ManualSignals::new())),
        )
        .unwrap();
        let flag = notified.clone();
        let _subscription = store.subscribe(move |_, _| flag.store(true, Ordering::SeqCst));

        store.set_selection([("contrast", "high")]).await.unwrap();

        assert!(notified_before_write.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_set_then_restore_round_trips() {
        let h = harness();
        h.store
            .set_selection([("colorScheme", "dark")])
            .await
            .unwrap();
        let expected = h.store.selection();

        h.store.restore().await;

        assert_eq!(h.store.selection(), expected);
        assert_eq!(
            expected,
            selection(&[("colorScheme", "dark"), ("contrast", "standard")])
        );
    }

    #[tokio::test]
    async fn test_restore_replaces_initial_selection_with_record() {
        let h = harness_with(|options| options.with_initial_selection([("contrast", "high")]));
        assert_eq!(h.store.selection().get("contrast"), Some("high"));

        h.storage
            .insert("palettez", json!({"colorScheme": "light", "contrast": "standard"}))
            .await;
        h.store.restore().await;

        assert_eq!(
            h.store.selection(),
            selection(&[("colorScheme", "light"), ("contrast", "standard")])
        );
    }

    #[tokio::test]
    async fn test_restore_sanitizes_partial_and_invalid_records() {
        let h = harness();
        h.storage
            .insert(
                "palettez",
                json!({"colorScheme": "sepia", "contrast": "high", "motion": "reduced"}),
            )
            .await;

        h.store.restore().await;

        assert_eq!(
            h.store.selection(),
            selection(&[("colorScheme", "system"), ("contrast", "high")])
        );
    }

    #[tokio::test]
    async fn test_restore_treats_malformed_record_as_absent() {
        let h = harness_with(|options| options.with_initial_selection([("contrast", "high")]));
        h.storage.insert("palettez", json!(["not", "a", "record"])).await;

        h.store.restore().await;

        assert_eq!(h.store.selection(), h.store.config().default_selection());
    }

    #[tokio::test]
    async fn test_failed_read_recovers_with_defaults() {
        let store = ThemeStore::new(
            StoreOptions::new(scenario_config())
                .with_storage(storage::factory(|_token| Ok(BrokenAdapter)))
                .with_signals(Arc::new(ManualSignals::new()))
                .with_initial_selection([("contrast", "high")]),
        )
        .unwrap();

        store.restore().await;

        assert_eq!(store.selection(), store.config().default_selection());
    }

    #[tokio::test]
    async fn test_failed_write_is_reported_after_notifying() {
        let store = ThemeStore::new(
            StoreOptions::new(scenario_config())
                .with_storage(storage::factory(|_token| Ok(BrokenAdapter)))
                .with_signals(Arc::new(ManualSignals::new())),
        )
        .unwrap();
        let (_subscription, events) = record(&store);

        let result = store.set_selection([("contrast", "high")]).await;

        assert_matches!(result, Err(StoreError::Storage(StorageError::Backend { .. })));
        assert_eq!(events.lock().unwrap().len(), 1);
        assert_eq!(store.selection().get("contrast"), Some("high"));
    }

    #[tokio::test]
    async fn test_unknown_values_are_rejected_without_change() {
        let h = harness();
        let (_subscription, events) = record(&h.store);

        let err = assert_err!(h.store.set_selection([("contrast", "extreme")]).await);
        assert_matches!(err, StoreError::UnknownOption { ref dimension, .. } if dimension == "contrast");

        let err = assert_err!(h.store.set_selection([("motion", "reduced")]).await);
        assert_matches!(err, StoreError::UnknownDimension { .. });

        assert_eq!(h.store.selection(), h.store.config().default_selection());
        assert!(events.lock().unwrap().is_empty());
        assert_eq!(h.storage.peek("palettez").await, None);
    }

    #[test]
    fn test_initial_selection_is_sanitized() {
        let h = harness_with(|options| {
            options.with_initial_selection([("colorScheme", "sepia"), ("motion", "reduced")])
        });
        assert_eq!(h.store.selection(), h.store.config().default_selection());
    }

    #[tokio::test]
    async fn test_clear_resets_and_removes_record() {
        let h = harness();
        h.store
            .set_selection([("contrast", "high")])
            .await
            .unwrap();
        let (_subscription, events) = record(&h.store);

        assert_ok!(h.store.clear().await);

        assert_eq!(h.store.selection(), h.store.config().default_selection());
        assert_eq!(h.storage.peek("palettez").await, None);
        assert_eq!(events.lock().unwrap().len(), 1);
    }
}

// Cross-instance synchronization
mod cross_instance {
    use super::*;

    fn sibling(storage: &MemoryStorage, signals: &ManualSignals, key: &str) -> Arc<ThemeStore> {
        ThemeStore::new(
            StoreOptions::new(scenario_config())
                .with_key(key)
                .with_storage(storage.factory())
                .with_signals(Arc::new(signals.clone())),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_broadcast_reaches_synced_store() {
        let h = harness();
        let follower = sibling(&h.storage, &h.signals, "palettez");
        let _handle = assert_ok!(follower.sync());
        let (_subscription, events) = record(&follower);

        h.store
            .set_selection([("contrast", "high")])
            .await
            .unwrap();

        assert_eq!(follower.selection().get("contrast"), Some("high"));
        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sync_ignores_other_keys() {
        let h = harness();
        let other = sibling(&h.storage, &h.signals, "other");
        let _handle = other.sync().unwrap();
        let (_subscription, events) = record(&other);

        h.store
            .set_selection([("contrast", "high")])
            .await
            .unwrap();

        assert_eq!(other.selection(), other.config().default_selection());
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_removed_record_resets_follower() {
        let h = harness();
        let follower = sibling(&h.storage, &h.signals, "palettez");
        let _handle = follower.sync().unwrap();
        h.store
            .set_selection([("contrast", "high")])
            .await
            .unwrap();

        h.store.clear().await.unwrap();

        assert_eq!(follower.selection(), follower.config().default_selection());
    }

    #[tokio::test]
    async fn test_cancelled_handle_stops_following() {
        let h = harness();
        let follower = sibling(&h.storage, &h.signals, "palettez");
        let handle = follower.sync().unwrap();
        handle.cancel();

        h.store
            .set_selection([("contrast", "high")])
            .await
            .unwrap();

        assert_eq!(follower.selection().get("contrast"), Some("standard"));
        assert_eq!(h.storage.watcher_count(), 0);
    }

    #[test]
    fn test_sync_without_watch_fails_fast() {
        let store = ThemeStore::new(
            StoreOptions::new(scenario_config())
                .with_key("readonly")
                .with_storage(storage::factory(|_token| Ok(BrokenAdapter)))
                .with_signals(Arc::new(Headless)),
        )
        .unwrap();

        let err = assert_err!(store.sync());
        assert_matches!(err, StoreError::WatchUnsupported { ref key } if key == "readonly");
    }
}

// Destruction and lifecycle policy
mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn test_destroy_cancels_observers_and_watches() {
        let h = harness();
        h.store.resolved_selection();
        let handle = h.store.sync().unwrap();
        assert_eq!(h.signals.observer_count(DARK), 1);
        assert_eq!(h.storage.watcher_count(), 1);

        h.store.destroy();

        assert!(h.store.is_destroyed());
        assert!(handle.is_cancelled());
        assert_eq!(h.signals.observer_count(DARK), 0);
        assert_eq!(h.storage.watcher_count(), 0);
        assert_matches!(h.store.sync(), Err(StoreError::Destroyed { .. }));
    }

    #[test]
    fn test_unsubscribing_last_listener_destroys_by_default() {
        let h = harness();
        let (first, _) = record(&h.store);
        let (second, _) = record(&h.store);

        first.unsubscribe();
        assert!(!h.store.is_destroyed());

        second.unsubscribe();
        assert!(h.store.is_destroyed());
        assert_eq!(h.store.subscriber_count(), 0);
    }

    #[test]
    fn test_explicit_policy_survives_unsubscribe() {
        let h = harness_with(|options| options.with_lifecycle(LifecyclePolicy::Explicit));
        let (subscription, _) = record(&h.store);

        subscription.unsubscribe();

        assert!(!h.store.is_destroyed());
    }

    #[tokio::test]
    async fn test_destroyed_store_stays_silent() {
        let h = harness_with(|options| options.with_lifecycle(LifecyclePolicy::Explicit));
        let (_subscription, events) = record(&h.store);
        h.store.resolved_selection();

        h.store.destroy();
        h.signals.set(DARK, true);
        h.store
            .set_selection([("contrast", "high")])
            .await
            .unwrap();

        assert!(events.lock().unwrap().is_empty());
    }
}
