//! Dependency Store
//!
//! Maps each tracked target to its fields, and each field to the ordered set
//! of effects subscribed to it.
//!
//! The store never owns what it indexes. Targets are keyed by [`TargetId`]
//! only, and subscribers are held as `Weak` references, so neither a record
//! nor an effect is kept alive by being observed. Entries are pruned as soon
//! as their last subscriber unsubscribes.
//!
//! Subscribers are kept in insertion order, so a notify dispatches effects in
//! the order they first subscribed.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;

use crate::reactive::runtime::Reactive;
use crate::reactive::{DepKey, EffectId, FieldKey, TargetId};

type Subscribers = IndexMap<EffectId, Weak<dyn Reactive>>;

/// The dependency store of one runtime.
#[derive(Default)]
pub(crate) struct DependencyStore {
    targets: HashMap<TargetId, HashMap<FieldKey, Subscribers>>,
}

impl DependencyStore {
    /// Subscribe `effect` to `key`.
    ///
    /// Returns `false` if it was already subscribed.
    pub(crate) fn subscribe(&mut self, key: &DepKey, effect: &Arc<dyn Reactive>) -> bool {
        let subscribers = self
            .targets
            .entry(key.target)
            .or_default()
            .entry(key.field.clone())
            .or_default();

        let id = effect.effect_id();
        if subscribers.contains_key(&id) {
            return false;
        }
        subscribers.insert(id, Arc::downgrade(effect));
        true
    }

    /// Remove `effect` from `key`, dropping the entry once it is empty.
    pub(crate) fn unsubscribe(&mut self, key: &DepKey, effect: EffectId) {
        let Some(fields) = self.targets.get_mut(&key.target) else {
            return;
        };

        if let Some(subscribers) = fields.get_mut(&key.field) {
            subscribers.shift_remove(&effect);
            if subscribers.is_empty() {
                fields.remove(&key.field);
            }
        }

        if fields.is_empty() {
            self.targets.remove(&key.target);
        }
    }

    /// Snapshot the live subscribers of several fields of one target.
    ///
    /// Effects subscribed to more than one of the fields appear once, at the
    /// position of their first occurrence.
    pub(crate) fn snapshot(&self, target: TargetId, fields: &[FieldKey]) -> Vec<Arc<dyn Reactive>> {
        let Some(entries) = self.targets.get(&target) else {
            return Vec::new();
        };

        let mut collected: IndexMap<EffectId, Arc<dyn Reactive>> = IndexMap::new();
        for field in fields {
            let Some(subscribers) = entries.get(field) else {
                continue;
            };
            for (id, weak) in subscribers {
                if collected.contains_key(id) {
                    continue;
                }
                if let Some(effect) = weak.upgrade() {
                    collected.insert(*id, effect);
                }
            }
        }

        collected.into_values().collect()
    }

    /// Drop every entry of `target`. Returns the number of fields removed.
    pub(crate) fn forget_target(&mut self, target: TargetId) -> usize {
        self.targets.remove(&target).map_or(0, |fields| fields.len())
    }

    /// Number of effects subscribed to `key`.
    pub(crate) fn subscriber_count(&self, key: &DepKey) -> usize {
        self.targets
            .get(&key.target)
            .and_then(|fields| fields.get(&key.field))
            .map_or(0, IndexMap::len)
    }

    /// Number of (target, field) entries currently stored.
    pub(crate) fn entry_count(&self) -> usize {
        self.targets.values().map(HashMap::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct MockReactive {
        id: EffectId,
        active: AtomicBool,
    }

    impl MockReactive {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                id: EffectId::new(),
                active: AtomicBool::new(true),
            })
        }
    }

    impl Reactive for MockReactive {
        fn effect_id(&self) -> EffectId {
            self.id
        }

        fn is_active(&self) -> bool {
            self.active.load(Ordering::SeqCst)
        }

        fn trigger(&self) -> Result<()> {
            Ok(())
        }

        fn execute(&self) -> Result<()> {
            Ok(())
        }

        fn record_dependency(&self, _key: DepKey) {}
    }

    fn as_dyn(mock: &Arc<MockReactive>) -> Arc<dyn Reactive> {
        mock.clone()
    }

    #[test]
    fn subscribe_is_idempotent() {
        let mut store = DependencyStore::default();
        let effect = MockReactive::new();
        let key = DepKey::new(TargetId::new(), "count");

        assert!(store.subscribe(&key, &as_dyn(&effect)));
        assert!(!store.subscribe(&key, &as_dyn(&effect)));
        assert_eq!(store.subscriber_count(&key), 1);
    }

    #[test]
    fn unsubscribe_prunes_empty_entries() {
        let mut store = DependencyStore::default();
        let effect = MockReactive::new();
        let target = TargetId::new();
        let a = DepKey::new(target, "a");
        let b = DepKey::new(target, "b");

        store.subscribe(&a, &as_dyn(&effect));
        store.subscribe(&b, &as_dyn(&effect));
        assert_eq!(store.entry_count(), 2);

        store.unsubscribe(&a, effect.id);
        assert_eq!(store.entry_count(), 1);

        store.unsubscribe(&b, effect.id);
        assert_eq!(store.entry_count(), 0);
        assert!(store.targets.is_empty());
    }

    #[test]
    fn snapshot_preserves_subscription_order() {
        let mut store = DependencyStore::default();
        let target = TargetId::new();
        let key = DepKey::new(target, "x");
        let effects: Vec<_> = (0..4).map(|_| MockReactive::new()).collect();

        for effect in effects.iter().rev() {
            store.subscribe(&key, &as_dyn(effect));
        }

        let order: Vec<_> = store
            .snapshot(target, &[FieldKey::from("x")])
            .iter()
            .map(|e| e.effect_id())
            .collect();
        let expected: Vec<_> = effects.iter().rev().map(|e| e.id).collect();
        assert_eq!(order, expected);
    }

    #[test]
    fn snapshot_merges_fields_without_duplicates() {
        let mut store = DependencyStore::default();
        let target = TargetId::new();
        let both = MockReactive::new();
        let keys_only = MockReactive::new();

        store.subscribe(&DepKey::new(target, "name"), &as_dyn(&both));
        store.subscribe(&DepKey::new(target, FieldKey::Iterate), &as_dyn(&keys_only));
        store.subscribe(&DepKey::new(target, FieldKey::Iterate), &as_dyn(&both));

        let snapshot = store.snapshot(target, &[FieldKey::from("name"), FieldKey::Iterate]);
        let ids: Vec<_> = snapshot.iter().map(|e| e.effect_id()).collect();
        assert_eq!(ids, vec![both.id, keys_only.id]);
    }

    #[test]
    fn snapshot_skips_dropped_effects() {
        let mut store = DependencyStore::default();
        let target = TargetId::new();
        let key = DepKey::new(target, "x");

        let kept = MockReactive::new();
        store.subscribe(&key, &as_dyn(&kept));
        {
            let dropped = MockReactive::new();
            store.subscribe(&key, &as_dyn(&dropped));
        }

        let snapshot = store.snapshot(target, &[FieldKey::from("x")]);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].effect_id(), kept.id);
    }

    #[test]
    fn unknown_target_snapshot_is_empty() {
        let store = DependencyStore::default();
        assert!(store.snapshot(TargetId::new(), &[FieldKey::Iterate]).is_empty());
    }

    #[test]
    fn forget_target_drops_all_fields() {
        let mut store = DependencyStore::default();
        let effect = MockReactive::new();
        let target = TargetId::new();

        store.subscribe(&DepKey::new(target, "a"), &as_dyn(&effect));
        store.subscribe(&DepKey::new(target, "b"), &as_dyn(&effect));

        assert_eq!(store.forget_target(target), 2);
        assert_eq!(store.entry_count(), 0);
        assert_eq!(store.forget_target(target), 0);
    }
}
