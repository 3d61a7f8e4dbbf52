//! The operation set shared by [`OrderedMap`] and plain concurrent maps.
//!
//! Code written against [`SyncMap`] can be handed either an [`OrderedMap`] or
//! an unordered `RwLock<HashMap>` without other changes. The trait is object
//! safe, so `&dyn SyncMap<K, V>` works as well.
//!
//! # Examples
//!
//! ```
//! use hashbrown::HashMap;
//! use parking_lot::RwLock;
//! use tether_sync::OrderedMap;
//! use tether_sync::SyncMap;
//!
//! fn count_words(map: &dyn SyncMap<String, usize>, text: &str) {
//!     for word in text.split_whitespace() {
//!         let (seen, _) = map.load_or_store(word.to_string(), 0);
//!         map.store(word.to_string(), seen + 1);
//!     }
//! }
//!
//! let ordered: OrderedMap<String, usize> = OrderedMap::new();
//! let unordered: RwLock<HashMap<String, usize>> = RwLock::new(HashMap::new());
//!
//! count_words(&ordered, "b a b");
//! count_words(&unordered, "b a b");
//!
//! assert_eq!(SyncMap::load(&ordered, &"b".to_string()), Some(2));
//! assert_eq!(unordered.load(&"b".to_string()), Some(2));
//! ```
//!
//! [`OrderedMap`]: crate::ordered_map::OrderedMap

use core::hash::BuildHasher;
use core::hash::Hash;

use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::ordered_map::OrderedMap;

/// A key/value map that can be used from many threads through `&self`.
///
/// Absence is reported as `None`, never as an error. Every method is atomic
/// with respect to the other methods on the same map.
pub trait SyncMap<K, V> {
    /// Stores the value for a key, replacing any previous value.
    fn store(&self, key: K, value: V);

    /// Returns the value stored for `key`, if any.
    fn load(&self, key: &K) -> Option<V>;

    /// Removes `key`. Does nothing if the key is absent.
    fn delete(&self, key: &K);

    /// Removes `key` and returns its value, if it was present.
    fn load_and_delete(&self, key: &K) -> Option<V>;

    /// Returns the existing value and `true` if `key` is present; otherwise
    /// stores `value` and returns it with `false`.
    fn load_or_store(&self, key: K, value: V) -> (V, bool);

    /// Calls `f` for each entry until it returns `false`.
    ///
    /// `f` must be allowed to call back into the same map.
    fn range(&self, f: &mut dyn FnMut(&K, &V) -> bool);
}

impl<K, V, S> SyncMap<K, V> for OrderedMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher,
{
    fn store(&self, key: K, value: V) {
        OrderedMap::store(self, key, value);
    }

    fn load(&self, key: &K) -> Option<V> {
        OrderedMap::load(self, key)
    }

    fn delete(&self, key: &K) {
        OrderedMap::delete(self, key);
    }

    fn load_and_delete(&self, key: &K) -> Option<V> {
        OrderedMap::load_and_delete(self, key)
    }

    fn load_or_store(&self, key: K, value: V) -> (V, bool) {
        OrderedMap::load_or_store(self, key, value)
    }

    fn range(&self, f: &mut dyn FnMut(&K, &V) -> bool) {
        OrderedMap::range(self, f);
    }
}

/// The unordered counterpart. `range` visits entries in hash order.
impl<K, V, S> SyncMap<K, V> for RwLock<HashMap<K, V, S>>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher,
{
    fn store(&self, key: K, value: V) {
        let old = self.write().insert(key, value);
        drop(old);
    }

    fn load(&self, key: &K) -> Option<V> {
        self.read().get(key).cloned()
    }

    fn delete(&self, key: &K) {
        self.load_and_delete(key);
    }

    fn load_and_delete(&self, key: &K) -> Option<V> {
        self.write().remove(key)
    }

    fn load_or_store(&self, key: K, value: V) -> (V, bool) {
        let mut map = self.write();
        match map.get(&key) {
            Some(existing) => (existing.clone(), true),
            None => {
                map.insert(key, value.clone());
                (value, false)
            }
        }
    }

    fn range(&self, f: &mut dyn FnMut(&K, &V) -> bool) {
        // Snapshot first: `parking_lot` locks are not reentrant.
        let entries: Vec<(K, V)> = self
            .read()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        for (key, value) in &entries {
            if !f(key, value) {
                break;
            }
        }
    }
}
