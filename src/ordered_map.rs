//! Thread-safe ordered map implementation.
//!
//! This module provides the core [`OrderedMap`] type. Entries live in a
//! doubly-linked list whose order is the order of first insertion, and a hash
//! table maps every key to its list node. Both halves sit behind one
//! reader-writer lock: lookups and traversal steps take it shared, mutations
//! take it exclusively.
//!
//! Traversal ([`OrderedMap::range`] and [`OrderedMap::all`]) only holds the
//! lock long enough to copy out one entry and remember where to go next. User
//! code never runs under the lock, which is what lets a visitor delete the key
//! it is looking at.
//!
//! # Examples
//!
//! ```
//! use tether_sync::ordered_map::OrderedMap;
//!
//! let map: OrderedMap<&str, i32> = OrderedMap::new();
//! map.store("first", 1);
//! map.store("second", 2);
//!
//! // Iteration preserves insertion order
//! let entries: Vec<_> = map.all().collect();
//! assert_eq!(entries, [("first", 1), ("second", 2)]);
//! ```

use core::borrow::Borrow;
use core::fmt;
use core::hash::BuildHasher;
use core::hash::Hash;

use hashbrown::HashTable;
use parking_lot::RwLock;
use parking_lot::RwLockUpgradableReadGuard;
use tracing::debug;
use tracing::trace;

use crate::Ptr;
use crate::RandomState;
use crate::arena::Arena;
use crate::arena::LLData;

mod iter;

pub use iter::Iter;

/// A hash map that iterates in first-insertion order and can be shared
/// between threads.
///
/// Storing a key that is already present replaces its value without moving
/// it. Deleting a key and storing it again appends it at the back.
///
/// The generic parameters are:
/// - `K`: Key type, must implement `Hash + Eq`
/// - `V`: Value type
/// - `S`: Hash builder type, defaults to the standard hasher
///
/// Every method takes `&self`; share the map with an [`Arc`] when several
/// threads need it. Each operation is atomic with respect to every other
/// operation on the same map.
///
/// [`Arc`]: std::sync::Arc
///
/// # Examples
///
/// ```
/// use tether_sync::ordered_map::OrderedMap;
///
/// let map: OrderedMap<&str, i32> = OrderedMap::new();
/// map.store("apple", 5);
/// map.store("banana", 3);
/// map.store("cherry", 8);
///
/// map.range(|key, value| {
///     println!("{key}: {value}");
///     true
/// });
/// // Prints: apple: 5, banana: 3, cherry: 8
/// ```
pub struct OrderedMap<K, V, S = RandomState> {
    inner: RwLock<Inner<K, V>>,
    hasher: S,
}

/// The lock-protected half of the map.
///
/// `table` holds exactly one `Ptr` per occupied arena slot, and the list
/// threaded through `head`/`tail` visits each of those slots exactly once.
#[derive(Clone)]
struct Inner<K, V> {
    head: Option<Ptr>,
    tail: Option<Ptr>,
    nodes: Arena<K, V>,
    table: HashTable<Ptr>,
}

impl<K, V> Inner<K, V> {
    fn with_capacity(capacity: usize) -> Self {
        Inner {
            head: None,
            tail: None,
            nodes: Arena::with_capacity(capacity),
            table: HashTable::with_capacity(capacity),
        }
    }

    fn find<Q>(&self, hash: u64, key: &Q) -> Option<Ptr>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let nodes = &self.nodes;
        self.table
            .find(hash, |&ptr| <K as Borrow<Q>>::borrow(&nodes[ptr].key) == key)
            .copied()
    }

    /// Appends a new node at the tail and indexes it. The key must be absent.
    fn push_tail(&mut self, hash: u64, key: K, value: V) -> Ptr {
        let ptr = self.nodes.alloc(key, value, hash, self.tail, None);
        match self.tail {
            Some(tail) => self.nodes[tail].next = Some(ptr),
            None => self.head = Some(ptr),
        }
        self.tail = Some(ptr);

        let nodes = &self.nodes;
        self.table.insert_unique(hash, ptr, |&ptr| nodes[ptr].hash);
        ptr
    }

    /// Inserts at the tail or replaces the value in place.
    ///
    /// On replacement the rejected key and the previous value are handed back
    /// so the caller can drop them after releasing the lock.
    fn upsert(&mut self, hash: u64, key: K, value: V) -> Option<(K, V)>
    where
        K: Eq,
    {
        match self.find(hash, &key) {
            Some(ptr) => {
                let old = core::mem::replace(&mut self.nodes[ptr].value, value);
                Some((key, old))
            }
            None => {
                self.push_tail(hash, key, value);
                None
            }
        }
    }

    fn remove<Q>(&mut self, hash: u64, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let nodes = &self.nodes;
        let entry = self
            .table
            .find_entry(hash, |&ptr| <K as Borrow<Q>>::borrow(&nodes[ptr].key) == key)
            .ok()?;
        let (ptr, _) = entry.remove();
        Some(self.unlink(ptr))
    }

    /// Frees `ptr` and splices its neighbours together. The index entry must
    /// already be gone.
    fn unlink(&mut self, ptr: Ptr) -> (K, V) {
        let LLData {
            prev,
            next,
            key,
            value,
            ..
        } = self.nodes.free(ptr);

        match prev {
            Some(prev_ptr) => self.nodes[prev_ptr].next = next,
            None => self.head = next,
        }
        match next {
            Some(next_ptr) => self.nodes[next_ptr].prev = prev,
            None => self.tail = prev,
        }

        (key, value)
    }

    /// Picks the node a traversal should visit after `current`.
    ///
    /// `next` is the successor recorded when `current` was visited. If it has
    /// since been removed, the live successor of `current` is used instead. If
    /// both are gone the traversal has lost its place and ends.
    fn resume(&self, current: Ptr, next: Option<Ptr>) -> Option<Ptr> {
        if let Some(next) = next {
            if self.nodes.is_occupied(next) {
                return Some(next);
            }
        }

        match self.nodes.get(current) {
            Some(data) => {
                if next.is_some() {
                    trace!(?current, "recorded successor removed, following live link");
                }
                data.next
            }
            None => {
                trace!(?current, ?next, "traversal position removed, ending traversal");
                None
            }
        }
    }

    fn entries(&self) -> impl Iterator<Item = &LLData<K, V>> + '_ {
        core::iter::successors(self.head.map(|ptr| &self.nodes[ptr]), |data| {
            data.next.map(|ptr| &self.nodes[ptr])
        })
    }
}

impl<K, V, S: Default> Default for OrderedMap<K, V, S> {
    fn default() -> Self {
        OrderedMap::with_capacity_and_hasher(0, S::default())
    }
}

impl<K, V> OrderedMap<K, V> {
    /// Creates a new, empty ordered map.
    ///
    /// The map is initially created with a capacity of 0, so it will not
    /// allocate until the first element is stored.
    ///
    /// # Examples
    ///
    /// ```
    /// use tether_sync::OrderedMap;
    ///
    /// let map: OrderedMap<&str, i32> = OrderedMap::new();
    /// assert!(map.is_empty());
    /// map.store("key", 42);
    /// assert!(!map.is_empty());
    /// ```
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates a new ordered map with the specified capacity.
    ///
    /// The map will be able to hold at least `capacity` elements without
    /// reallocating. If `capacity` is 0, the map will not allocate.
    ///
    /// # Examples
    ///
    /// ```
    /// use tether_sync::OrderedMap;
    ///
    /// let map: OrderedMap<&str, i32> = OrderedMap::with_capacity(10);
    /// assert_eq!(map.len(), 0);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, RandomState::default())
    }
}

impl<K, V, S> OrderedMap<K, V, S> {
    /// Creates an empty ordered map which will use the given hash builder.
    ///
    /// # Examples
    ///
    /// ```
    /// # use hashbrown::DefaultHashBuilder;
    /// use tether_sync::ordered_map::OrderedMap;
    ///
    /// let map = OrderedMap::with_hasher(DefaultHashBuilder::default());
    /// map.store(1, "one");
    /// assert_eq!(map.load(&1), Some("one"));
    /// ```
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_capacity_and_hasher(0, hasher)
    }

    /// Creates a new ordered map with the specified capacity and hasher.
    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        OrderedMap {
            inner: RwLock::new(Inner::with_capacity(capacity)),
            hasher,
        }
    }

    /// Returns the number of entries in the map.
    ///
    /// Other threads may change the map right after this returns, so the value
    /// is only a snapshot.
    pub fn len(&self) -> usize {
        self.inner.read().nodes.len()
    }

    /// Returns `true` if the map contains no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a lazy iterator over clones of the entries, oldest key first.
    ///
    /// The iterator takes the map's lock only while it copies out the next
    /// entry, so the loop body is free to call back into the map. See
    /// [`range`](Self::range) for what a traversal observes when the map
    /// changes underneath it.
    ///
    /// # Examples
    ///
    /// ```
    /// use tether_sync::OrderedMap;
    ///
    /// let map = OrderedMap::new();
    /// map.store("a", 1);
    /// map.store("b", 2);
    /// map.store("c", 3);
    ///
    /// for (key, value) in map.all() {
    ///     if value % 2 == 1 {
    ///         map.delete(&key);
    ///     }
    /// }
    /// assert_eq!(map.all().collect::<Vec<_>>(), [("b", 2)]);
    /// ```
    pub fn all(&self) -> Iter<'_, K, V, S> {
        Iter::new(self)
    }
}

impl<K: Hash + Eq, V, S: BuildHasher> OrderedMap<K, V, S> {
    /// Stores the value for a key.
    ///
    /// A new key is appended after every key already in the map. An existing
    /// key has its value replaced and keeps its position.
    ///
    /// # Examples
    ///
    /// ```
    /// use tether_sync::OrderedMap;
    ///
    /// let map = OrderedMap::new();
    /// map.store("key1", "value1");
    /// map.store("key2", "value2");
    /// map.store("key1", "new value1");
    ///
    /// let entries: Vec<_> = map.all().collect();
    /// assert_eq!(entries, [("key1", "new value1"), ("key2", "value2")]);
    /// ```
    pub fn store(&self, key: K, value: V) {
        let hash = self.hasher.hash_one(&key);
        let replaced = self.inner.write().upsert(hash, key, value);
        // Dropped outside the lock; `Drop` impls may call back into the map.
        drop(replaced);
    }

    /// Returns a clone of the value stored for `key`, or `None` if the key is
    /// absent.
    ///
    /// The key may be any borrowed form of the map's key type, but
    /// `Hash` and `Eq` on the borrowed form must match those for the key type.
    ///
    /// # Examples
    ///
    /// ```
    /// use tether_sync::OrderedMap;
    ///
    /// let map = OrderedMap::new();
    /// map.store(String::from("a"), 1);
    /// assert_eq!(map.load("a"), Some(1));
    /// assert_eq!(map.load("b"), None);
    /// ```
    pub fn load<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let hash = self.hasher.hash_one(key);
        let inner = self.inner.read();
        inner
            .find(hash, key)
            .map(|ptr| inner.nodes[ptr].value.clone())
    }

    /// Returns `true` if the map contains a value for the specified key.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hasher.hash_one(key);
        self.inner.read().find(hash, key).is_some()
    }

    /// Removes `key` from the map, returning its value if it was present.
    ///
    /// # Examples
    ///
    /// ```
    /// use tether_sync::OrderedMap;
    ///
    /// let map = OrderedMap::new();
    /// map.store(1, "a");
    /// assert_eq!(map.load_and_delete(&1), Some("a"));
    /// assert_eq!(map.load_and_delete(&1), None);
    /// ```
    pub fn load_and_delete<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hasher.hash_one(key);
        let removed = self.inner.write().remove(hash, key);
        removed.map(|(_, value)| value)
    }

    /// Removes `key` from the map. Deleting an absent key does nothing.
    ///
    /// This may be called from inside a [`range`](Self::range) visitor, for
    /// any key including the one being visited.
    pub fn delete<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.load_and_delete(key);
    }

    /// Returns the existing value for `key` if present. Otherwise stores
    /// `value` and returns it.
    ///
    /// The flag is `true` if the value was loaded and `false` if it was
    /// stored. The check and the insert happen under one lock acquisition, so
    /// concurrent callers racing on the same absent key see exactly one store.
    ///
    /// # Examples
    ///
    /// ```
    /// use tether_sync::OrderedMap;
    ///
    /// let map = OrderedMap::new();
    /// assert_eq!(map.load_or_store("key3", "value3"), ("value3", false));
    /// assert_eq!(map.load_or_store("key3", "value3b"), ("value3", true));
    /// assert_eq!(map.load(&"key3"), Some("value3"));
    /// ```
    pub fn load_or_store(&self, key: K, value: V) -> (V, bool)
    where
        V: Clone,
    {
        let hash = self.hasher.hash_one(&key);
        let inner = self.inner.upgradable_read();
        if let Some(ptr) = inner.find(hash, &key) {
            return (inner.nodes[ptr].value.clone(), true);
        }

        let mut inner = RwLockUpgradableReadGuard::upgrade(inner);
        inner.push_tail(hash, key, value.clone());
        (value, false)
    }

    /// Removes every entry from the map.
    ///
    /// Traversals in flight when the map is cleared stop at their next step.
    pub fn clear(&self) {
        let drained = {
            let mut inner = self.inner.write();
            inner.head = None;
            inner.tail = None;
            inner.table.clear();
            inner.nodes.clear()
        };
        debug!(len = drained.len(), "cleared ordered map");
        drop(drained);
    }

    /// Calls `f` for each entry in insertion order until it returns `false`.
    ///
    /// `f` receives clones of the key and value and runs without the map's
    /// lock held, so it may call any method on the same map, including
    /// [`delete`](Self::delete) on the key it was just handed. Deleting the
    /// visited key never causes another entry to be skipped or repeated.
    ///
    /// Changes made while the traversal is running, by `f` itself or by other
    /// threads, are observed on a best-effort basis:
    /// - keys appended before the traversal reaches the tail are visited;
    /// - keys removed before the traversal reaches them are not visited;
    /// - if both the entry just visited and its recorded successor are removed
    ///   before the next step, the traversal ends early.
    ///
    /// Each call starts again from the current head.
    ///
    /// # Examples
    ///
    /// ```
    /// use tether_sync::OrderedMap;
    ///
    /// let map = OrderedMap::new();
    /// for i in 0..10 {
    ///     map.store(i, ());
    /// }
    ///
    /// let mut visited = 0;
    /// map.range(|key, _| {
    ///     visited += 1;
    ///     map.delete(key);
    ///     true
    /// });
    /// assert_eq!(visited, 10);
    ///
    /// visited = 0;
    /// map.range(|_, _| {
    ///     visited += 1;
    ///     true
    /// });
    /// assert_eq!(visited, 0);
    /// ```
    pub fn range<F>(&self, mut f: F)
    where
        F: FnMut(&K, &V) -> bool,
        K: Clone,
        V: Clone,
    {
        for (key, value) in self.all() {
            if !f(&key, &value) {
                break;
            }
        }
    }
}

impl<K: Clone, V: Clone, S: Clone> Clone for OrderedMap<K, V, S> {
    /// Takes a consistent snapshot of the map, preserving order.
    fn clone(&self) -> Self {
        let inner = Inner::clone(&self.inner.read());
        OrderedMap {
            inner: RwLock::new(inner),
            hasher: self.hasher.clone(),
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug, S> fmt::Debug for OrderedMap<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read_recursive();
        f.debug_map()
            .entries(inner.entries().map(|data| (&data.key, &data.value)))
            .finish()
    }
}

impl<K, V, S> PartialEq for OrderedMap<K, V, S>
where
    K: PartialEq,
    V: PartialEq,
{
    /// Two maps are equal when they hold equal entries in the same order.
    fn eq(&self, other: &Self) -> bool {
        if core::ptr::eq(self, other) {
            return true;
        }

        let this = self.inner.read_recursive();
        let other = other.inner.read_recursive();
        this.nodes.len() == other.nodes.len()
            && this
                .entries()
                .zip(other.entries())
                .all(|(a, b)| a.key == b.key && a.value == b.value)
    }
}

impl<K: Eq, V: Eq, S> Eq for OrderedMap<K, V, S> {}

impl<K, V, S> FromIterator<(K, V)> for OrderedMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut map = Self::with_capacity_and_hasher(iter.size_hint().0, S::default());
        map.extend(iter);
        map
    }
}

impl<K, V, S> Extend<(K, V)> for OrderedMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Stores every pair in iteration order. Repeated keys keep the position
    /// of their first occurrence and the value of their last.
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        let inner = self.inner.get_mut();
        for (key, value) in iter {
            let hash = self.hasher.hash_one(&key);
            inner.upsert(hash, key, value);
        }
    }
}

impl<'a, K: Clone, V: Clone, S> IntoIterator for &'a OrderedMap<K, V, S> {
    type IntoIter = Iter<'a, K, V, S>;
    type Item = (K, V);

    fn into_iter(self) -> Self::IntoIter {
        self.all()
    }
}
