#![doc = include_str!("../README.md")]
#![deny(missing_docs)]

mod arena;
pub mod ordered_map;
pub mod sync_map;

type RandomState = std::hash::RandomState;

/// A thread-safe hash map that iterates in first-insertion order, implemented
/// as a doubly-linked list indexed by a hash table and guarded by a single
/// reader-writer lock.
///
/// This is the main type alias using the default hasher. For custom hashers,
/// use [`ordered_map::OrderedMap`] directly.
///
/// # Examples
///
/// ```
/// use tether_sync::OrderedMap;
///
/// let map = OrderedMap::new();
/// map.store("a", 1);
/// map.store("b", 2);
///
/// // Maintains insertion order
/// let entries: Vec<_> = map.all().collect();
/// assert_eq!(entries, [("a", 1), ("b", 2)]);
/// ```
pub type OrderedMap<K, V> = crate::ordered_map::OrderedMap<K, V, RandomState>;
use core::num::NonZeroU32;

pub use ordered_map::Iter;
pub use sync_map::SyncMap;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
/// A generational handle identifying a node in the arena.
///
/// The index half locates the slot; the generation half is bumped every time
/// the slot is freed, so a handle kept across a removal never resolves to
/// whatever entry later reuses the slot.
pub(crate) struct Ptr {
    index: NonZeroU32,
    generation: u32,
}

impl core::fmt::Debug for Ptr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Ptr({}@{})", self.index.get() - 1, self.generation)
    }
}

impl Ptr {
    pub(crate) fn unchecked_from(index: usize, generation: u32) -> Self {
        debug_assert!(
            index < u32::MAX as usize,
            "Index too large to fit in Ptr: {index}"
        );
        let index = (index as u32).saturating_add(1);
        Ptr {
            index: NonZeroU32::new(index).unwrap_or(NonZeroU32::MAX),
            generation,
        }
    }

    pub(crate) fn unchecked_get(self) -> usize {
        self.index.get() as usize - 1
    }

    pub(crate) fn generation(self) -> u32 {
        self.generation
    }
}
