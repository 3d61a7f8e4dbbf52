use core::fmt;
use core::iter::FusedIterator;

use crate::Ptr;
use crate::ordered_map::OrderedMap;

#[derive(Debug, Clone, Copy)]
enum Cursor {
    Head,
    At { current: Ptr, next: Option<Ptr> },
    Done,
}

/// A lazy iterator over the entries of an [`OrderedMap`], oldest key first.
///
/// This struct is created by the [`all`] method on [`OrderedMap`]. See its
/// documentation for more.
///
/// Each call to [`next`](Iterator::next) takes the map's read lock, clones one
/// entry, records where to continue and releases the lock again. Nothing is
/// held between steps, so the map can be freely modified while the iterator is
/// alive.
///
/// [`all`]: OrderedMap::all
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
/// for (key, value) in map.all() {
///     println!("{}: {}", key, value);
/// }
/// ```
pub struct Iter<'a, K, V, S> {
    map: &'a OrderedMap<K, V, S>,
    cursor: Cursor,
}

impl<'a, K, V, S> Iter<'a, K, V, S> {
    pub(crate) fn new(map: &'a OrderedMap<K, V, S>) -> Self {
        Iter {
            map,
            cursor: Cursor::Head,
        }
    }
}

impl<K, V, S> fmt::Debug for Iter<'_, K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter")
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}

impl<K: Clone, V: Clone, S> Iterator for Iter<'_, K, V, S> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        if let Cursor::Done = self.cursor {
            return None;
        }

        let inner = self.map.inner.read();
        let ptr = match self.cursor {
            Cursor::Head => inner.head,
            Cursor::At { current, next } => inner.resume(current, next),
            Cursor::Done => None,
        };

        let Some(ptr) = ptr else {
            self.cursor = Cursor::Done;
            return None;
        };

        let data = &inner.nodes[ptr];
        self.cursor = Cursor::At {
            current: ptr,
            next: data.next,
        };
        Some((data.key.clone(), data.value.clone()))
    }
}

impl<K: Clone, V: Clone, S> FusedIterator for Iter<'_, K, V, S> {}
