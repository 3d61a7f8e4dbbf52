use core::ops::{
    Index,
    IndexMut,
};

use tracing::trace;

use crate::Ptr;

#[cold]
#[inline(never)]
fn assert_free() -> ! {
    panic!("Attempted to access data of free slot");
}

#[derive(Debug, Clone)]
pub(crate) struct LLData<K, T> {
    pub(crate) prev: Option<Ptr>,
    pub(crate) next: Option<Ptr>,
    pub(crate) hash: u64,
    pub(crate) key: K,
    pub(crate) value: T,
}

#[derive(Debug, Clone)]
enum DataOrFree<K, T> {
    Free { next_free: Option<usize> },
    Data(LLData<K, T>),
}

#[derive(Debug, Clone)]
struct LLSlot<K, T> {
    generation: u32,
    data: DataOrFree<K, T>,
}

/// Slot storage for the nodes of the ordering list.
///
/// Slots are addressed by generational [`Ptr`]s. Freeing a slot bumps its
/// generation and pushes it on the free list, so the next allocation reuses the
/// memory while every handle issued for the old occupant stops resolving.
#[derive(Debug, Clone)]
pub(crate) struct Arena<K, T> {
    nodes: Vec<LLSlot<K, T>>,
    free_head: Option<usize>,
    len: usize,
}

impl<K, T> Arena<K, T> {
    #[cfg(test)]
    pub(crate) fn new() -> Self {
        Self::with_capacity(0)
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Arena {
            nodes: Vec::with_capacity(capacity),
            free_head: None,
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Frees every occupied slot and hands back their contents.
    ///
    /// The slots themselves are kept (and their generations bumped) rather than
    /// truncated, so handles held by in-flight traversals go stale instead of
    /// aliasing entries inserted after the clear.
    pub(crate) fn clear(&mut self) -> Vec<LLData<K, T>> {
        let mut drained = Vec::with_capacity(self.len);
        let mut next_free = None;
        for (index, slot) in self.nodes.iter_mut().enumerate().rev() {
            let old = core::mem::replace(&mut slot.data, DataOrFree::Free { next_free });
            if let DataOrFree::Data(data) = old {
                slot.generation = slot.generation.wrapping_add(1);
                drained.push(data);
            }
            next_free = Some(index);
        }
        self.free_head = next_free;
        self.len = 0;
        drained
    }

    pub(crate) fn alloc(
        &mut self,
        key: K,
        value: T,
        hash: u64,
        prev: Option<Ptr>,
        next: Option<Ptr>,
    ) -> Ptr {
        let data = DataOrFree::Data(LLData {
            prev,
            next,
            hash,
            key,
            value,
        });
        self.len += 1;

        if let Some(index) = self.free_head {
            let slot = &mut self.nodes[index];
            let DataOrFree::Free { next_free } = slot.data else {
                assert_free_list();
            };
            self.free_head = next_free;
            slot.data = data;
            trace!(index, generation = slot.generation, "reusing freed node slot");
            Ptr::unchecked_from(index, slot.generation)
        } else {
            if self.nodes.len() == self.nodes.capacity() {
                trace!(
                    capacity = self.nodes.capacity(),
                    "growing node arena"
                );
            }
            let index = self.nodes.len();
            self.nodes.push(LLSlot {
                generation: 0,
                data,
            });
            Ptr::unchecked_from(index, 0)
        }
    }

    pub(crate) fn is_occupied(&self, ptr: Ptr) -> bool {
        self.get(ptr).is_some()
    }

    pub(crate) fn get(&self, ptr: Ptr) -> Option<&LLData<K, T>> {
        let slot = self.nodes.get(ptr.unchecked_get())?;
        match &slot.data {
            DataOrFree::Data(data) if slot.generation == ptr.generation() => Some(data),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, ptr: Ptr) -> Option<&mut LLData<K, T>> {
        let slot = self.nodes.get_mut(ptr.unchecked_get())?;
        match &mut slot.data {
            DataOrFree::Data(data) if slot.generation == ptr.generation() => Some(data),
            _ => None,
        }
    }

    /// Releases the slot behind `ptr` and returns its contents.
    ///
    /// Only the slot is touched; unlinking the neighbours is up to the caller.
    pub(crate) fn free(&mut self, ptr: Ptr) -> LLData<K, T> {
        assert!(self.is_occupied(ptr), "Pointer to free must be occupied");
        let index = ptr.unchecked_get();
        let slot = &mut self.nodes[index];
        slot.generation = slot.generation.wrapping_add(1);
        let old = core::mem::replace(
            &mut slot.data,
            DataOrFree::Free {
                next_free: self.free_head,
            },
        );
        self.free_head = Some(index);
        self.len -= 1;

        match old {
            DataOrFree::Data(data) => data,
            DataOrFree::Free { .. } => assert_free(),
        }
    }
}

#[cold]
#[inline(never)]
fn assert_free_list() -> ! {
    panic!("Free list points at an occupied slot");
}

impl<K, T> Index<Ptr> for Arena<K, T> {
    type Output = LLData<K, T>;

    fn index(&self, index: Ptr) -> &Self::Output {
        match self.get(index) {
            Some(data) => data,
            None => assert_free(),
        }
    }
}

impl<K, T> IndexMut<Ptr> for Arena<K, T> {
    fn index_mut(&mut self, index: Ptr) -> &mut Self::Output {
        match self.get_mut(index) {
            Some(data) => data,
            None => assert_free(),
        }
    }
}
