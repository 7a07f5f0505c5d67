//! Fixed-capacity block pool with generation-checked handles.
//!
//! Capacity is set once at construction and never grows. A released block
//! bumps its generation, so a handle kept past its release stops resolving
//! instead of aliasing the next occupant.

/// Reference to one occupied block of a [`BlockPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    pub fn index(self) -> usize {
        self.index as usize
    }
}

/// Every block of the pool is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("block pool exhausted ({capacity} blocks)")]
pub struct PoolExhausted {
    pub capacity: usize,
}

#[derive(Debug)]
enum Slot<T> {
    Occupied { generation: u32, value: T },
    Free { generation: u32, next: Option<u32> },
}

#[derive(Debug)]
pub struct BlockPool<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    len: usize,
}

impl<T> BlockPool<T> {
    /// Allocate a pool of `capacity` blocks.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.min(u32::MAX as usize);
        let slots = (0..capacity)
            .map(|i| Slot::Free {
                generation: 0,
                next: (i + 1 < capacity).then(|| (i + 1) as u32),
            })
            .collect();
        Self {
            slots,
            free_head: (capacity > 0).then_some(0),
            len: 0,
        }
    }

    /// Move `value` into a free block.
    pub fn insert(&mut self, value: T) -> Result<Handle, PoolExhausted> {
        let Some(index) = self.free_head else {
            return Err(PoolExhausted {
                capacity: self.capacity(),
            });
        };
        let slot = &mut self.slots[index as usize];
        let (generation, next) = match *slot {
            Slot::Free { generation, next } => (generation, next),
            Slot::Occupied { .. } => unreachable!("free list points at an occupied block"),
        };
        *slot = Slot::Occupied { generation, value };
        self.free_head = next;
        self.len += 1;
        Ok(Handle { index, generation })
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        match self.slots.get(handle.index())? {
            Slot::Occupied { generation, value } if *generation == handle.generation => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        match self.slots.get_mut(handle.index())? {
            Slot::Occupied { generation, value } if *generation == handle.generation => Some(value),
            _ => None,
        }
    }

    /// Release a block and return its value. Stale handles return `None`.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index())?;
        match slot {
            Slot::Occupied { generation, .. } if *generation == handle.generation => {}
            _ => return None,
        }
        let freed = Slot::Free {
            generation: handle.generation.wrapping_add(1),
            next: self.free_head,
        };
        let Slot::Occupied { value, .. } = std::mem::replace(slot, freed) else {
            return None;
        };
        self.free_head = Some(handle.index);
        self.len -= 1;
        Some(value)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_until_exhausted() {
        let mut pool = BlockPool::with_capacity(2);
        let a = pool.insert("a").unwrap();
        let b = pool.insert("b").unwrap();
        assert!(pool.is_full());
        assert_eq!(pool.insert("c"), Err(PoolExhausted { capacity: 2 }));
        assert_eq!(pool.get(a), Some(&"a"));
        assert_eq!(pool.get(b), Some(&"b"));
    }

    #[test]
    fn released_block_is_reused_with_new_generation() {
        let mut pool = BlockPool::with_capacity(1);
        let first = pool.insert(1u32).unwrap();
        assert_eq!(pool.remove(first), Some(1));
        assert!(pool.is_empty());

        let second = pool.insert(2u32).unwrap();
        assert_eq!(first.index(), second.index());
        assert_ne!(first, second);
        assert_eq!(pool.get(first), None);
        assert_eq!(pool.remove(first), None);
        assert_eq!(pool.get(second), Some(&2));
    }

    #[test]
    fn get_mut_updates_in_place() {
        let mut pool = BlockPool::with_capacity(4);
        let handle = pool.insert(vec![1u8]).unwrap();
        pool.get_mut(handle).unwrap().push(2);
        assert_eq!(pool.get(handle).unwrap(), &vec![1, 2]);
    }

    #[test]
    fn zero_capacity_pool_is_always_exhausted() {
        let mut pool = BlockPool::<u8>::with_capacity(0);
        assert!(pool.insert(0).is_err());
        assert_eq!(pool.capacity(), 0);
    }
}
