//! Slab pool with stable handles and a free list.
//!
//! Backs side records the lowering pass creates and retires out of order
//! (relocation entries, for now). Iteration visits live entries in slot
//! order; freed slots are reused before the slab grows.

/// Handle to a live entry in a [`Pool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PoolId(u32);

enum Slot<T> {
    Occupied(T),
    // Next free slot, or u32::MAX for the end of the free list.
    Free(u32),
}

const FREE_END: u32 = u32::MAX;

pub struct Pool<T> {
    slots: Vec<Slot<T>>,
    free_head: u32,
    len: usize,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Pool<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: FREE_END,
            len: 0,
        }
    }

    pub fn insert(&mut self, value: T) -> PoolId {
        self.len += 1;
        if self.free_head != FREE_END {
            let idx = self.free_head;
            match self.slots[idx as usize] {
                Slot::Free(next) => self.free_head = next,
                Slot::Occupied(_) => unreachable!("free list points at an occupied slot"),
            }
            self.slots[idx as usize] = Slot::Occupied(value);
            return PoolId(idx);
        }
        let idx = u32::try_from(self.slots.len()).expect("pool slot space exhausted");
        self.slots.push(Slot::Occupied(value));
        PoolId(idx)
    }

    /// Removes and returns an entry. Panics on a stale handle.
    pub fn remove(&mut self, id: PoolId) -> T {
        let slot = std::mem::replace(&mut self.slots[id.0 as usize], Slot::Free(self.free_head));
        match slot {
            Slot::Occupied(value) => {
                self.free_head = id.0;
                self.len -= 1;
                value
            }
            Slot::Free(_) => panic!("pool entry {} removed twice", id.0),
        }
    }

    #[must_use]
    pub fn get(&self, id: PoolId) -> Option<&T> {
        match self.slots.get(id.0 as usize) {
            Some(Slot::Occupied(value)) => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: PoolId) -> Option<&mut T> {
        match self.slots.get_mut(id.0 as usize) {
            Some(Slot::Occupied(value)) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Live entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (PoolId, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| match slot {
            Slot::Occupied(value) => Some((PoolId(i as u32), value)),
            Slot::Free(_) => None,
        })
    }
}
