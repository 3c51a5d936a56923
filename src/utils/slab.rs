use std::mem::MaybeUninit;

/// A simple slab arena.
///
/// A `Slab` stores values of type `T` in a contiguous array and hands out
/// stable indices. A removed slot goes back on the free stack and is reused
/// by a later insertion, so an index is only meaningful while its value is
/// still stored. Callers that keep handles across removals pair the index
/// with their own serial number.
///
/// Internally, it keeps track of:
/// - initialized slots,
/// - free indices,
/// - and uninitialized memory using [`MaybeUninit`].
pub(crate) struct Slab<T> {
    /// Storage for items (may contain uninitialized slots).
    items: Vec<MaybeUninit<T>>,
    /// Stack of free indices that can be reused.
    free: Vec<usize>,
    /// Marks whether a slot is currently initialized.
    used: Vec<bool>,
    /// Number of initialized slots.
    len: usize,
}

impl<T> Slab<T> {
    /// Creates a new `Slab` with `size` free slots.
    pub(crate) fn new(size: usize) -> Self {
        let items = (0..size).map(|_| MaybeUninit::<T>::uninit()).collect();
        // Reversed so that the lowest index is handed out first.
        let free = (0..size).rev().collect();
        let used = vec![false; size];

        Self {
            items,
            free,
            used,
            len: 0,
        }
    }

    /// Inserts a value and returns its index.
    ///
    /// A free slot is reused when one exists, otherwise the slab doubles.
    pub(crate) fn insert(&mut self, item: T) -> usize {
        let index = if let Some(i) = self.free.pop() {
            i
        } else {
            let len = self.items.len();
            let new_len = if len == 0 { 1 } else { 2 * len };

            self.items
                .extend((len..new_len).map(|_| MaybeUninit::<T>::uninit()));
            self.free.extend(((len + 1)..new_len).rev());
            self.used.resize(new_len, false);

            len
        };

        self.items[index] = MaybeUninit::new(item);
        self.used[index] = true;
        self.len += 1;

        index
    }

    /// Removes and returns the value stored at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds or the slot is vacant.
    pub(crate) fn remove(&mut self, index: usize) -> T {
        assert!(index < self.items.len(), "Index out of range");
        assert!(self.used[index], "Item is not set");

        self.free.push(index);
        self.used[index] = false;
        self.len -= 1;

        // SAFETY: `used[index]` was true, so the slot is initialized, and it
        // is marked vacant before anyone can observe it again.
        unsafe { self.items[index].assume_init_read() }
    }

    /// Returns `true` if `index` currently holds a value.
    pub(crate) fn contains(&self, index: usize) -> bool {
        self.used.get(index).copied().unwrap_or(false)
    }

    pub(crate) fn get(&self, index: usize) -> Option<&T> {
        if self.contains(index) {
            // SAFETY: checked above that the slot is initialized.
            Some(unsafe { self.items[index].assume_init_ref() })
        } else {
            None
        }
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if self.contains(index) {
            // SAFETY: checked above that the slot is initialized.
            Some(unsafe { self.items[index].assume_init_mut() })
        } else {
            None
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

impl<T> std::ops::Index<usize> for Slab<T> {
    type Output = T;

    /// # Panics
    ///
    /// Panics if the slot is vacant.
    fn index(&self, index: usize) -> &T {
        self.get(index).expect("vacant slab slot")
    }
}

impl<T> std::ops::IndexMut<usize> for Slab<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        self.get_mut(index).expect("vacant slab slot")
    }
}

impl<T> Drop for Slab<T> {
    /// Drops all initialized elements stored in the slab.
    fn drop(&mut self) {
        for (slot, &used) in self.items.iter_mut().zip(self.used.iter()) {
            if used {
                // SAFETY: `used` marks initialized slots.
                unsafe {
                    slot.assume_init_drop();
                }
            }
        }
    }
}
