use std::collections::VecDeque;

/// Fixed-capacity ring of the most recent items, newest first.
///
/// Once full, every push evicts exactly one entry: the oldest.
#[derive(Debug, Clone)]
pub struct SlidingWindow<T> {
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> SlidingWindow<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    /// Drop everything and start over empty with a new capacity.
    ///
    /// Nothing is carried across: entries gathered under a different
    /// capacity are not comparable with the ones that follow.
    pub fn resize(&mut self, capacity: usize) {
        *self = Self::new(capacity);
    }

    /// Insert `item` as the newest entry, returning the evicted oldest entry
    /// if the window was already full.
    pub fn push_front(&mut self, item: T) -> Option<T> {
        let evicted = if self.is_full() {
            self.items.pop_back()
        } else {
            None
        };
        self.items.push_front(item);
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn oldest(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn newest(&self) -> Option<&T> {
        self.items.front()
    }

    /// Iterate newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}
