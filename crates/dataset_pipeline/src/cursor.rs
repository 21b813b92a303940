use crate::partition::Window;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Read position into the active partition window.
///
/// Producers share one cursor. `claim` is a single `fetch_add`, so each index
/// position inside the window is handed to exactly one reader even when many
/// producers pull rows at the same time. The order in which producers observe
/// positions is unspecified.
#[derive(Debug)]
pub struct Cursor {
    next: AtomicUsize,
    window: Window,
    index_len: usize,
}

impl Cursor {
    /// Creates a cursor positioned at the start of `window`.
    ///
    /// `index_len` bounds the window so that oversubscribed partitions stop
    /// at the last indexed row.
    pub fn new(window: Window, index_len: usize) -> Self {
        Self {
            next: AtomicUsize::new(window.offset),
            window,
            index_len,
        }
    }

    /// Claims the next position, or `None` once the window or the index is
    /// exhausted.
    pub fn claim(&self) -> Option<usize> {
        let position = self.next.fetch_add(1, Ordering::Relaxed);
        if position < self.end() {
            Some(position)
        } else {
            None
        }
    }

    pub fn window(&self) -> Window {
        self.window
    }

    /// Positions the window covers once clamped to the index.
    pub fn window_len(&self) -> usize {
        self.end().saturating_sub(self.window.offset)
    }

    /// Number of positions not yet claimed.
    pub fn remaining(&self) -> usize {
        self.end()
            .saturating_sub(self.next.load(Ordering::Relaxed).max(self.window.offset))
    }

    fn end(&self) -> usize {
        self.window.end().min(self.index_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_claims_stay_inside_window() {
        let cursor = Cursor::new(Window::new(3, 2), 10);
        assert_eq!(cursor.claim(), Some(3));
        assert_eq!(cursor.claim(), Some(4));
        assert_eq!(cursor.claim(), None);
        assert_eq!(cursor.claim(), None);
    }

    #[test]
    fn test_window_is_clamped_to_index() {
        let cursor = Cursor::new(Window::new(8, 5), 10);
        assert_eq!(cursor.remaining(), 2);
        let claimed: Vec<_> = std::iter::from_fn(|| cursor.claim()).collect();
        assert_eq!(claimed, vec![8, 9]);
    }

    #[test]
    fn test_window_len_ignores_claims() {
        let cursor = Cursor::new(Window::new(1, 2), 10);
        while cursor.claim().is_some() {}
        assert_eq!(cursor.remaining(), 0);
        assert_eq!(cursor.window_len(), 2);

        assert_eq!(Cursor::new(Window::new(8, 5), 10).window_len(), 2);
        assert_eq!(Cursor::new(Window::new(12, 3), 10).window_len(), 0);
    }

    #[test]
    fn test_concurrent_claims_are_unique() {
        let cursor = Arc::new(Cursor::new(Window::new(0, 1000), 1000));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let cursor = cursor.clone();
                let seen = seen.clone();
                std::thread::spawn(move || {
                    while let Some(position) = cursor.claim() {
                        seen.lock().unwrap().push(position);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1000);
        let unique: HashSet<_> = seen.iter().copied().collect();
        assert_eq!(unique.len(), 1000);
    }
}
