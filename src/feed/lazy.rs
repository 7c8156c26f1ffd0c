use std::collections::HashSet;

use super::window::ScrollWindow;

/// One-shot image reveal tracking.
///
/// Items render with placeholder images until their bounds come within
/// `margin` rows of the viewport. At that point the item is reported once,
/// marked loaded, and never reported again even after scrolling away.
#[derive(Debug, Clone, Default)]
pub struct LazyImages {
    loaded: HashSet<i64>,
    margin: usize,
}

impl LazyImages {
    pub fn new(margin: usize) -> Self {
        Self {
            loaded: HashSet::new(),
            margin,
        }
    }

    pub fn is_loaded(&self, id: i64) -> bool {
        self.loaded.contains(&id)
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    /// Ids of the items in `items` (indexed like the window) that just
    /// entered the margin. Only the slice under the window is read.
    pub fn reveal<T>(
        &mut self,
        window: &ScrollWindow,
        items: &[T],
        id_of: impl Fn(&T) -> i64,
    ) -> Vec<i64> {
        let range = window.range_with_margin(self.margin);
        let mut revealed = Vec::new();
        for id in items.get(range).unwrap_or_default().iter().map(id_of) {
            if self.loaded.insert(id) {
                revealed.push(id);
            }
        }
        revealed
    }

    pub fn clear(&mut self) {
        self.loaded.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(len: usize) -> (ScrollWindow, Vec<i64>) {
        let mut window = ScrollWindow::new(10, 20, 0);
        window.set_len(len);
        let ids = (0..len as i64).map(|i| 1000 - i).collect();
        (window, ids)
    }

    #[test]
    fn test_reveal_is_one_shot() {
        let (mut window, ids) = setup(20);
        let mut images = LazyImages::new(10);

        // Rows 0..30 cover items 0, 1 and 2.
        assert_eq!(images.reveal(&window, &ids, |&id| id), vec![1000, 999, 998]);
        assert!(images.reveal(&window, &ids, |&id| id).is_empty());

        window.scroll_to(100);
        // Rows 90..130 cover items 9..13.
        assert_eq!(images.reveal(&window, &ids, |&id| id), vec![991, 990, 989, 988]);

        window.scroll_to(0);
        assert!(images.reveal(&window, &ids, |&id| id).is_empty());
        assert!(images.is_loaded(999));
        assert!(!images.is_loaded(995));
    }

    #[test]
    fn test_zero_margin_matches_viewport() {
        let (window, ids) = setup(20);
        let mut images = LazyImages::new(0);
        assert_eq!(images.reveal(&window, &ids, |&id| id), vec![1000, 999]);
    }

    #[test]
    fn test_clear_resets() {
        let (window, ids) = setup(3);
        let mut images = LazyImages::new(0);
        images.reveal(&window, &ids, |&id| id);
        images.clear();
        assert_eq!(images.loaded_count(), 0);
        assert_eq!(images.reveal(&window, &ids, |&id| id).len(), 2);
    }

    #[test]
    fn test_reads_only_the_window_slice() {
        let (mut window, ids) = setup(10_000);
        window.scroll_to(50_000);
        let mut images = LazyImages::new(10);
        let reads = std::cell::Cell::new(0);

        let revealed = images.reveal(&window, &ids, |&id| {
            reads.set(reads.get() + 1);
            id
        });
        // Rows 49_990..50_030 cover items 4999..5002.
        assert_eq!(revealed, vec![-3999, -4000, -4001, -4002]);
        assert_eq!(reads.get(), 4);
    }

    #[test]
    fn test_empty_ids() {
        let window = ScrollWindow::new(10, 20, 0);
        let mut images = LazyImages::new(50);
        assert!(images.reveal(&window, &[] as &[i64], |&id| id).is_empty());
    }
}
