use std::ops::Range;

/// Scroll geometry of a list of fixed-height items.
///
/// Every item is `item_height` rows tall, so the visible index range is a
/// constant-time computation from the scroll offset. Offsets are in rows
/// from the top of the content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollWindow {
    len: usize,
    item_height: usize,
    viewport: usize,
    offset: usize,
    overscan: usize,
}

impl ScrollWindow {
    pub fn new(item_height: usize, viewport: usize, overscan: usize) -> Self {
        Self {
            len: 0,
            item_height: item_height.max(1),
            viewport,
            offset: 0,
            overscan,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn item_height(&self) -> usize {
        self.item_height
    }

    pub fn viewport(&self) -> usize {
        self.viewport
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Total virtual height of the loaded content.
    pub fn content_height(&self) -> usize {
        self.len * self.item_height
    }

    pub fn max_offset(&self) -> usize {
        self.content_height().saturating_sub(self.viewport)
    }

    /// Set the item count after an append or reset. The offset is kept when
    /// still valid.
    pub fn set_len(&mut self, len: usize) {
        self.len = len;
        self.offset = self.offset.min(self.max_offset());
    }

    pub fn set_viewport(&mut self, viewport: usize) {
        self.viewport = viewport;
        self.offset = self.offset.min(self.max_offset());
    }

    pub fn scroll_to(&mut self, offset: usize) {
        self.offset = offset.min(self.max_offset());
    }

    pub fn scroll_by(&mut self, delta: isize) {
        let target = if delta.is_negative() {
            self.offset.saturating_sub(delta.unsigned_abs())
        } else {
            self.offset.saturating_add(delta.unsigned_abs())
        };
        self.scroll_to(target);
    }

    /// Items intersecting the viewport, without overscan.
    pub fn viewport_range(&self) -> Range<usize> {
        self.rows_to_items(self.offset, self.offset + self.viewport)
    }

    /// Items to render: the viewport range widened by `overscan` items on
    /// each side.
    pub fn visible_range(&self) -> Range<usize> {
        let range = self.viewport_range();
        let start = range.start.saturating_sub(self.overscan);
        let end = (range.end + self.overscan).min(self.len);
        start..end
    }

    /// Items intersecting the viewport grown by `margin` rows above and below.
    pub fn range_with_margin(&self, margin: usize) -> Range<usize> {
        let top = self.offset.saturating_sub(margin);
        let bottom = self.offset + self.viewport + margin;
        self.rows_to_items(top, bottom)
    }

    /// Whether the bottom of the viewport is within `margin` rows of the end
    /// of the loaded content. Always true for empty content.
    pub fn near_bottom(&self, margin: usize) -> bool {
        self.offset + self.viewport + margin >= self.content_height()
    }

    /// Top row of an item in content coordinates.
    pub fn item_top(&self, index: usize) -> usize {
        index * self.item_height
    }

    /// Index of the item under the first viewport row.
    pub fn focused_index(&self) -> Option<usize> {
        (self.len > 0).then(|| (self.offset / self.item_height).min(self.len - 1))
    }

    fn rows_to_items(&self, top: usize, bottom: usize) -> Range<usize> {
        if self.len == 0 || bottom <= top {
            return 0..0;
        }
        let first = (top / self.item_height).min(self.len);
        let last = bottom.div_ceil(self.item_height).min(self.len);
        first..last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn window(len: usize) -> ScrollWindow {
        let mut w = ScrollWindow::new(10, 25, 1);
        w.set_len(len);
        w
    }

    #[test]
    fn test_empty_window() {
        let w = ScrollWindow::new(10, 25, 2);
        assert_eq!(w.visible_range(), 0..0);
        assert_eq!(w.content_height(), 0);
        assert!(w.near_bottom(0));
        assert_eq!(w.focused_index(), None);
    }

    #[test]
    fn test_visible_range_with_overscan() {
        let mut w = window(100);
        assert_eq!(w.viewport_range(), 0..3);
        assert_eq!(w.visible_range(), 0..4);

        w.scroll_to(105);
        // Rows 105..130 cover items 10, 11 and 12.
        assert_eq!(w.viewport_range(), 10..13);
        assert_eq!(w.visible_range(), 9..14);
        assert_eq!(w.focused_index(), Some(10));
    }

    #[test]
    fn test_scroll_clamps_to_content() {
        let mut w = window(5);
        w.scroll_to(1_000);
        assert_eq!(w.offset(), 25);
        assert_eq!(w.viewport_range(), 2..5);
        assert_eq!(w.visible_range(), 1..5);

        w.scroll_by(-100);
        assert_eq!(w.offset(), 0);
    }

    #[test]
    fn test_near_bottom_margin() {
        let mut w = window(10);
        assert!(!w.near_bottom(30));
        w.scroll_to(50);
        // 50 + 25 + 30 >= 100
        assert!(w.near_bottom(30));
        assert!(!w.near_bottom(20));
    }

    #[test]
    fn test_range_with_margin() {
        let mut w = window(100);
        w.scroll_to(200);
        assert_eq!(w.range_with_margin(0), 20..23);
        assert_eq!(w.range_with_margin(30), 17..26);
    }

    #[test]
    fn test_shrinking_reclamps_offset() {
        let mut w = window(10);
        w.scroll_to(75);
        w.set_len(3);
        assert_eq!(w.offset(), 5);
        w.set_len(0);
        assert_eq!(w.offset(), 0);
    }

    #[test]
    fn test_resize_viewport() {
        let mut w = window(10);
        w.scroll_to(75);
        w.set_viewport(60);
        assert_eq!(w.offset(), 40);
        assert_eq!(w.viewport_range(), 4..10);
    }
}
