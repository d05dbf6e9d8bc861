use std::ops::Range;

/// Rows from the tail within which manual scrolling resumes follow mode.
const AUTO_FOLLOW_RESUME_THRESHOLD: usize = 1;
pub const DEFAULT_VIEWPORT_ROWS: usize = 20;

/// Row-based follow-bottom tracking for the message pane.
///
/// `offset` is the first visible row. Follow mode pins the viewport to the newest rows
/// until the user scrolls away from the tail.
#[derive(Debug, Clone)]
pub struct ScrollManager {
    viewport_rows: usize,
    total_rows: usize,
    offset: usize,
    pending_scroll_to_bottom: bool,
    follow_bottom: bool,
}

impl ScrollManager {
    pub fn new(viewport_rows: usize) -> Self {
        Self {
            viewport_rows: viewport_rows.max(1),
            total_rows: 0,
            offset: 0,
            pending_scroll_to_bottom: false,
            follow_bottom: true,
        }
    }

    pub fn is_following_bottom(&self) -> bool {
        self.follow_bottom
    }

    pub fn request_scroll_to_bottom(&mut self) {
        self.pending_scroll_to_bottom = true;
        self.follow_bottom = true;
    }

    pub fn request_scroll_to_bottom_if_following(&mut self) {
        if self.follow_bottom || self.is_near_bottom() {
            self.pending_scroll_to_bottom = true;
        }
    }

    pub fn reset(&mut self) {
        self.total_rows = 0;
        self.offset = 0;
        self.follow_bottom = true;
        self.pending_scroll_to_bottom = true;
    }

    /// Records a new content length, keeping the offset in range.
    pub fn set_total_rows(&mut self, total_rows: usize) {
        self.total_rows = total_rows;
        self.offset = self.offset.min(self.max_offset());
    }

    pub fn scroll_up(&mut self, rows: usize) {
        if rows == 0 {
            return;
        }
        self.offset = self.offset.saturating_sub(rows);
        self.pending_scroll_to_bottom = false;
        // Pause follow mode only when the tail is actually out of view.
        if !self.is_near_bottom() {
            self.follow_bottom = false;
        }
    }

    pub fn scroll_down(&mut self, rows: usize) {
        self.offset = self.offset.saturating_add(rows).min(self.max_offset());
        if !self.follow_bottom && self.is_near_bottom() {
            self.follow_bottom = true;
        }
    }

    pub fn apply_pending_scroll(&mut self) -> bool {
        let should_scroll = self.follow_bottom || self.pending_scroll_to_bottom;

        if should_scroll {
            self.offset = self.max_offset();
        }

        self.pending_scroll_to_bottom = false;
        should_scroll
    }

    pub fn visible_range(&self) -> Range<usize> {
        let end = (self.offset + self.viewport_rows).min(self.total_rows);
        self.offset..end
    }

    /// Rows below the viewport.
    pub fn rows_below(&self) -> usize {
        self.total_rows.saturating_sub(self.visible_range().end)
    }

    fn max_offset(&self) -> usize {
        self.total_rows.saturating_sub(self.viewport_rows)
    }

    fn is_near_bottom(&self) -> bool {
        self.max_offset().saturating_sub(self.offset) <= AUTO_FOLLOW_RESUME_THRESHOLD
    }
}

impl Default for ScrollManager {
    fn default() -> Self {
        Self::new(DEFAULT_VIEWPORT_ROWS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grow(scroll: &mut ScrollManager, total_rows: usize) {
        scroll.set_total_rows(total_rows);
        scroll.request_scroll_to_bottom_if_following();
        scroll.apply_pending_scroll();
    }

    #[test]
    fn follows_newest_rows_by_default() {
        let mut scroll = ScrollManager::new(3);

        grow(&mut scroll, 2);
        assert_eq!(scroll.visible_range(), 0..2);

        grow(&mut scroll, 7);
        assert_eq!(scroll.visible_range(), 4..7);
        assert!(scroll.is_following_bottom());
    }

    #[test]
    fn scrolling_away_pauses_follow() {
        let mut scroll = ScrollManager::new(3);
        grow(&mut scroll, 10);

        scroll.scroll_up(4);
        assert!(!scroll.is_following_bottom());
        assert_eq!(scroll.visible_range(), 3..6);

        grow(&mut scroll, 11);
        assert_eq!(scroll.visible_range(), 3..6);
        assert_eq!(scroll.rows_below(), 5);
    }

    #[test]
    fn returning_to_tail_resumes_follow() {
        let mut scroll = ScrollManager::new(3);
        grow(&mut scroll, 10);
        scroll.scroll_up(5);

        scroll.scroll_down(4);
        assert!(scroll.is_following_bottom());

        grow(&mut scroll, 12);
        assert_eq!(scroll.visible_range(), 9..12);
    }

    #[test]
    fn explicit_request_jumps_to_tail() {
        let mut scroll = ScrollManager::new(3);
        grow(&mut scroll, 10);
        scroll.scroll_up(6);

        scroll.request_scroll_to_bottom();
        scroll.apply_pending_scroll();

        assert_eq!(scroll.visible_range(), 7..10);
    }

    #[test]
    fn huge_scroll_down_clamps_to_tail() {
        let mut scroll = ScrollManager::new(3);
        grow(&mut scroll, 10);
        scroll.scroll_up(2);

        scroll.scroll_down(usize::MAX);

        assert_eq!(scroll.visible_range(), 7..10);
        assert!(scroll.is_following_bottom());
    }

    #[test]
    fn reset_starts_over_at_the_top() {
        let mut scroll = ScrollManager::new(3);
        grow(&mut scroll, 10);
        scroll.scroll_up(6);

        scroll.reset();
        assert_eq!(scroll.visible_range(), 0..0);
        grow(&mut scroll, 4);
        assert_eq!(scroll.visible_range(), 1..4);
    }
}
