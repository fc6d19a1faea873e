//! Virtualized terminal viewer: a windowed model over the log buffer that
//! stays cheap regardless of log volume.
//!
//! Only the visible window plus a small overscan margin is rendered. Entry
//! heights vary (wrapped text) and are measured after render; until
//! measured, an estimate keeps the scroll geometry usable.
//!
//! Auto-scroll state machine: ON while the user has not scrolled away from
//! the bottom; any scroll that leaves the viewport more than a threshold
//! above the bottom turns it OFF, and new entries then never yank the view.
//! Returning to the bottom (or an explicit toggle) turns it back ON.

use std::ops::Range;

/// Geometry configuration for the viewer
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    /// Fixed viewport height in pixels
    pub viewport_height: f64,
    /// Extra entries rendered above and below the visible window
    pub overscan: usize,
    /// How close to the bottom still counts as "at the bottom"
    pub bottom_threshold: f64,
    /// Assumed entry height until the real one is measured
    pub estimated_entry_height: f64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            viewport_height: 600.0,
            overscan: 10,
            bottom_threshold: 40.0,
            estimated_entry_height: 18.0,
        }
    }
}

/// Windowed view state over an append-only (front-evictable) entry list.
///
/// The viewer tracks geometry only; entry contents stay in the store.
#[derive(Debug)]
pub struct TerminalViewer {
    config: ViewerConfig,
    heights: Vec<f64>,
    total_height: f64,
    scroll_top: f64,
    auto_scroll: bool,
}

impl TerminalViewer {
    pub fn new(config: ViewerConfig) -> Self {
        Self {
            config,
            heights: Vec::new(),
            total_height: 0.0,
            scroll_top: 0.0,
            auto_scroll: true,
        }
    }

    pub fn len(&self) -> usize {
        self.heights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heights.is_empty()
    }

    pub fn total_height(&self) -> f64 {
        self.total_height
    }

    pub fn scroll_top(&self) -> f64 {
        self.scroll_top
    }

    pub fn auto_scroll(&self) -> bool {
        self.auto_scroll
    }

    fn max_scroll(&self) -> f64 {
        (self.total_height - self.config.viewport_height).max(0.0)
    }

    fn distance_from_bottom(&self) -> f64 {
        self.max_scroll() - self.scroll_top
    }

    /// Register `count` newly appended entries.
    ///
    /// With auto-scroll ON the viewport snaps to the new bottom; with it
    /// OFF the scroll offset relative to existing content is unchanged.
    pub fn append(&mut self, count: usize) {
        for _ in 0..count {
            self.heights.push(self.config.estimated_entry_height);
            self.total_height += self.config.estimated_entry_height;
        }
        if self.auto_scroll {
            self.scroll_top = self.max_scroll();
        }
    }

    /// Register `count` entries evicted from the front of the ring buffer.
    ///
    /// When scrolled up, the offset is shifted by the removed height so the
    /// content under the viewport does not move.
    pub fn evict_front(&mut self, count: usize) {
        let count = count.min(self.heights.len());
        let removed: f64 = self.heights.drain(..count).sum();
        self.total_height -= removed;
        if self.auto_scroll {
            self.scroll_top = self.max_scroll();
        } else {
            self.scroll_top = (self.scroll_top - removed).clamp(0.0, self.max_scroll());
        }
    }

    /// Replace everything, e.g. after a snapshot resync or run restart
    pub fn reset(&mut self, count: usize) {
        self.heights.clear();
        self.total_height = 0.0;
        self.scroll_top = 0.0;
        self.auto_scroll = true;
        self.append(count);
    }

    /// Record the measured height of a rendered entry.
    ///
    /// Measurements above the viewport shift the offset by the delta so the
    /// visible content stays put.
    pub fn set_measured_height(&mut self, index: usize, height: f64) {
        let Some(slot) = self.heights.get_mut(index) else {
            return;
        };
        let delta = height - *slot;
        *slot = height;
        self.total_height += delta;

        if self.auto_scroll {
            self.scroll_top = self.max_scroll();
        } else {
            let offset: f64 = self.heights[..index].iter().sum();
            if offset + height <= self.scroll_top {
                self.scroll_top = (self.scroll_top + delta).clamp(0.0, self.max_scroll());
            }
        }
    }

    /// Handle a user scroll to an absolute offset
    pub fn on_scroll(&mut self, scroll_top: f64) {
        self.scroll_top = scroll_top.clamp(0.0, self.max_scroll());
        self.auto_scroll = self.distance_from_bottom() <= self.config.bottom_threshold;
    }

    /// Explicit auto-scroll toggle; enabling jumps to the bottom
    pub fn set_auto_scroll(&mut self, enabled: bool) {
        self.auto_scroll = enabled;
        if enabled {
            self.scroll_top = self.max_scroll();
        }
    }

    /// The entry index range to render (visible window plus overscan) and
    /// the pixel offset of the first rendered entry.
    pub fn visible_range(&self) -> (Range<usize>, f64) {
        if self.heights.is_empty() {
            return (0..0, 0.0);
        }

        let mut first = self.heights.len();
        let mut cursor = 0.0;
        let mut first_offset = 0.0;
        for (i, h) in self.heights.iter().enumerate() {
            if cursor + h > self.scroll_top {
                first = i;
                first_offset = cursor;
                break;
            }
            cursor += h;
        }

        let bottom = self.scroll_top + self.config.viewport_height;
        let mut last = first;
        let mut cursor = first_offset;
        for (i, h) in self.heights.iter().enumerate().skip(first) {
            last = i;
            cursor += h;
            if cursor >= bottom {
                break;
            }
        }

        let start = first.saturating_sub(self.config.overscan);
        let end = (last + 1 + self.config.overscan).min(self.heights.len());
        let overscan_offset: f64 = self.heights[start..first].iter().sum();
        (start..end, first_offset - overscan_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewer() -> TerminalViewer {
        TerminalViewer::new(ViewerConfig {
            viewport_height: 100.0,
            overscan: 2,
            bottom_threshold: 10.0,
            estimated_entry_height: 10.0,
        })
    }

    #[test]
    fn test_auto_scroll_sticks_to_bottom_on_append() {
        let mut v = viewer();
        v.append(50);
        assert!(v.auto_scroll());
        assert_eq!(v.scroll_top(), v.total_height() - 100.0);
        v.append(10);
        assert_eq!(v.scroll_top(), v.total_height() - 100.0);
    }

    #[test]
    fn test_scrolled_up_offset_is_stable_on_append() {
        let mut v = viewer();
        v.append(50);
        v.on_scroll(120.0);
        assert!(!v.auto_scroll());
        v.append(25);
        assert_eq!(v.scroll_top(), 120.0, "incoming lines must not yank the view");
    }

    #[test]
    fn test_scrolling_back_to_bottom_reenables_auto_scroll() {
        let mut v = viewer();
        v.append(50);
        v.on_scroll(100.0);
        assert!(!v.auto_scroll());
        // Within the threshold of the bottom counts as bottom
        v.on_scroll(v.total_height() - 100.0 - 5.0);
        assert!(v.auto_scroll());
    }

    #[test]
    fn test_explicit_toggle_jumps_to_bottom() {
        let mut v = viewer();
        v.append(50);
        v.on_scroll(0.0);
        assert!(!v.auto_scroll());
        v.set_auto_scroll(true);
        assert!(v.auto_scroll());
        assert_eq!(v.scroll_top(), 400.0);
    }

    #[test]
    fn test_eviction_keeps_content_stable_when_scrolled_up() {
        let mut v = viewer();
        v.append(50);
        v.on_scroll(200.0);
        // 5 entries of height 10 leave the front; same content now starts
        // 50px earlier.
        v.evict_front(5);
        assert_eq!(v.scroll_top(), 150.0);
    }

    #[test]
    fn test_measured_height_above_viewport_compensates() {
        let mut v = viewer();
        v.append(50);
        v.on_scroll(200.0);
        // Entry 0 is fully above the viewport; growing it by 30 shifts
        // everything below down, so the offset follows.
        v.set_measured_height(0, 40.0);
        assert_eq!(v.scroll_top(), 230.0);
        // An entry inside the window does not shift the offset
        v.set_measured_height(25, 40.0);
        assert_eq!(v.scroll_top(), 230.0);
    }

    #[test]
    fn test_visible_range_covers_viewport_with_overscan() {
        let mut v = viewer();
        v.append(100);
        v.on_scroll(250.0);
        let (range, offset) = v.visible_range();
        // Entries 25..35 are visible (10px each, 100px viewport), plus 2
        // overscan on each side.
        assert_eq!(range, 23..37);
        assert_eq!(offset, 230.0);
    }

    #[test]
    fn test_visible_range_short_content() {
        let mut v = viewer();
        v.append(3);
        let (range, offset) = v.visible_range();
        assert_eq!(range, 0..3);
        assert_eq!(offset, 0.0);
    }

    #[test]
    fn test_empty_viewer() {
        let v = viewer();
        let (range, offset) = v.visible_range();
        assert_eq!(range, 0..0);
        assert_eq!(offset, 0.0);
        assert_eq!(v.total_height(), 0.0);
    }
}
