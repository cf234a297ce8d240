use std::time::Duration;

/// Geometry of the scrollable message list at a point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl ScrollMetrics {
    #[must_use]
    pub fn distance_from_bottom(&self) -> f64 {
        self.scroll_height - self.scroll_top - self.client_height
    }

    #[must_use]
    pub fn at_top(&self) -> bool {
        self.scroll_top <= 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAction {
    /// Fetch the next older page.
    LoadOlder,
    /// Scroll to the newest message after `delay`.
    ScrollToBottom { delay: Duration },
}

/// Decides when the message list should page backwards or stick to the
/// newest message.
#[derive(Debug, Clone)]
pub struct ScrollController {
    threshold: f64,
    delay: Duration,
    initialized: bool,
    last_count: Option<usize>,
}

impl ScrollController {
    #[must_use]
    pub const fn new(threshold: f64, delay: Duration) -> Self {
        Self {
            threshold,
            delay,
            initialized: false,
            last_count: None,
        }
    }

    /// Called on user scroll. Reaching the top with more history available and
    /// no fetch in flight loads the next older page.
    #[must_use]
    pub fn on_scroll(
        &self,
        metrics: ScrollMetrics,
        has_next_page: bool,
        is_fetching: bool,
    ) -> Option<ScrollAction> {
        (metrics.at_top() && has_next_page && !is_fetching).then_some(ScrollAction::LoadOlder)
    }

    /// Called after a render with the current item count of the newest page.
    /// `metrics` is `None` while the list has not been laid out yet.
    ///
    /// The first laid-out render always scrolls to the bottom; afterwards the
    /// view only follows new content when it is already near the bottom.
    pub fn on_render(
        &mut self,
        metrics: Option<ScrollMetrics>,
        newest_count: usize,
    ) -> Option<ScrollAction> {
        let metrics = metrics?;
        let changed = self.last_count != Some(newest_count);
        self.last_count = Some(newest_count);

        if !self.initialized {
            self.initialized = true;
            return Some(ScrollAction::ScrollToBottom { delay: self.delay });
        }

        (changed && metrics.distance_from_bottom() <= self.threshold)
            .then_some(ScrollAction::ScrollToBottom { delay: self.delay })
    }

    #[must_use]
    pub const fn has_initialized(&self) -> bool {
        self.initialized
    }
}

impl Default for ScrollController {
    fn default() -> Self {
        Self::new(100.0, Duration::from_millis(100))
    }
}
