//! Incremental page window over an ordered result set.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageWindow {
    initial: usize,
    increment: usize,
    window: usize,
    len: usize,
}

impl PageWindow {
    /// An increment of 0 is bumped to 1 so `request_more` always progresses.
    pub fn new(initial: usize, increment: usize) -> Self {
        Self { initial, increment: increment.max(1), window: initial, len: 0 }
    }

    /// Point the window at a new result set of `len` ids.
    pub fn reset(&mut self, len: usize) {
        self.len = len;
        self.window = self.initial;
    }

    /// Number of ids currently revealed.
    pub fn visible(&self) -> usize { self.window.min(self.len) }

    pub fn current_page<'a, T>(&self, results: &'a [T]) -> &'a [T] {
        &results[..self.visible().min(results.len())]
    }

    pub fn has_more(&self) -> bool { self.window < self.len }

    /// Grow by one increment, capped at the result length. Returns whether
    /// the window moved.
    pub fn request_more(&mut self) -> bool {
        if !self.has_more() {
            return false;
        }
        self.window = (self.window + self.increment).min(self.len);
        true
    }
}
