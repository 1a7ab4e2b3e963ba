//! UI targets the poller draws into.
//!
//! The poller never touches a concrete UI. It calls these traits, and the
//! host (terminal, GUI, test recorder) decides what a progress bar or a
//! preview slot is. Every sink is torn down exactly once, when its
//! session ends, and must leave its host as it found it.

use std::collections::VecDeque;

use crate::render::ProgressView;

/// Receives progress updates for one session.
pub trait ProgressSink: Send {
    /// Draw the bar for one snapshot.
    fn render_progress(&mut self, view: &ProgressView);

    /// Update the window title. Called only when the title changes.
    fn set_title(&mut self, _title: &str) {}

    /// Remove everything this sink added to its host.
    fn teardown(&mut self);
}

/// Receives live preview images for one session.
pub trait PreviewSink: Send {
    /// Show a new preview image (URL or `data:` URI).
    fn append_preview(&mut self, image: &str);

    /// Drop a previously appended image.
    fn remove_preview(&mut self, image: &str);

    /// Remove the preview area from its host.
    fn teardown(&mut self);
}

/// A preview sink plus the bounded FIFO of images it currently shows.
pub struct PreviewStrip {
    sink: Box<dyn PreviewSink>,
    shown: VecDeque<String>,
    capacity: usize,
}

impl PreviewStrip {
    pub fn new(sink: Box<dyn PreviewSink>, capacity: usize) -> Self {
        Self {
            sink,
            shown: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    /// Append `image`. The oldest images are evicted first so the host
    /// never holds more than `capacity`.
    pub fn push(&mut self, image: &str) {
        while self.shown.len() >= self.capacity {
            match self.shown.pop_front() {
                Some(oldest) => self.sink.remove_preview(&oldest),
                None => break,
            }
        }
        self.sink.append_preview(image);
        self.shown.push_back(image.to_string());
    }

    pub fn len(&self) -> usize {
        self.shown.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shown.is_empty()
    }

    pub fn teardown(&mut self) {
        self.shown.clear();
        self.sink.teardown();
    }
}
