use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ViewMode {
    /// Show the output of the frame transform.
    Processed,
    /// Show the camera image as captured.
    Raw,
}

impl ViewMode {
    pub fn toggled(self) -> Self {
        match self {
            ViewMode::Processed => ViewMode::Raw,
            ViewMode::Raw => ViewMode::Processed,
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewMode::Processed => write!(f, "processed"),
            ViewMode::Raw => write!(f, "raw"),
        }
    }
}

/// Shared view mode flag. Written by the UI, read by the capture thread once per frame.
#[derive(Debug, Clone)]
pub struct ViewModeSelector {
    processed: Arc<AtomicBool>,
}

impl ViewModeSelector {
    pub fn new(initial: ViewMode) -> Self {
        Self {
            processed: Arc::new(AtomicBool::new(initial == ViewMode::Processed)),
        }
    }

    pub fn get(&self) -> ViewMode {
        if self.processed.load(Ordering::Relaxed) {
            ViewMode::Processed
        } else {
            ViewMode::Raw
        }
    }

    pub fn set(&self, mode: ViewMode) {
        self.processed
            .store(mode == ViewMode::Processed, Ordering::Relaxed);
    }

    /// Flips the mode and returns the new one.
    pub fn toggle(&self) -> ViewMode {
        let was_processed = self.processed.fetch_xor(true, Ordering::Relaxed);
        if was_processed {
            ViewMode::Raw
        } else {
            ViewMode::Processed
        }
    }
}
