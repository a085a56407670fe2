//! Progress notifications and cooperative cancellation.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Pipeline stage for a single video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Pending,
    Extracting,
    Recognizing,
    Translating,
    Rendering,
    Done,
    Failed,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Pending => write!(f, "pending"),
            Stage::Extracting => write!(f, "extracting"),
            Stage::Recognizing => write!(f, "recognizing"),
            Stage::Translating => write!(f, "translating"),
            Stage::Rendering => write!(f, "rendering"),
            Stage::Done => write!(f, "done"),
            Stage::Failed => write!(f, "failed"),
        }
    }
}

/// A single progress notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub message: String,
    /// Completion fraction in `[0, 1]`, absent for purely informational events.
    pub percent: Option<f64>,
}

pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Forwards events to a callback, keeping reported percentages non-decreasing.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    high_water: Arc<Mutex<f64>>,
}

impl ProgressReporter {
    pub fn new(callback: ProgressCallback) -> Self {
        Self {
            callback: Some(callback),
            high_water: Arc::new(Mutex::new(0.0)),
        }
    }

    /// A reporter that drops every event.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn report(&self, stage: Stage, message: impl Into<String>, percent: Option<f64>) {
        let percent = percent.map(|p| {
            let mut high = self
                .high_water
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let clamped = p.clamp(0.0, 1.0).max(*high);
            *high = clamped;
            clamped
        });

        if let Some(callback) = &self.callback {
            callback(&ProgressEvent {
                stage,
                message: message.into(),
                percent,
            });
        }
    }
}

/// Shared flag checked at every stage boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
