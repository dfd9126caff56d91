//! Job progress events.
//!
//! Every job emits discrete events which the scheduler multiplexes onto
//! a single channel for the renderer. Streaming providers report real
//! percentages; non-streaming providers simulate them.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::mpsc;

/// Discrete progress events for one job
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Queued {
        endpoint: String,
    },
    Started {
        endpoint: String,
        provider: String,
    },
    Attempt {
        endpoint: String,
        provider: String,
        attempt: u32,
    },
    Streaming {
        endpoint: String,
        percent: f32,
    },
    Validated {
        endpoint: String,
    },
    Written {
        endpoint: String,
        path: PathBuf,
    },
    Skipped {
        endpoint: String,
    },
    Failed {
        endpoint: String,
        provider: String,
        error: String,
    },
}

pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

pub fn channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Per-job progress tracker shared between the worker and the provider
/// client. Keeps the current percentage so retries can roll it back.
#[derive(Debug)]
pub struct ProgressHandle {
    endpoint: String,
    sender: Option<ProgressSender>,
    current_bits: AtomicU32,
}

impl ProgressHandle {
    pub fn new(endpoint: impl Into<String>, sender: Option<ProgressSender>) -> Self {
        Self {
            endpoint: endpoint.into(),
            sender,
            current_bits: AtomicU32::new(0f32.to_bits()),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn percent(&self) -> f32 {
        f32::from_bits(self.current_bits.load(Ordering::Relaxed))
    }

    /// Advance (or regress) to a percentage in [0.0, 1.0].
    pub fn set_percent(&self, percent: f32) {
        let clamped = percent.clamp(0.0, 1.0);
        self.current_bits.store(clamped.to_bits(), Ordering::Relaxed);
        self.emit(ProgressEvent::Streaming {
            endpoint: self.endpoint.clone(),
            percent: clamped,
        });
    }

    /// Roll back on retry so the user sees an honest regression:
    /// 30% of the current value is lost, floored at 10%.
    pub fn rollback(&self) {
        let rolled = (self.percent() * 0.7).max(0.1);
        self.set_percent(rolled);
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }
}
