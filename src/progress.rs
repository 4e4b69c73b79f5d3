//! Job progress events.
//!
//! Long-running operations report progress through an optional
//! `crossbeam_channel::Sender<ProgressEvent>`. Sending never blocks and a
//! disconnected receiver is ignored.

use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Progress of one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Job the event belongs to
    pub job_id: Uuid,
    /// Units of work finished
    pub completed: usize,
    /// Units of work in the job
    pub total: usize,
    /// `completed / total`, 1.0 for an empty job
    pub fraction: f64,
    /// Human-readable status
    pub message: String,
    /// When the event was created
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    /// Event stamped with the current time
    pub fn new(job_id: Uuid, completed: usize, total: usize, message: impl Into<String>) -> Self {
        let fraction = if total == 0 {
            1.0
        } else {
            completed as f64 / total as f64
        };
        Self {
            job_id,
            completed,
            total,
            fraction,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Whether every unit is finished
    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }
}

/// Send without blocking, dropping the event if the channel is full or closed
pub fn report(sender: Option<&Sender<ProgressEvent>>, event: ProgressEvent) {
    if let Some(tx) = sender {
        let _ = tx.try_send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction() {
        let id = Uuid::new_v4();
        assert_eq!(ProgressEvent::new(id, 1, 4, "x").fraction, 0.25);
        assert_eq!(ProgressEvent::new(id, 0, 0, "x").fraction, 1.0);
        assert!(ProgressEvent::new(id, 4, 4, "x").is_complete());
    }

    #[test]
    fn test_report_ignores_closed_channel() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        drop(rx);
        report(Some(&tx), ProgressEvent::new(Uuid::new_v4(), 1, 1, "done"));
        report(None, ProgressEvent::new(Uuid::new_v4(), 1, 1, "done"));
    }

    #[test]
    fn test_report_does_not_block_when_full() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let id = Uuid::new_v4();
        report(Some(&tx), ProgressEvent::new(id, 1, 2, "first"));
        report(Some(&tx), ProgressEvent::new(id, 2, 2, "second"));
        assert_eq!(rx.len(), 1);
        assert_eq!(rx.recv().unwrap().message, "first");
    }
}
