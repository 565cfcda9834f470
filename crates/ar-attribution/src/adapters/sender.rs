//! Report sender adapters.
//!
//! Real delivery belongs to the embedder's network stack. The recording
//! sender captures every attempt and replays scripted outcomes.

use crate::domain::{Report, ReportId};
use crate::ports::outbound::{ReportSender, SendOutcome, SendStatus};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// One captured delivery attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct SentReport {
    pub report: Report,
    pub is_debug: bool,
    pub outcome: SendOutcome,
}

/// Sender that records attempts and answers with scripted outcomes.
///
/// Scripted outcomes are consumed in order; afterwards every send succeeds
/// with HTTP 200.
#[derive(Debug, Default)]
pub struct RecordingReportSender {
    sent: Mutex<Vec<SentReport>>,
    script: Mutex<VecDeque<SendOutcome>>,
}

impl RecordingReportSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues outcomes for the next sends.
    pub fn with_script(outcomes: impl IntoIterator<Item = SendOutcome>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            script: Mutex::new(outcomes.into_iter().collect()),
        }
    }

    /// Fails the next `n` sends transiently.
    pub fn fail_next(&self, n: usize) {
        let mut script = self.script.lock();
        script.extend(std::iter::repeat(SendOutcome::transient_failure()).take(n));
    }

    pub fn sent(&self) -> Vec<SentReport> {
        self.sent.lock().clone()
    }

    /// Removes and returns captured attempts.
    pub fn take(&self) -> Vec<SentReport> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Ids of reports delivered successfully (non-debug).
    pub fn delivered_ids(&self) -> Vec<ReportId> {
        self.sent
            .lock()
            .iter()
            .filter(|s| !s.is_debug && s.outcome.status == SendStatus::Sent)
            .map(|s| s.report.id)
            .collect()
    }
}

#[async_trait]
impl ReportSender for RecordingReportSender {
    async fn send(&self, report: &Report, is_debug: bool) -> SendOutcome {
        let outcome = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| SendOutcome::sent(200));
        self.sent.lock().push(SentReport {
            report: report.clone(),
            is_debug,
            outcome,
        });
        outcome
    }
}
