use crate::Result;
use crate::domain::outcome::{ResultCode, TransactionOutcome};
use crate::domain::ports::{ResultSink, StatusKind, StatusPresenter};
use async_trait::async_trait;
use log::warn;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// In-memory sink for exercising the orchestrator without touching disk.
#[derive(Default)]
pub struct InMemoryResultSink {
    outcome: Mutex<TransactionOutcome>,
    active: AtomicBool,
    publish_count: AtomicUsize,
}

impl InMemoryResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcome(&self) -> TransactionOutcome {
        self.outcome.lock().expect("outcome lock poisoned").clone()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn publish_count(&self) -> usize {
        self.publish_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResultSink for InMemoryResultSink {
    fn set_outcome(&self, code: ResultCode, detail: &str) {
        let mut outcome = self.outcome.lock().expect("outcome lock poisoned");
        if !outcome.set_result(code, detail) {
            warn!(
                "outcome already recorded, ignoring late write of {:?}",
                code
            );
        }
    }

    fn set_status(&self, receipt_number: u32, amount_minor: i64) {
        let mut outcome = self.outcome.lock().expect("outcome lock poisoned");
        outcome.set_status(receipt_number, amount_minor);
    }

    async fn activate(&self) -> Result<()> {
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn deactivate(&self) -> Result<()> {
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(&self) -> Result<()> {
        self.publish_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Records status lines for assertions in tests.
#[derive(Default)]
pub struct RecordingPresenter {
    lines: Mutex<Vec<(String, StatusKind)>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(String, StatusKind)> {
        self.lines.lock().expect("lines lock poisoned").clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .map(|(text, _)| text)
            .collect()
    }
}

impl StatusPresenter for RecordingPresenter {
    fn update_status(&self, text: &str, kind: StatusKind) {
        let mut lines = self.lines.lock().expect("lines lock poisoned");
        lines.push((text.to_string(), kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_sink_roundtrip() {
        let sink = InMemoryResultSink::new();
        sink.activate().await.unwrap();
        assert!(sink.is_active());

        sink.set_status(417, 500);
        sink.set_outcome(ResultCode::Success, "");
        sink.publish().await.unwrap();
        sink.deactivate().await.unwrap();

        let outcome = sink.outcome();
        assert_eq!(outcome.receipt_number, 417);
        assert_eq!(outcome.result().unwrap().0, ResultCode::Success);
        assert!(!sink.is_active());
        assert_eq!(sink.publish_count(), 1);
    }

    #[test]
    fn test_recording_presenter_keeps_order() {
        let presenter = RecordingPresenter::new();
        presenter.update_status("Connecting...", StatusKind::Information);
        presenter.update_status("Cannot connect", StatusKind::Error);
        assert_eq!(presenter.texts(), vec!["Connecting...", "Cannot connect"]);
    }
}
