use crate::Result;
use crate::domain::outcome::{FieldValue, ResultCode, TransactionOutcome};
use crate::domain::ports::ResultSink;
use crate::error::EasyPayError;
use async_trait::async_trait;
use log::{debug, warn};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

struct SinkState {
    outcome: TransactionOutcome,
    active: bool,
}

/// Publishes the outcome field table to a JSON file in the shared data
/// directory, where the external supervisor reads it.
///
/// Writes go through a temp file in the same directory and a rename, so
/// the supervisor never observes a half-written record.
pub struct FileResultSink {
    path: PathBuf,
    state: Mutex<SinkState>,
}

impl FileResultSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(SinkState {
                outcome: TransactionOutcome::new(),
                active: false,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_record(&self) -> Result<()> {
        let fields = {
            let state = self.state.lock().expect("sink state lock poisoned");
            state.outcome.to_fields(state.active)
        };
        let mut record = Map::new();
        for (name, value) in fields {
            let json_value = match value {
                FieldValue::Int(v) => Value::from(v),
                FieldValue::Text(v) => Value::from(v),
            };
            record.insert(name.to_string(), json_value);
        }

        let dir = self
            .path
            .parent()
            .ok_or_else(|| EasyPayError::InvalidConfiguration(
                "outcome path has no parent directory".to_string(),
            ))?;
        std::fs::create_dir_all(dir)?;
        let mut staged = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut staged, &Value::Object(record))?;
        staged.write_all(b"\n")?;
        staged
            .persist(&self.path)
            .map_err(|e| EasyPayError::Io(e.error))?;
        debug!("outcome record written to {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl ResultSink for FileResultSink {
    fn set_outcome(&self, code: ResultCode, detail: &str) {
        let mut state = self.state.lock().expect("sink state lock poisoned");
        if !state.outcome.set_result(code, detail) {
            warn!(
                "outcome already recorded, ignoring late write of {:?}",
                code
            );
        }
    }

    fn set_status(&self, receipt_number: u32, amount_minor: i64) {
        let mut state = self.state.lock().expect("sink state lock poisoned");
        state.outcome.set_status(receipt_number, amount_minor);
    }

    async fn activate(&self) -> Result<()> {
        {
            let mut state = self.state.lock().expect("sink state lock poisoned");
            state.active = true;
        }
        self.write_record()
    }

    async fn deactivate(&self) -> Result<()> {
        {
            let mut state = self.state.lock().expect("sink state lock poisoned");
            state.active = false;
        }
        self.write_record()
    }

    async fn publish(&self) -> Result<()> {
        self.write_record()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::outcome::OUTPUT_FIELDS;
    use tempfile::TempDir;

    fn read_record(path: &Path) -> Map<String, Value> {
        let content = std::fs::read_to_string(path).unwrap();
        serde_json::from_str::<Value>(&content)
            .unwrap()
            .as_object()
            .unwrap()
            .clone()
    }

    #[test]
    fn test_set_outcome_first_write_wins() {
        let dir = TempDir::new().unwrap();
        let sink = FileResultSink::new(dir.path().join("outcome.json"));

        sink.set_outcome(ResultCode::ClosedByUser, "aborted by user");
        sink.set_outcome(ResultCode::Success, "late result");

        let state = sink.state.lock().unwrap();
        let (code, detail) = state.outcome.result().unwrap();
        assert_eq!(code, ResultCode::ClosedByUser);
        assert_eq!(detail, "aborted by user");
    }

    #[tokio::test]
    async fn test_publish_writes_every_field() {
        let dir = TempDir::new().unwrap();
        let sink = FileResultSink::new(dir.path().join("outcome.json"));

        sink.set_outcome(ResultCode::Success, "");
        sink.set_status(4711, 1250);
        sink.publish().await.unwrap();

        let record = read_record(sink.path());
        assert_eq!(record.len(), OUTPUT_FIELDS.len());
        for spec in OUTPUT_FIELDS {
            assert!(record.contains_key(spec.name), "missing field {}", spec.name);
        }
        assert_eq!(record["result_code"], Value::from(0));
        assert_eq!(record["result_text"], Value::from("Success"));
        assert_eq!(record["receipt_number"], Value::from(4711));
        assert_eq!(record["amount_minor"], Value::from(1250));
    }

    #[tokio::test]
    async fn test_liveness_flag_toggles() {
        let dir = TempDir::new().unwrap();
        let sink = FileResultSink::new(dir.path().join("outcome.json"));

        sink.activate().await.unwrap();
        assert_eq!(read_record(sink.path())["active"], Value::from(1));

        sink.deactivate().await.unwrap();
        assert_eq!(read_record(sink.path())["active"], Value::from(0));
    }

    #[tokio::test]
    async fn test_publish_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("state").join("outcome.json");
        let sink = FileResultSink::new(&nested);

        sink.publish().await.unwrap();
        assert!(nested.is_file());
    }
}
