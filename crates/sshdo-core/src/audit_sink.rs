use std::sync::Mutex;

use crate::record::AuditRecord;

/// Destination for audit records. Emission is best-effort: a failing sink
/// is reported to the caller but must never change a decision.
pub trait AuditSink {
    fn emit(&self, record: &AuditRecord) -> Result<(), String>;
}

/// In-memory audit sink for testing.
#[derive(Default)]
pub struct InMemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .expect("audit sink lock poisoned")
            .clone()
    }

    pub fn clear(&self) {
        self.records
            .lock()
            .expect("audit sink lock poisoned")
            .clear();
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, record: &AuditRecord) -> Result<(), String> {
        self.records
            .lock()
            .map_err(|_| "audit sink lock poisoned".to_string())?
            .push(record.clone());
        Ok(())
    }
}
