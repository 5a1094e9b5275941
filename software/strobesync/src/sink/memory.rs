use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::controller::context::ControllerCtx;

use super::{LogRecord, LogSink};

/// Cloneable handle for reading the records of a [`MemoryLogSink`]
/// from outside the control loop.
#[derive(Clone, Debug, Default)]
pub struct LogRecordsHandle {
    records: Arc<RwLock<Vec<LogRecord>>>,
    op_name: Arc<RwLock<Option<String>>>,
}

impl LogRecordsHandle {
    /// Snapshot of every record so far.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.read().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name of the op the sink is open for, if it is open.
    pub fn op_name(&self) -> Option<String> {
        self.op_name.read().ok().and_then(|n| n.clone())
    }
}

/// Log sink that keeps every record in memory behind a shared handle.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct MemoryLogSink {
    #[serde(skip)]
    handle: LogRecordsHandle,
}

impl MemoryLogSink {
    pub fn new() -> (Self, LogRecordsHandle) {
        let handle = LogRecordsHandle::default();
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }
}

#[typetag::serde]
impl LogSink for MemoryLogSink {
    fn open(&mut self, ctx: &ControllerCtx) -> Result<(), String> {
        let mut records = self
            .handle
            .records
            .write()
            .map_err(|_| "Memory log lock poisoned".to_string())?;
        records.clear();
        let mut op_name = self
            .handle
            .op_name
            .write()
            .map_err(|_| "Memory log lock poisoned".to_string())?;
        *op_name = Some(ctx.op_name.clone());
        Ok(())
    }

    fn append(
        &mut self,
        timestamp_ns: i64,
        label: &str,
        value_a: f32,
        value_b: f32,
    ) -> Result<(), String> {
        if self.handle.op_name().is_none() {
            return Err("Memory log must be opened before appending".to_string());
        }
        self.handle
            .records
            .write()
            .map_err(|_| "Memory log lock poisoned".to_string())?
            .push(LogRecord {
                timestamp_ns,
                label: label.to_owned(),
                value_a,
                value_b,
            });
        Ok(())
    }

    fn close(&mut self) -> Result<(), String> {
        if let Ok(mut op_name) = self.handle.op_name.write() {
            *op_name = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn records_are_visible_through_handle() {
        let (mut sink, handle) = MemoryLogSink::new();
        assert!(sink.append(0, "0.0", 0.0, 0.0).is_err());

        let ctx = ControllerCtx {
            op_name: "mem".to_owned(),
            ..Default::default()
        };
        sink.open(&ctx).unwrap();
        assert_eq!(handle.op_name().as_deref(), Some("mem"));

        sink.append(10, "1.000000000", 3.0, 4.0).unwrap();
        sink.append(20, "2.000000000", 5.0, 6.0).unwrap();
        sink.close().unwrap();

        assert_eq!(handle.len(), 2);
        assert_eq!(handle.records()[1].label, "2.000000000");
        assert_eq!(handle.records()[0].value_b, 4.0);
        assert!(handle.op_name().is_none());

        // Reopening starts a fresh log
        sink.open(&ctx).unwrap();
        assert!(handle.is_empty());
    }
}
