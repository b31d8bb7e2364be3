//! Schema-validated record processing.
//!
//! A [`RecordStage`] is a transform stage specialized for structured
//! records: it verifies the stage's required fields on every input record,
//! runs the per-record handler through a [`RecordProxy`], drops rejected
//! records, verifies the provided fields on the result, and emits the raw
//! record.
//!
//! ```
//! use pullpipe::{Record, RecordStage, Schema, Source, Stage};
//! use serde_json::json;
//!
//! let input = Record::from_iter([("numberA", json!(2))]);
//! let mut tail = Source::from_values([input]).chain(RecordStage::new(
//!     "adder",
//!     Schema::strict().require("numberA").provide("result"),
//!     |proxy| {
//!         let n = proxy.get("numberA")?.and_then(|v| v.as_i64()).unwrap_or(0);
//!         proxy.set("result", n + 10)
//!     },
//! ));
//!
//! let out = tail.pull().unwrap().unwrap();
//! assert_eq!(out.get("result"), Some(&json!(12)));
//! ```

use serde_json::Value;

use crate::error::PipelineError;
use crate::record::Record;
use crate::schema::Schema;
use crate::stage::{BoxStage, Consumer, PullResult, PullState, Stage, spawn_relay, take_upstream};

/// Schema-checked view over one record, handed to record-stage handlers.
///
/// Under a permissive contract any field is reachable; under a strict one,
/// reads are confined to the required and provided sets and writes to the
/// provided set. Violations name the stage and the offending field.
pub struct RecordProxy<'a> {
    stage: &'a str,
    schema: &'a Schema,
    record: Record,
    rejected: bool,
}

impl<'a> RecordProxy<'a> {
    pub(crate) fn new(stage: &'a str, schema: &'a Schema, record: Record) -> Self {
        Self {
            stage,
            schema,
            record,
            rejected: false,
        }
    }

    /// Current value of `field`; `None` when the field was never set, even
    /// in strict mode for a declared field.
    pub fn get(&self, field: &str) -> Result<Option<&Value>, PipelineError> {
        if !self.schema.readable(field) {
            return Err(PipelineError::UndeclaredRead {
                stage: self.stage.to_string(),
                field: field.to_string(),
            });
        }
        Ok(self.record.get(field))
    }

    /// Store `value` under `field`.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<(), PipelineError> {
        if !self.schema.writable(field) {
            return Err(PipelineError::UndeclaredWrite {
                stage: self.stage.to_string(),
                field: field.to_string(),
            });
        }
        self.record.set(field, value);
        Ok(())
    }

    /// Drop this record from the output stream. One-way; the stream itself
    /// continues with the next record.
    pub fn reject(&mut self) {
        self.rejected = true;
    }

    pub fn is_rejected(&self) -> bool {
        self.rejected
    }

    /// The underlying record mapping.
    pub fn record(&self) -> &Record {
        &self.record
    }

    fn into_record(self) -> Record {
        self.record
    }
}

type Handler = Box<dyn FnMut(&mut RecordProxy<'_>) -> Result<(), PipelineError> + Send>;

/// A transform stage for structured records, with a field contract enforced
/// around its per-record handler.
pub struct RecordStage {
    name: String,
    schema: Option<Schema>,
    handler: Option<Handler>,
    upstream: Option<BoxStage<Record>>,
    state: PullState<Record>,
}

impl RecordStage {
    /// A record stage named `name` (contract errors carry it) processing
    /// each record with `handler` under the given contract.
    pub fn new<F>(name: impl Into<String>, schema: Schema, handler: F) -> Self
    where
        F: FnMut(&mut RecordProxy<'_>) -> Result<(), PipelineError> + Send + 'static,
    {
        Self {
            name: name.into(),
            schema: Some(schema),
            handler: Some(Box::new(handler)),
            upstream: None,
            state: PullState::new(),
        }
    }

    /// A stage with no declared contract; the proxy allows any field.
    pub fn permissive<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: FnMut(&mut RecordProxy<'_>) -> Result<(), PipelineError> + Send + 'static,
    {
        Self::new(name, Schema::permissive(), handler)
    }
}

impl Stage for RecordStage {
    type Out = Record;

    fn name(&self) -> &str {
        &self.name
    }

    fn pull(&mut self) -> PullResult<Record> {
        let name = self.name.clone();
        let upstream_slot = &mut self.upstream;
        let schema_slot = &mut self.schema;
        let handler_slot = &mut self.handler;
        self.state.pull_with(|| {
            let upstream = take_upstream(upstream_slot, &name)?;
            let schema = schema_slot
                .take()
                .ok_or_else(|| PipelineError::MissingUpstream { stage: name.clone() })?;
            let mut handler = handler_slot
                .take()
                .ok_or_else(|| PipelineError::MissingUpstream { stage: name.clone() })?;
            let stage = name.clone();
            spawn_relay(&name, upstream, move |record| {
                process_record(&stage, &schema, &mut *handler, record)
            })
        })
    }
}

impl Consumer for RecordStage {
    type In = Record;

    fn set_upstream(&mut self, upstream: BoxStage<Record>) {
        self.upstream = Some(upstream);
    }
}

/// One validate → handle → validate cycle. `Ok(None)` means the record was
/// rejected; the relay keeps pulling and the stream continues.
fn process_record(
    stage: &str,
    schema: &Schema,
    handler: &mut (dyn FnMut(&mut RecordProxy<'_>) -> Result<(), PipelineError> + Send),
    record: Record,
) -> Result<Option<Record>, PipelineError> {
    if let Some(field) = schema.missing_required(&record) {
        return Err(PipelineError::MissingRequired {
            stage: stage.to_string(),
            field: field.to_string(),
        });
    }
    let mut proxy = RecordProxy::new(stage, schema, record);
    handler(&mut proxy)?;
    if proxy.is_rejected() {
        tracing::trace!(stage = %stage, "record rejected");
        return Ok(None);
    }
    let record = proxy.into_record();
    if let Some(field) = schema.missing_provided(&record) {
        return Err(PipelineError::MissingProvided {
            stage: stage.to_string(),
            field: field.to_string(),
        });
    }
    Ok(Some(record))
}
