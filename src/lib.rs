//! # pullpipe
//!
//! A lazy, pull-based record pipeline processing library.
//!
//! A pipeline is a chain of stages. Nothing runs until the tail is pulled:
//! each pull asks a stage for its next value, the stage pulls its upstream
//! as needed, suspends at its yield point, and resumes exactly there on the
//! next pull. Pulls propagate transitively to the source, the only stage
//! that produces values without consuming any.
//!
//! ## Overview
//!
//! - **Source**: head of a chain; a fixed value sequence or a producer
//!   procedure that yields values itself
//! - **Filter**: forwards values a predicate accepts, consumes the rest
//! - **Map** / **Inspect**: per-value transforms and pass-through taps
//! - **RecordStage**: schema-validated processing of structured records,
//!   with required/provided field contracts enforced around each handler
//! - **chain**: wires stages together; **for_each**: the eager consumer
//!
//! ## Example
//!
//! ```
//! use pullpipe::{Filter, Map, Source, Stage};
//!
//! let mut tail = Source::from_values([1, 2, 3])
//!     .chain(Filter::new(|v: &i32| *v > 1))
//!     .chain(Map::new(|v: i32| v * 10));
//!
//! let mut seen = Vec::new();
//! tail.for_each(|v| seen.push(v)).unwrap();
//! assert_eq!(seen, vec![20, 30]);
//! ```

pub mod coroutine;
pub mod error;
pub mod filter;
pub mod record;
pub mod record_stage;
pub mod schema;
pub mod source;
pub mod stage;

pub use coroutine::{Coroutine, Step, Yielder};
pub use error::PipelineError;
pub use filter::Filter;
pub use record::{Record, read_records};
pub use record_stage::{RecordProxy, RecordStage};
pub use schema::{AccessMode, Schema};
pub use source::Source;
pub use stage::{BoxStage, Consumer, Inspect, Map, PullResult, Stage};
