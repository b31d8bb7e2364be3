//! Predicate stage: forwards accepted values, silently consumes the rest.

use crate::error::PipelineError;
use crate::stage::{BoxStage, Consumer, PullResult, PullState, Stage, spawn_relay, take_upstream};

/// Keeps upstream values the predicate accepts, unchanged.
///
/// A rejected value produces no output and no gap: the stage pulls upstream
/// again within the same pull until a value is accepted or upstream ends.
pub struct Filter<T: Send + 'static> {
    name: String,
    predicate: Option<Box<dyn FnMut(&T) -> bool + Send>>,
    upstream: Option<BoxStage<T>>,
    state: PullState<T>,
}

impl<T: Send + 'static> Filter<T> {
    pub fn new<F>(predicate: F) -> Self
    where
        F: FnMut(&T) -> bool + Send + 'static,
    {
        Self {
            name: "Filter".to_string(),
            predicate: Some(Box::new(predicate)),
            upstream: None,
            state: PullState::new(),
        }
    }

    /// Override the default stage name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl<T: Send + 'static> Stage for Filter<T> {
    type Out = T;

    fn name(&self) -> &str {
        &self.name
    }

    fn pull(&mut self) -> PullResult<T> {
        let name = self.name.clone();
        let upstream_slot = &mut self.upstream;
        let predicate_slot = &mut self.predicate;
        self.state.pull_with(|| {
            let upstream = take_upstream(upstream_slot, &name)?;
            let mut predicate = predicate_slot
                .take()
                .ok_or_else(|| PipelineError::MissingUpstream { stage: name.clone() })?;
            spawn_relay(&name, upstream, move |value| {
                Ok(if predicate(&value) { Some(value) } else { None })
            })
        })
    }
}

impl<T: Send + 'static> Consumer for Filter<T> {
    type In = T;

    fn set_upstream(&mut self, upstream: BoxStage<T>) {
        self.upstream = Some(upstream);
    }
}
