//! Source stages: the head of every pipeline.

use crate::coroutine::{Coroutine, Yielder};
use crate::error::PipelineError;
use crate::stage::{PullResult, PullState, Stage};

/// What feeds a source: a fixed value sequence or a producer procedure run
/// once. A source built with neither is exhausted from the first pull.
enum Feed<T> {
    Values(Vec<T>),
    Producer(Box<dyn FnOnce(&Yielder<T>) -> Result<(), PipelineError> + Send>),
}

/// A stage with no upstream; the only pipeline element that produces values
/// without consuming any.
pub struct Source<T> {
    name: String,
    feed: Option<Feed<T>>,
    state: PullState<T>,
}

impl<T: Send + 'static> Source<T> {
    /// A source bound to a fixed ordered sequence: yields each element in
    /// order, then ends.
    pub fn from_values(values: impl IntoIterator<Item = T>) -> Self {
        Self {
            name: "Source".to_string(),
            feed: Some(Feed::Values(values.into_iter().collect())),
            state: PullState::new(),
        }
    }

    /// A source bound to a producer procedure, executed once on first pull.
    /// The procedure calls [`Yielder::give`] per value it wants to emit and
    /// returns normally when exhausted.
    pub fn from_fn<F>(producer: F) -> Self
    where
        F: FnOnce(&Yielder<T>) -> Result<(), PipelineError> + Send + 'static,
    {
        Self {
            name: "Source".to_string(),
            feed: Some(Feed::Producer(Box::new(producer))),
            state: PullState::new(),
        }
    }

    /// A source that yields nothing: immediate end-of-stream.
    pub fn empty() -> Self {
        Self {
            name: "Source".to_string(),
            feed: None,
            state: PullState::new(),
        }
    }

    /// Override the default stage name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl<T: Send + 'static> Stage for Source<T> {
    type Out = T;

    fn name(&self) -> &str {
        &self.name
    }

    fn pull(&mut self) -> PullResult<T> {
        let name = self.name.clone();
        let feed_slot = &mut self.feed;
        self.state.pull_with(|| {
            let feed = feed_slot.take();
            let label = name.clone();
            Coroutine::new(name.clone(), move |yielder| match feed {
                Some(Feed::Values(values)) => {
                    let mut emitted = 0usize;
                    for value in values {
                        emitted += 1;
                        yielder.give(value)?;
                    }
                    tracing::debug!(stage = %label, emitted, "source exhausted");
                    Ok(())
                }
                Some(Feed::Producer(producer)) => producer(yielder),
                None => Ok(()),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sequence_ends_immediately() {
        let mut source = Source::<i32>::from_values([]);
        assert_eq!(source.pull().unwrap(), None);
        assert_eq!(source.pull().unwrap(), None);
    }

    #[test]
    fn values_come_out_in_order() {
        let mut source = Source::from_values([42, 7]);
        assert_eq!(source.pull().unwrap(), Some(42));
        assert_eq!(source.pull().unwrap(), Some(7));
        assert_eq!(source.pull().unwrap(), None);
    }

    #[test]
    fn string_values_pass_unchanged() {
        let mut source = Source::from_values(["asdf".to_string()]);
        assert_eq!(source.pull().unwrap(), Some("asdf".to_string()));
        assert_eq!(source.pull().unwrap(), None);
    }

    #[test]
    fn exhaustion_is_stable_across_extra_pulls() {
        let mut source = Source::from_values([42]);
        assert_eq!(source.pull().unwrap(), Some(42));
        for _ in 0..4 {
            assert_eq!(source.pull().unwrap(), None);
        }
    }

    #[test]
    fn empty_producer_ends_immediately() {
        let mut source = Source::<i32>::from_fn(|_y| Ok(()));
        assert_eq!(source.pull().unwrap(), None);
    }

    #[test]
    fn producer_yields_values_itself() {
        let mut source = Source::from_fn(|y: &Yielder<i32>| y.give(42));
        assert_eq!(source.pull().unwrap(), Some(42));
        assert_eq!(source.pull().unwrap(), None);
    }

    #[test]
    fn producer_resumes_between_yields() {
        let mut source = Source::from_fn(|y: &Yielder<i32>| {
            for v in [5, 3, 2] {
                y.give(v)?;
            }
            Ok(())
        });
        assert_eq!(source.pull().unwrap(), Some(5));
        assert_eq!(source.pull().unwrap(), Some(3));
        assert_eq!(source.pull().unwrap(), Some(2));
        assert_eq!(source.pull().unwrap(), None);
    }

    #[test]
    fn constructed_with_neither_yields_nothing() {
        let mut source = Source::<i32>::empty();
        assert_eq!(source.pull().unwrap(), None);
    }

    #[test]
    fn for_each_visits_every_value() {
        let mut source = Source::from_values([42]);
        let mut seen = Vec::new();
        source.for_each(|v| seen.push(v)).unwrap();
        assert_eq!(seen, vec![42]);
    }

    #[test]
    fn name_defaults_to_the_stage_kind() {
        let source = Source::<i32>::empty();
        assert_eq!(source.name(), "Source");
        let named = Source::<i32>::empty().with_name("feed");
        assert_eq!(named.name(), "feed");
    }
}
