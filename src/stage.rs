//! The stage abstraction and pipeline composition.
//!
//! Every pipeline element implements [`Stage`]: it can be pulled for its
//! next output value or an end-of-stream signal. Consuming stages also
//! implement [`Consumer`], giving them the upstream slot that
//! [`Stage::chain`] wires up.
//!
//! All built-in consuming stage kinds run the same production procedure
//! (`relay`): pull upstream repeatedly, apply a per-value step, yield each
//! usable result, finish when upstream is exhausted. The per-value step is
//! the polymorphic seam — a transformation for [`Map`], a predicate gate for
//! [`crate::Filter`], the validate-handle-validate cycle for
//! [`crate::RecordStage`].

use crate::coroutine::{Coroutine, Step, Yielder};
use crate::error::PipelineError;

/// What a pull produces: the next value, end-of-stream, or a fatal error.
pub type PullResult<T> = Result<Option<T>, PipelineError>;

/// A boxed stage, the uniform "anything pullable" object.
pub type BoxStage<T> = Box<dyn Stage<Out = T>>;

/// A pipeline element that can be pulled for its next output value.
pub trait Stage: Send {
    /// The values this stage produces.
    type Out: Send + 'static;

    /// Human-readable stage name, used in error reports and logging.
    fn name(&self) -> &str;

    /// Produce the next value, or `None` once the stage is exhausted.
    ///
    /// The suspension unit behind the stage is created lazily on the first
    /// pull. Exhaustion is stable: every pull after the first `None` keeps
    /// returning `None`, and a fatal error is latched the same way.
    fn pull(&mut self) -> PullResult<Self::Out>;

    /// Append `downstream` to this pipeline and return it as the new head.
    ///
    /// Fluent: `source.chain(a).chain(b)` evaluates to the most recently
    /// appended stage.
    fn chain<D>(self, mut downstream: D) -> D
    where
        Self: Sized + 'static,
        D: Consumer<In = Self::Out>,
    {
        downstream.set_upstream(Box::new(self));
        downstream
    }

    /// Eagerly drain the pipeline, invoking `f` per produced value.
    ///
    /// The only eager consumer in the base contract; everything upstream
    /// stays lazy. Fatal errors abort the drain and surface here.
    fn for_each<F>(&mut self, mut f: F) -> Result<(), PipelineError>
    where
        Self: Sized,
        F: FnMut(Self::Out),
    {
        while let Some(value) = self.pull()? {
            f(value);
        }
        Ok(())
    }
}

impl<S: Stage + ?Sized> Stage for Box<S> {
    type Out = S::Out;

    fn name(&self) -> &str {
        (**self).name()
    }

    fn pull(&mut self) -> PullResult<Self::Out> {
        (**self).pull()
    }
}

/// A stage with an upstream slot; the receiving end of [`Stage::chain`].
///
/// The upstream reference is exclusively held: it belongs to exactly one
/// pipeline position and is consumed when the stage starts producing.
pub trait Consumer: Stage {
    /// The values this stage consumes.
    type In: Send + 'static;

    /// Attach the stage this one pulls from.
    fn set_upstream(&mut self, upstream: BoxStage<Self::In>);
}

/// Lifecycle latch shared by every stage kind.
enum Latch {
    Idle,
    Done,
    Failed(PipelineError),
}

/// Pull-side state common to all stage kinds: the lazily started suspension
/// unit plus the latch that keeps an exhausted or failed stage stable.
pub(crate) struct PullState<T> {
    unit: Option<Coroutine<T>>,
    latch: Latch,
}

impl<T: Send + 'static> PullState<T> {
    pub(crate) fn new() -> Self {
        Self {
            unit: None,
            latch: Latch::Idle,
        }
    }

    /// Resume the unit, creating it with `start` on the first pull.
    ///
    /// Once the unit completes it is dropped and never resumed again, so an
    /// exhausted stage keeps answering end-of-stream instead of tripping the
    /// resume-after-completion protocol check.
    pub(crate) fn pull_with<F>(&mut self, start: F) -> PullResult<T>
    where
        F: FnOnce() -> Result<Coroutine<T>, PipelineError>,
    {
        match &self.latch {
            Latch::Done => return Ok(None),
            Latch::Failed(error) => return Err(error.clone()),
            Latch::Idle => {}
        }
        let unit = match &mut self.unit {
            Some(unit) => unit,
            slot => slot.insert(start()?),
        };
        match unit.resume() {
            Ok(Step::Yielded(value)) => Ok(Some(value)),
            Ok(Step::Complete) => {
                self.latch = Latch::Done;
                self.unit = None;
                Ok(None)
            }
            Err(error) => {
                self.latch = Latch::Failed(error.clone());
                self.unit = None;
                Err(error)
            }
        }
    }
}

/// Take the upstream out of its slot, failing if the pipeline was never
/// wired.
pub(crate) fn take_upstream<T: Send + 'static>(
    slot: &mut Option<BoxStage<T>>,
    stage: &str,
) -> Result<BoxStage<T>, PipelineError> {
    slot.take().ok_or_else(|| PipelineError::MissingUpstream {
        stage: stage.to_string(),
    })
}

/// The default production procedure: pull upstream, apply the per-value
/// step, yield each usable result, stop when upstream is exhausted.
fn relay<I, O>(
    label: &str,
    mut upstream: BoxStage<I>,
    mut step: impl FnMut(I) -> Result<Option<O>, PipelineError>,
    yielder: &Yielder<O>,
) -> Result<(), PipelineError>
where
    I: Send + 'static,
    O: Send + 'static,
{
    let mut pulled = 0usize;
    let mut emitted = 0usize;
    while let Some(value) = upstream.pull()? {
        pulled += 1;
        if let Some(output) = step(value)? {
            emitted += 1;
            yielder.give(output)?;
        }
    }
    tracing::debug!(stage = %label, pulled, emitted, "upstream exhausted");
    Ok(())
}

/// Build the suspension unit for a consuming stage around its per-value
/// step.
pub(crate) fn spawn_relay<I, O, S>(
    name: &str,
    upstream: BoxStage<I>,
    step: S,
) -> Result<Coroutine<O>, PipelineError>
where
    I: Send + 'static,
    O: Send + 'static,
    S: FnMut(I) -> Result<Option<O>, PipelineError> + Send + 'static,
{
    let label = name.to_string();
    Coroutine::new(name, move |yielder| relay(&label, upstream, step, yielder))
}

/// The generic transform stage: pulls one upstream value, applies the
/// transformation, and yields the possibly-absent result.
pub struct Map<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    name: String,
    step: Option<Box<dyn FnMut(I) -> Option<O> + Send>>,
    upstream: Option<BoxStage<I>>,
    state: PullState<O>,
}

impl<I, O> Map<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// A transform that emits one output per input.
    pub fn new<F>(mut transform: F) -> Self
    where
        F: FnMut(I) -> O + Send + 'static,
    {
        Self::filter_map(move |value| Some(transform(value)))
    }

    /// A transform whose `None` results are skipped without ending the
    /// stream; the stage pulls upstream again for the next value.
    pub fn filter_map<F>(step: F) -> Self
    where
        F: FnMut(I) -> Option<O> + Send + 'static,
    {
        Self {
            name: "Map".to_string(),
            step: Some(Box::new(step)),
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

impl<T: Send + 'static> Map<T, T> {
    /// The identity transform; values pass through untouched.
    pub fn identity() -> Self {
        Self::new(|value| value)
    }
}

impl<I, O> Stage for Map<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    type Out = O;

    fn name(&self) -> &str {
        &self.name
    }

    fn pull(&mut self) -> PullResult<O> {
        let name = self.name.clone();
        let upstream_slot = &mut self.upstream;
        let step_slot = &mut self.step;
        self.state.pull_with(|| {
            let upstream = take_upstream(upstream_slot, &name)?;
            let mut step = step_slot
                .take()
                .ok_or_else(|| PipelineError::MissingUpstream { stage: name.clone() })?;
            spawn_relay(&name, upstream, move |value| Ok(step(value)))
        })
    }
}

impl<I, O> Consumer for Map<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    type In = I;

    fn set_upstream(&mut self, upstream: BoxStage<I>) {
        self.upstream = Some(upstream);
    }
}

/// Pass-through stage: forwards every value unchanged after handing a
/// reference to the callback. Useful as a tap and as the identity stage.
pub struct Inspect<T: Send + 'static> {
    name: String,
    callback: Option<Box<dyn FnMut(&T) + Send>>,
    upstream: Option<BoxStage<T>>,
    state: PullState<T>,
}

impl<T: Send + 'static> Inspect<T> {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnMut(&T) + Send + 'static,
    {
        Self {
            name: "Inspect".to_string(),
            callback: Some(Box::new(callback)),
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

impl<T: Send + 'static> Stage for Inspect<T> {
    type Out = T;

    fn name(&self) -> &str {
        &self.name
    }

    fn pull(&mut self) -> PullResult<T> {
        let name = self.name.clone();
        let upstream_slot = &mut self.upstream;
        let callback_slot = &mut self.callback;
        self.state.pull_with(|| {
            let upstream = take_upstream(upstream_slot, &name)?;
            let mut callback = callback_slot
                .take()
                .ok_or_else(|| PipelineError::MissingUpstream { stage: name.clone() })?;
            spawn_relay(&name, upstream, move |value| {
                callback(&value);
                Ok(Some(value))
            })
        })
    }
}

impl<T: Send + 'static> Consumer for Inspect<T> {
    type In = T;

    fn set_upstream(&mut self, upstream: BoxStage<T>) {
        self.upstream = Some(upstream);
    }
}
