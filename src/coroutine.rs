//! The suspension unit behind every stage.
//!
//! A [`Coroutine`] wraps a single production procedure that can pause
//! mid-computation by yielding a value and continue from that exact point on
//! the next resume. The procedure runs on a dedicated worker thread; control
//! passes back and forth through two zero-capacity channels, so every handoff
//! is a rendezvous and the worker and its consumer are never runnable at the
//! same time.

use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use crate::error::PipelineError;

/// Outcome of a single [`Coroutine::resume`].
#[derive(Debug, Clone, PartialEq)]
pub enum Step<T> {
    /// The procedure yielded a value and is suspended at that point.
    Yielded(T),
    /// The procedure returned. Reported exactly once; resuming again is a
    /// protocol violation.
    Complete,
}

enum Reply<T> {
    Value(T),
    Done(Result<(), PipelineError>),
}

/// Handed to the production procedure; its only way to emit values.
pub struct Yielder<T> {
    reply_tx: SyncSender<Reply<T>>,
    resume_rx: Receiver<()>,
}

impl<T> Yielder<T> {
    /// Deliver `value` to the caller of the pending resume and park until
    /// the unit is resumed again.
    ///
    /// Fails with [`PipelineError::Canceled`] when the consuming side has
    /// been dropped; the procedure should propagate that and return.
    pub fn give(&self, value: T) -> Result<(), PipelineError> {
        self.reply_tx
            .send(Reply::Value(value))
            .map_err(|_| PipelineError::Canceled)?;
        self.resume_rx.recv().map_err(|_| PipelineError::Canceled)
    }
}

struct Link<T> {
    resume_tx: SyncSender<()>,
    reply_rx: Receiver<Reply<T>>,
    worker: Option<JoinHandle<()>>,
}

/// A resumable unit of computation wrapping one production procedure.
///
/// The worker parks before running the procedure: a unit that is never
/// resumed never executes its body. Each resume runs the procedure until its
/// next yield or its return; the resume that observes the return reports
/// [`Step::Complete`], and any resume after that fails.
pub struct Coroutine<T> {
    label: String,
    link: Option<Link<T>>,
}

impl<T: Send + 'static> Coroutine<T> {
    /// Create a unit around `body`, labeled with the owning stage's name for
    /// error reports.
    pub fn new<F>(label: impl Into<String>, body: F) -> Result<Self, PipelineError>
    where
        F: FnOnce(&Yielder<T>) -> Result<(), PipelineError> + Send + 'static,
    {
        let label = label.into();
        let (resume_tx, resume_rx) = mpsc::sync_channel(0);
        let (reply_tx, reply_rx) = mpsc::sync_channel(0);
        let worker = thread::Builder::new()
            .name(label.clone())
            .spawn(move || {
                let yielder = Yielder { reply_tx, resume_rx };
                // Park until the first resume; dropped-before-started units
                // must not run their body at all.
                if yielder.resume_rx.recv().is_err() {
                    return;
                }
                let outcome = body(&yielder);
                let _ = yielder.reply_tx.send(Reply::Done(outcome));
            })
            .map_err(|_| PipelineError::SpawnFailed {
                stage: label.clone(),
            })?;
        Ok(Self {
            label,
            link: Some(Link {
                resume_tx,
                reply_rx,
                worker: Some(worker),
            }),
        })
    }

    /// Run the procedure until its next yield or its return.
    pub fn resume(&mut self) -> Result<Step<T>, PipelineError> {
        let Some(link) = self.link.as_mut() else {
            return Err(PipelineError::ResumedAfterCompletion {
                stage: self.label.clone(),
            });
        };
        if link.resume_tx.send(()).is_err() {
            // The worker unwound without reporting; its channels are gone.
            self.finish();
            return Err(PipelineError::ProcedurePanicked {
                stage: self.label.clone(),
            });
        }
        let reply = link.reply_rx.recv();
        match reply {
            Ok(Reply::Value(value)) => Ok(Step::Yielded(value)),
            Ok(Reply::Done(Ok(()))) => {
                self.finish();
                Ok(Step::Complete)
            }
            Ok(Reply::Done(Err(error))) => {
                self.finish();
                Err(error)
            }
            Err(_) => {
                self.finish();
                Err(PipelineError::ProcedurePanicked {
                    stage: self.label.clone(),
                })
            }
        }
    }
}

impl<T> Coroutine<T> {
    /// Tear down the handoff and reap the worker. A worker parked in
    /// [`Yielder::give`] observes the hangup, unwinds, and exits.
    fn finish(&mut self) {
        if let Some(link) = self.link.take() {
            let Link {
                resume_tx,
                reply_rx,
                worker,
            } = link;
            drop(resume_tx);
            drop(reply_rx);
            if let Some(worker) = worker {
                let _ = worker.join();
            }
        }
    }
}

impl<T> Drop for Coroutine<T> {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn resume_runs_the_body() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let mut unit = Coroutine::<i32>::new("t", move |_y| {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        assert_eq!(unit.resume().unwrap(), Step::Complete);
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn yield_delivers_the_value() {
        let mut unit = Coroutine::new("t", |y: &Yielder<&str>| y.give("Test")).unwrap();
        assert_eq!(unit.resume().unwrap(), Step::Yielded("Test"));
        assert_eq!(unit.resume().unwrap(), Step::Complete);
    }

    #[test]
    fn resume_continues_after_each_yield() {
        let mut unit = Coroutine::new("t", |y: &Yielder<i32>| {
            y.give(1)?;
            y.give(2)
        })
        .unwrap();
        assert_eq!(unit.resume().unwrap(), Step::Yielded(1));
        assert_eq!(unit.resume().unwrap(), Step::Yielded(2));
        assert_eq!(unit.resume().unwrap(), Step::Complete);
    }

    #[test]
    fn body_without_yield_completes_on_first_resume() {
        let mut unit = Coroutine::<i32>::new("t", |_y| Ok(())).unwrap();
        assert_eq!(unit.resume().unwrap(), Step::Complete);
    }

    #[test]
    fn resume_after_completion_is_an_error() {
        let mut unit = Coroutine::<i32>::new("after", |_y| Ok(())).unwrap();
        assert_eq!(unit.resume().unwrap(), Step::Complete);
        assert_eq!(
            unit.resume(),
            Err(PipelineError::ResumedAfterCompletion {
                stage: "after".to_string()
            })
        );
    }

    #[test]
    fn body_error_surfaces_from_resume_and_finishes_the_unit() {
        let mut unit = Coroutine::<i32>::new("t", |_y| {
            Err(PipelineError::MissingUpstream {
                stage: "t".to_string(),
            })
        })
        .unwrap();
        assert_eq!(
            unit.resume(),
            Err(PipelineError::MissingUpstream {
                stage: "t".to_string()
            })
        );
        assert_eq!(
            unit.resume(),
            Err(PipelineError::ResumedAfterCompletion {
                stage: "t".to_string()
            })
        );
    }

    #[test]
    fn never_resumed_unit_never_runs_its_body() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let unit = Coroutine::<i32>::new("t", move |_y| {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        drop(unit);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn dropping_a_suspended_unit_does_not_hang() {
        let mut unit = Coroutine::new("t", |y: &Yielder<i32>| {
            y.give(1)?;
            y.give(2)
        })
        .unwrap();
        assert_eq!(unit.resume().unwrap(), Step::Yielded(1));
        drop(unit);
    }

    #[test]
    fn panicking_body_reports_procedure_panicked() {
        let mut unit = Coroutine::<i32>::new("boom", |_y| panic!("kaboom")).unwrap();
        assert_eq!(
            unit.resume(),
            Err(PipelineError::ProcedurePanicked {
                stage: "boom".to_string()
            })
        );
    }
}
