//! Runloop
//!
//! The runloop coalesces every invalidation triggered during one batch of
//! writes into a single synchronous flush.
//!
//! # State Machine
//!
//! ```text
//!   Idle --begin--> Batching --end (depth 0)--> Flushing --done--> Idle
//! ```
//!
//! `begin` is reentrant: while `Batching` or `Flushing` it only bumps the
//! nesting depth. A flush starts only when the outermost `end` brings the
//! depth back to zero. A write performed from inside `update` (a computed
//! value writing its result, say) calls `begin`/`end` again; those calls
//! join the running flush instead of starting a second one, and whatever
//! they dirty is picked up by the next pass of the same flush.
//!
//! # Flush Order
//!
//! 1. Drain dirty dependants, stable-sorted by structural depth so a
//!    section updates before the children it may tear down. Repeat while
//!    updates keep dirtying more dependants.
//! 2. Apply queued view work (DOM writes), only after every value has
//!    settled.
//! 3. Repeat from 1 if view work dirtied anything.
//!
//! A flush that is still dirtying dependants after [`MAX_PASSES`] passes
//! fails with [`Error::Unsettled`]; the pending work is discarded and the
//! runloop returns to `Idle`.
//!
//! The state lives in a thread-local, like the rest of the reactive
//! context: the engine is single threaded and each thread gets its own
//! runloop.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::graph::{Dependant, DependantId};

/// Upper bound on flush passes before the runloop assumes a dependant keeps
/// dirtying itself.
pub const MAX_PASSES: usize = 1000;

/// Render-side work to apply once all values have settled.
pub trait View {
    /// Perform the pending DOM writes.
    fn apply(&self) -> Result<()>;
}

/// Runloop state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum State {
    #[default]
    Idle,
    Batching,
    Flushing,
}

#[derive(Default)]
struct Batch {
    dependants: IndexMap<DependantId, Rc<dyn Dependant>>,
    views: IndexMap<usize, Rc<dyn View>>,
}

#[derive(Default)]
struct Runloop {
    state: State,
    depth: usize,
    batch: Batch,
}

thread_local! {
    static RUNLOOP: RefCell<Runloop> = RefCell::new(Runloop::default());
}

/// Open a batch, or join the one in progress.
pub fn begin() {
    RUNLOOP.with(|runloop| {
        let mut runloop = runloop.borrow_mut();
        if runloop.state == State::Idle {
            runloop.state = State::Batching;
            runloop.batch = Batch::default();
            tracing::debug!("runloop: batch started");
        }
        runloop.depth += 1;
    });
}

/// Close the innermost batch. The outermost close flushes.
pub fn end() -> Result<()> {
    let should_flush = RUNLOOP.with(|runloop| {
        let mut runloop = runloop.borrow_mut();
        if runloop.depth == 0 {
            tracing::warn!("runloop: end() without matching begin()");
            return false;
        }
        runloop.depth -= 1;
        if runloop.depth > 0 || runloop.state != State::Batching {
            return false;
        }
        runloop.state = State::Flushing;
        true
    });

    if !should_flush {
        return Ok(());
    }

    let result = flush();

    RUNLOOP.with(|runloop| {
        let mut runloop = runloop.borrow_mut();
        runloop.state = State::Idle;
        runloop.depth = 0;
        runloop.batch = Batch::default();
    });
    tracing::debug!(ok = result.is_ok(), "runloop: batch finished");

    result
}

/// Run `f` inside a batch. The batch is closed even when `f` fails; the
/// error from `f` takes precedence.
pub fn batch<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    begin();
    let outcome = f();
    let ended = end();
    let value = outcome?;
    ended?;
    Ok(value)
}

/// Mark a dependant dirty. Repeated calls within a batch collapse into one
/// `update`.
pub fn add_dependant(dependant: Rc<dyn Dependant>) {
    RUNLOOP.with(|runloop| {
        let mut runloop = runloop.borrow_mut();
        if runloop.state == State::Idle {
            // held until the next batch closes
            runloop.state = State::Batching;
        }
        let id = dependant.id();
        if runloop.batch.dependants.insert(id, dependant).is_none() {
            tracing::trace!(?id, "runloop: dependant queued");
        }
    });
}

/// Queue render-side work for after value propagation.
pub fn add_view(view: Rc<dyn View>) {
    RUNLOOP.with(|runloop| {
        let mut runloop = runloop.borrow_mut();
        if runloop.state == State::Idle {
            runloop.state = State::Batching;
        }
        let key = Rc::as_ptr(&view) as *const () as usize;
        runloop.batch.views.entry(key).or_insert(view);
    });
}

/// Current state.
pub fn state() -> State {
    RUNLOOP.with(|runloop| runloop.borrow().state)
}

/// Current nesting depth.
pub fn depth() -> usize {
    RUNLOOP.with(|runloop| runloop.borrow().depth)
}

fn take_dependants() -> Vec<Rc<dyn Dependant>> {
    RUNLOOP.with(|runloop| {
        let mut runloop = runloop.borrow_mut();
        std::mem::take(&mut runloop.batch.dependants)
            .into_values()
            .collect()
    })
}

fn take_views() -> Vec<Rc<dyn View>> {
    RUNLOOP.with(|runloop| {
        let mut runloop = runloop.borrow_mut();
        std::mem::take(&mut runloop.batch.views)
            .into_values()
            .collect()
    })
}

fn flush() -> Result<()> {
    let mut passes = 0;

    loop {
        loop {
            let mut dirty = take_dependants();
            if dirty.is_empty() {
                break;
            }

            passes += 1;
            if passes > MAX_PASSES {
                tracing::error!(
                    remaining = dirty.len(),
                    "runloop: dependants kept invalidating each other, giving up"
                );
                return Err(Error::Unsettled { passes: MAX_PASSES });
            }

            // stable: registration order is kept within a depth
            dirty.sort_by_key(|dependant| dependant.depth());

            tracing::trace!(count = dirty.len(), pass = passes, "runloop: updating dependants");
            for dependant in dirty {
                if !dependant.is_bound() {
                    tracing::trace!(id = ?dependant.id(), "runloop: skipping unbound dependant");
                    continue;
                }
                dependant.update()?;
            }
        }

        let views = take_views();
        if views.is_empty() {
            break;
        }
        tracing::trace!(count = views.len(), "runloop: applying views");
        for view in views {
            view.apply()?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    use crate::graph::DependantKind;
    use crate::keypath::Keypath;

    type Hook = Box<dyn Fn()>;

    struct Recorder {
        id: DependantId,
        depth: usize,
        updates: Cell<usize>,
        bound: Cell<bool>,
        log: Rc<RefCell<Vec<String>>>,
        name: &'static str,
        on_update: RefCell<Option<Hook>>,
    }

    impl Recorder {
        fn new(name: &'static str, depth: usize, log: &Rc<RefCell<Vec<String>>>) -> Rc<Self> {
            Rc::new(Self {
                id: DependantId::new(),
                depth,
                updates: Cell::new(0),
                bound: Cell::new(true),
                log: log.clone(),
                name,
                on_update: RefCell::new(None),
            })
        }
    }

    impl Dependant for Recorder {
        fn id(&self) -> DependantId {
            self.id
        }

        fn kind(&self) -> DependantKind {
            DependantKind::Other
        }

        fn depth(&self) -> usize {
            self.depth
        }

        fn is_bound(&self) -> bool {
            self.bound.get()
        }

        fn update(&self) -> Result<()> {
            self.updates.set(self.updates.get() + 1);
            self.log.borrow_mut().push(self.name.to_string());
            if let Some(hook) = self.on_update.borrow().as_ref() {
                hook();
            }
            Ok(())
        }

        fn rebind(&self, _: Option<&str>, _: Option<usize>, _: &Keypath, _: &Keypath) -> Result<()> {
            Ok(())
        }

        fn unbind(&self) -> Result<()> {
            self.bound.set(false);
            Ok(())
        }
    }

    struct LogView {
        log: Rc<RefCell<Vec<String>>>,
    }

    impl View for LogView {
        fn apply(&self) -> Result<()> {
            self.log.borrow_mut().push("view".into());
            Ok(())
        }
    }

    #[test]
    fn repeated_invalidation_updates_once() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let recorder = Recorder::new("a", 0, &log);

        batch(|| {
            add_dependant(recorder.clone());
            add_dependant(recorder.clone());
            add_dependant(recorder.clone());
            Ok(())
        })
        .unwrap();

        assert_eq!(recorder.updates.get(), 1);
        assert_eq!(state(), State::Idle);
    }

    #[test]
    fn nested_batches_flush_at_outermost_end() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let recorder = Recorder::new("a", 0, &log);

        begin();
        begin();
        assert_eq!(depth(), 2);
        add_dependant(recorder.clone());
        end().unwrap();
        assert_eq!(recorder.updates.get(), 0);
        assert_eq!(state(), State::Batching);
        end().unwrap();
        assert_eq!(recorder.updates.get(), 1);
        assert_eq!(state(), State::Idle);
    }

    #[test]
    fn shallower_dependants_update_first() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let child = Recorder::new("child", 2, &log);
        let section = Recorder::new("section", 1, &log);
        let sibling = Recorder::new("sibling", 2, &log);

        batch(|| {
            add_dependant(child.clone());
            add_dependant(section.clone());
            add_dependant(sibling.clone());
            Ok(())
        })
        .unwrap();

        assert_eq!(*log.borrow(), vec!["section", "child", "sibling"]);
    }

    #[test]
    fn unbound_dependants_are_skipped() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let child = Recorder::new("child", 1, &log);
        let parent = Recorder::new("parent", 0, &log);
        let torn_down = child.clone();
        *parent.on_update.borrow_mut() = Some(Box::new(move || {
            torn_down.bound.set(false);
        }));

        batch(|| {
            add_dependant(child.clone());
            add_dependant(parent.clone());
            Ok(())
        })
        .unwrap();

        assert_eq!(*log.borrow(), vec!["parent"]);
    }

    #[test]
    fn reentrant_writes_join_the_running_flush() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let downstream = Recorder::new("downstream", 0, &log);
        let upstream = Recorder::new("upstream", 0, &log);

        let target = downstream.clone();
        *upstream.on_update.borrow_mut() = Some(Box::new(move || {
            assert_eq!(state(), State::Flushing);
            let target = target.clone();
            batch(|| {
                add_dependant(target);
                Ok(())
            })
            .unwrap();
            // still the same flush
            assert_eq!(state(), State::Flushing);
        }));

        batch(|| {
            add_dependant(upstream.clone());
            Ok(())
        })
        .unwrap();

        assert_eq!(*log.borrow(), vec!["upstream", "downstream"]);
        assert_eq!(downstream.updates.get(), 1);
        assert_eq!(state(), State::Idle);
    }

    #[test]
    fn views_apply_after_dependants() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let recorder = Recorder::new("value", 0, &log);
        let view: Rc<dyn View> = Rc::new(LogView { log: log.clone() });

        batch(|| {
            add_view(view.clone());
            add_view(view.clone());
            add_dependant(recorder.clone());
            Ok(())
        })
        .unwrap();

        assert_eq!(*log.borrow(), vec!["value", "view"]);
    }

    #[test]
    fn runaway_flush_fails_instead_of_dropping_work() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let restless = Recorder::new("restless", 0, &log);
        let again = Rc::downgrade(&restless);
        *restless.on_update.borrow_mut() = Some(Box::new(move || {
            if let Some(recorder) = again.upgrade() {
                add_dependant(recorder);
            }
        }));
        let view: Rc<dyn View> = Rc::new(LogView { log: log.clone() });

        let result = batch(|| {
            add_view(view.clone());
            add_dependant(restless.clone());
            Ok(())
        });

        assert!(matches!(result, Err(Error::Unsettled { passes: MAX_PASSES })));
        assert_eq!(restless.updates.get(), MAX_PASSES);
        assert!(!log.borrow().contains(&"view".to_string()));
        assert_eq!(state(), State::Idle);
        assert_eq!(depth(), 0);
    }

    struct Failing {
        id: DependantId,
    }

    impl Dependant for Failing {
        fn id(&self) -> DependantId {
            self.id
        }

        fn update(&self) -> Result<()> {
            Err(Error::NotRegistered {
                keypath: Keypath::from("x"),
                group: crate::graph::Group::Default,
            })
        }

        fn rebind(&self, _: Option<&str>, _: Option<usize>, _: &Keypath, _: &Keypath) -> Result<()> {
            Ok(())
        }

        fn unbind(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_flush_returns_to_idle() {
        let failing = Rc::new(Failing {
            id: DependantId::new(),
        });

        let result = batch(|| {
            add_dependant(failing.clone());
            Ok(())
        });

        assert!(result.unwrap_err().is_fatal());
        assert_eq!(state(), State::Idle);
        assert_eq!(depth(), 0);
    }
}
