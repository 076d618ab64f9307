use crate::error::ViewError;
use crate::run_loop::RunLoop;
use crate::view::{self, View, ViewHandle, ViewId};
use std::sync::Arc;
use tracing::{debug, warn};

/// Owns a run loop and a list of root views, and keeps their output in sync.
pub struct Host {
    run_loop: RunLoop,
    roots: Vec<(ViewId, ViewHandle<dyn View>)>,
}

impl Host {
    /// Creates a new Host with its own run loop.
    pub fn new() -> Host {
        Host::with_run_loop(RunLoop::new())
    }

    /// Creates a Host that shares `run_loop` with other hosts or views.
    pub fn with_run_loop(run_loop: RunLoop) -> Host {
        Host {
            run_loop,
            roots: Vec::new(),
        }
    }

    /// The run loop views should be initialized with.
    pub fn run_loop(&self) -> &RunLoop {
        &self.run_loop
    }

    /// Renders a view, makes it live, and adds it after the existing roots.
    pub fn append<V: View + 'static>(&mut self, view: ViewHandle<V>) -> Result<ViewId, ViewError> {
        let view: ViewHandle<dyn View> = view;
        let id = {
            let mut view = view.lock();
            view::append(&mut *view)?;
            view.core().id()
        };
        debug!(view = %id, "appended root");
        self.roots.push((id, view));
        Ok(id)
    }

    /// Looks up a root view by id.
    pub fn view(&self, id: ViewId) -> Option<ViewHandle<dyn View>> {
        self.roots
            .iter()
            .find(|(root, _)| *root == id)
            .map(|(_, view)| Arc::clone(view))
    }

    /// Runs all pending work (e.g. re-render checks scheduled by value changes).
    ///
    /// Returns the number of tasks that ran.
    pub fn poll(&mut self) -> Result<usize, ViewError> {
        self.run_loop.flush()
    }

    /// Returns the concatenated output of all live roots.
    pub fn html(&self) -> String {
        let mut html = String::new();
        for (_, view) in &self.roots {
            let view = view.lock();
            if view.core().state().is_live() {
                html.push_str(view.core().element().unwrap_or_default());
            }
        }
        html
    }

    /// Destroys a root view and forgets it.
    ///
    /// Returns false if there is no such root.
    pub fn remove(&mut self, id: ViewId) -> Result<bool, ViewError> {
        let index = match self.roots.iter().position(|(root, _)| *root == id) {
            Some(index) => index,
            None => return Ok(false),
        };
        let (_, view) = self.roots.remove(index);
        let mut view = view.lock();
        view::destroy(&mut *view)?;
        debug!(view = %id, "removed root");
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

impl Default for Host {
    fn default() -> Host {
        Host::new()
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        for (id, view) in self.roots.drain(..) {
            if let Err(err) = view::destroy(&mut *view.lock()) {
                warn!(view = %id, %err, "failed to destroy root");
            }
        }
    }
}
