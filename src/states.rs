//! View lifecycle states.
//!
//! Every view is in exactly one [`LifecycleState`]. Operations whose meaning depends on the state
//! are not implemented with checks at each call site; instead, each state has a [`StateHandlers`]
//! table and callers dispatch through it. States that don't care about an operation inherit the
//! default behavior.

use crate::error::ViewError;
use crate::view::{self, BoundRenderable, NormalizedChangeDetection, View, ViewId};
use tracing::{debug, trace};

/// The attachment phase of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Created, but no output exists yet.
    PreRender,
    /// Output is currently being rendered into a buffer.
    InBuffer,
    /// Output exists but has not been inserted into the live tree.
    HasElement,
    /// Output is live in the tree.
    InDom,
    /// Teardown is in progress.
    Destroying,
    /// Torn down; nothing will happen to this view anymore.
    Destroyed,
}

/// Per-state behavior.
pub struct StateHandlers {
    /// Re-renders a bound view if its normalized value changed since the last render.
    pub rerender_if_needed: fn(&mut dyn BoundRenderable) -> Result<(), ViewError>,

    /// Decides whether a rerender of the given view may proceed.
    ///
    /// `Ok(false)` skips the rerender silently.
    pub rerender: fn(ViewId) -> Result<bool, ViewError>,

    /// Whether change notifications arriving in this state should be forwarded at all.
    pub invoke_observer: bool,
}

fn absorb_rerender_if_needed(view: &mut dyn BoundRenderable) -> Result<(), ViewError> {
    // a notification raced with a lifecycle transition
    trace!(
        view = %view.core().id(),
        state = ?view.core().state(),
        "rerender_if_needed absorbed"
    );
    Ok(())
}

fn rerender_if_changed(view: &mut dyn BoundRenderable) -> Result<(), ViewError> {
    let value = view.normalized_value();
    if view.last_normalized_value() == Some(&value) {
        trace!(view = %view.core().id(), ?value, "value unchanged; skipping rerender");
        return Ok(());
    }
    debug!(
        view = %view.core().id(),
        from = ?view.last_normalized_value(),
        to = ?value,
        "value changed; rerendering"
    );
    view::rerender(view)
}

fn skip_rerender(_: ViewId) -> Result<bool, ViewError> {
    Ok(false)
}

fn allow_rerender(_: ViewId) -> Result<bool, ViewError> {
    Ok(true)
}

fn reject_while_rendering(id: ViewId) -> Result<bool, ViewError> {
    Err(ViewError::RerenderWhileRendering(id))
}

fn reject_destroyed(id: ViewId) -> Result<bool, ViewError> {
    Err(ViewError::Destroyed(id))
}

const DEFAULT: StateHandlers = StateHandlers {
    rerender_if_needed: absorb_rerender_if_needed,
    rerender: skip_rerender,
    invoke_observer: false,
};

const PRE_RENDER: StateHandlers = DEFAULT;

const IN_BUFFER: StateHandlers = StateHandlers {
    rerender: reject_while_rendering,
    invoke_observer: true,
    ..DEFAULT
};

const HAS_ELEMENT: StateHandlers = StateHandlers {
    rerender: allow_rerender,
    invoke_observer: true,
    ..DEFAULT
};

const IN_DOM: StateHandlers = StateHandlers {
    rerender_if_needed: rerender_if_changed,
    ..HAS_ELEMENT
};

const DESTROYING: StateHandlers = StateHandlers {
    rerender: reject_destroyed,
    ..DEFAULT
};

impl LifecycleState {
    /// Returns the behavior table for this state.
    pub fn handlers(self) -> &'static StateHandlers {
        match self {
            LifecycleState::PreRender => &PRE_RENDER,
            LifecycleState::InBuffer => &IN_BUFFER,
            LifecycleState::HasElement => &HAS_ELEMENT,
            LifecycleState::InDom => &IN_DOM,
            LifecycleState::Destroying | LifecycleState::Destroyed => &DESTROYING,
        }
    }

    /// Returns true if the view is live in the output tree.
    pub fn is_live(self) -> bool {
        self == LifecycleState::InDom
    }

    /// Whether a view may move from this state to `to`.
    pub fn can_transition(self, to: LifecycleState) -> bool {
        use LifecycleState::*;
        match (self, to) {
            (Destroyed, _) => false,
            (Destroying, Destroyed) => true,
            (Destroying, _) => false,
            (_, Destroying) => true,
            (PreRender, InBuffer) => true,
            // a rerender returns to whichever state it started from
            (InBuffer, HasElement) | (InBuffer, InDom) => true,
            (HasElement, InBuffer) | (HasElement, InDom) | (HasElement, PreRender) => true,
            (InDom, InBuffer) | (InDom, PreRender) => true,
            _ => false,
        }
    }
}
