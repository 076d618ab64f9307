//! Bound views: re-render when data changes, and only then.
//!
//! # Conceptual overview
//! A bound view renders one of two templates depending on a dynamically evaluated value, remembers
//! the value it last rendered, and re-renders only when that value changes. It is the building
//! block behind template expressions like `{{name}}`, `{{#if cond}}` or `{{#with person}}`.
//!
//! ## Views and lifecycle states
//! Every view carries a [`ViewCore`]: an id, a [`LifecycleState`], the active template and
//! context, and its current output (its *element*). Views start out in `PreRender`, pass through
//! `InBuffer` while rendering, have an element in `HasElement`, are live in `InDom`, and finally
//! go through `Destroying` to `Destroyed`. Behavior that depends on the state is looked up in a
//! per-state table ([`StateHandlers`]) instead of being checked at each call site.
//!
//! ## Change detection
//! A bound view reads its value through a [`LazyValue`], optionally passes it through a
//! normalizer, and stores the result at each render. A re-render check
//! ([`BoundRenderable::rerender_if_needed`]) only does something when the view is live and the
//! normalized value differs from the stored one. Values compare strictly: primitives by value,
//! objects and arrays by identity.
//!
//! ## Template selection
//! [`BoundView`] asks a predicate whether to show its display template or its inverse template,
//! and either passes the bound value to the template as its context or keeps the enclosing
//! context. Without a display template, the value itself is written out. [`BoundIfView`] is the
//! special case of a boolean condition stream, switching templates on truthiness alone.
//!
//! ## Scheduling
//! Sources that push changes ([`Stream`], [`Properties`]) never make a view render synchronously.
//! Each notification schedules a re-render check on the [`RunLoop`] in the render phase, keyed by
//! view and method, so any number of notifications within one cycle collapse into a single check
//! that sees the final value. Views drop their subscriptions when destroyed; a check that still
//! arrives afterwards is absorbed by the state table.

mod bound_if_view;
mod bound_view;
mod buffer;
mod error;
mod host;
mod run_loop;
mod source;
mod states;
mod template;
mod value;
#[macro_use]
mod view;

pub use bound_if_view::{BoundIfView, BoundIfViewOptions};
pub use bound_view::{BoundView, BoundViewOptions, Normalizer, Predicate};
pub use buffer::RenderBuffer;
pub use error::ViewError;
pub use host::Host;
pub use run_loop::{Phase, RunLoop};
pub use source::{Callback, LazyValue, Properties, Stream, Subscription};
pub use states::{LifecycleState, StateHandlers};
pub use template::{Template, TemplateRef};
pub use value::{Record, Value};
pub use view::{
    append, create_element, destroy, insert_element, remove, rerender, rerender_if_needed,
    BoundRenderable, NormalizedChangeDetection, View, ViewCore, ViewHandle, ViewId,
};
