use crate::buffer::RenderBuffer;
use crate::error::ViewError;
use crate::states::LifecycleState;
use crate::template::TemplateRef;
use crate::value::Value;
use core::fmt;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// A unique identifier for a view.
///
/// (this is just a UUID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewId(Uuid);

impl ViewId {
    pub(crate) fn new() -> ViewId {
        ViewId(Uuid::new_v4())
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// A shared, lockable view.
pub type ViewHandle<V> = Arc<Mutex<V>>;

/// Implements the `View` trait for a struct with a `core: ViewCore` field.
///
/// Syntax:
///
/// ```text
/// impl_view! {
///     StructName;
///     (optionally override render() and will_destroy() here, using normal rust syntax)
/// }
/// ```
#[macro_export]
macro_rules! impl_view {
    (
        $(#[$attr:meta])*
        $struct:ty;
        $($extra:tt)*
    ) => {
        $(#[$attr])*
        impl $crate::View for $struct {
            fn core(&self) -> &$crate::ViewCore {
                &self.core
            }

            fn core_mut(&mut self) -> &mut $crate::ViewCore {
                &mut self.core
            }

            $($extra)*
        }
    };
}

/// State every view carries: identity, lifecycle state, the active template and context, and the
/// current output.
#[derive(Debug)]
pub struct ViewCore {
    id: ViewId,
    state: LifecycleState,
    template: Option<TemplateRef>,
    context: Option<Value>,
    element: Option<String>,
}

impl ViewCore {
    pub fn new() -> ViewCore {
        ViewCore {
            id: ViewId::new(),
            state: LifecycleState::PreRender,
            template: None,
            context: None,
            element: None,
        }
    }

    pub fn id(&self) -> ViewId {
        self.id
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// The active template.
    pub fn template(&self) -> Option<&TemplateRef> {
        self.template.as_ref()
    }

    pub fn set_template(&mut self, template: Option<TemplateRef>) {
        self.template = template;
    }

    /// The data context the active template is rendered against.
    pub fn context(&self) -> Option<&Value> {
        self.context.as_ref()
    }

    pub fn set_context(&mut self, context: Value) {
        self.context = Some(context);
    }

    /// The current output, if any has been rendered.
    pub fn element(&self) -> Option<&str> {
        self.element.as_deref()
    }

    /// Renders the active template (if any) against the active context.
    pub fn render_template(&self, buffer: &mut RenderBuffer) {
        if let Some(template) = &self.template {
            let undefined = Value::Undefined;
            template.render(self.context.as_ref().unwrap_or(&undefined), buffer);
        }
    }

    fn transition(&mut self, to: LifecycleState) -> Result<(), ViewError> {
        if !self.state.can_transition(to) {
            return Err(ViewError::InvalidTransition {
                view: self.id,
                from: self.state,
                to,
            });
        }
        debug!(view = %self.id, from = ?self.state, ?to, "lifecycle transition");
        self.state = to;
        Ok(())
    }
}

impl Default for ViewCore {
    fn default() -> ViewCore {
        ViewCore::new()
    }
}

/// A view: something that renders output into a buffer and moves through lifecycle states.
///
/// This trait should probably be implemented using the [`impl_view`] macro.
pub trait View: fmt::Debug + Send {
    fn core(&self) -> &ViewCore;

    fn core_mut(&mut self) -> &mut ViewCore;

    /// Renders this view’s output.
    ///
    /// The default implementation renders the active template against the active context.
    fn render(&mut self, buffer: &mut RenderBuffer) {
        self.core().render_template(buffer);
    }

    /// Called during teardown, before the view is marked destroyed.
    fn will_destroy(&mut self) {}
}

/// A view whose output depends on a normalized bound value.
pub trait NormalizedChangeDetection {
    /// Reads the bound source and applies the normalizer, if any.
    fn normalized_value(&self) -> Value;

    /// The normalized value captured at the most recent render.
    fn last_normalized_value(&self) -> Option<&Value>;
}

/// A bound view that can re-render itself when its value changes.
pub trait BoundRenderable: View + NormalizedChangeDetection {
    /// Re-renders if the view is live and its normalized value changed since the last render.
    ///
    /// Does nothing in any other lifecycle state.
    fn rerender_if_needed(&mut self) -> Result<(), ViewError>
    where
        Self: Sized,
    {
        rerender_if_needed(self)
    }
}

/// Dispatches `rerender_if_needed` through the view’s current lifecycle state.
pub fn rerender_if_needed(view: &mut dyn BoundRenderable) -> Result<(), ViewError> {
    let handler = view.core().state().handlers().rerender_if_needed;
    handler(view)
}

/// Renders the view while it's in `InBuffer`.
///
/// If rendering panics, the view goes back to `restore` (keeping its old element) before the
/// panic continues.
fn render_element<V: View + ?Sized>(view: &mut V, restore: LifecycleState) -> String {
    let rendered = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut buffer = RenderBuffer::new();
        view.render(&mut buffer);
        buffer.into_string()
    }));
    match rendered {
        Ok(element) => element,
        Err(payload) => {
            let core = view.core_mut();
            warn!(view = %core.id, state = ?restore, "render panicked; restoring state");
            core.state = restore;
            panic::resume_unwind(payload)
        }
    }
}

/// Renders the view’s output for the first time.
pub fn create_element<V: View + ?Sized>(view: &mut V) -> Result<(), ViewError> {
    if view.core().state() != LifecycleState::PreRender {
        return Err(ViewError::InvalidTransition {
            view: view.core().id(),
            from: view.core().state(),
            to: LifecycleState::InBuffer,
        });
    }
    view.core_mut().transition(LifecycleState::InBuffer)?;
    let element = render_element(view, LifecycleState::PreRender);
    let core = view.core_mut();
    core.element = Some(element);
    core.transition(LifecycleState::HasElement)
}

/// Makes a rendered view live.
pub fn insert_element<V: View + ?Sized>(view: &mut V) -> Result<(), ViewError> {
    let core = view.core_mut();
    if core.state != LifecycleState::HasElement {
        return Err(ViewError::InvalidTransition {
            view: core.id,
            from: core.state,
            to: LifecycleState::InDom,
        });
    }
    core.transition(LifecycleState::InDom)
}

/// Renders the view and makes it live.
pub fn append<V: View + ?Sized>(view: &mut V) -> Result<(), ViewError> {
    create_element(view)?;
    insert_element(view)
}

/// Replaces the view’s output with a fresh render, if its lifecycle state allows it.
pub fn rerender<V: View + ?Sized>(view: &mut V) -> Result<(), ViewError> {
    let previous = view.core().state();
    if !(previous.handlers().rerender)(view.core().id())? {
        trace!(view = %view.core().id(), state = ?previous, "rerender skipped");
        return Ok(());
    }
    view.core_mut().transition(LifecycleState::InBuffer)?;
    let element = render_element(view, previous);
    let core = view.core_mut();
    core.element = Some(element);
    core.transition(previous)
}

/// Takes the view out of the live tree, discarding its output.
///
/// The view may be appended again later.
pub fn remove<V: View + ?Sized>(view: &mut V) -> Result<(), ViewError> {
    let core = view.core_mut();
    match core.state {
        LifecycleState::HasElement | LifecycleState::InDom => {
            core.element = None;
            core.transition(LifecycleState::PreRender)
        }
        from => Err(ViewError::InvalidTransition {
            view: core.id,
            from,
            to: LifecycleState::PreRender,
        }),
    }
}

/// Tears the view down. Destroying a destroyed view does nothing.
pub fn destroy<V: View + ?Sized>(view: &mut V) -> Result<(), ViewError> {
    if view.core().state() == LifecycleState::Destroyed {
        return Ok(());
    }
    view.core_mut().transition(LifecycleState::Destroying)?;
    view.will_destroy();
    let core = view.core_mut();
    core.element = None;
    core.transition(LifecycleState::Destroyed)
}
