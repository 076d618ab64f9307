//! Views bound to a dynamically evaluated value.

use crate::buffer::RenderBuffer;
use crate::error::ViewError;
use crate::impl_view;
use crate::run_loop::{Phase, RunLoop};
use crate::source::{LazyValue, Subscription};
use crate::template::TemplateRef;
use crate::value::Value;
use crate::view::{BoundRenderable, NormalizedChangeDetection, View, ViewCore, ViewHandle};
use core::fmt;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

/// Decides whether the display or the inverse template is rendered.
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Transforms a raw bound value before comparison and display decisions.
pub type Normalizer = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Subscribes a bound view to its source so that every notification schedules one coalesced
/// `rerender_if_needed` in the render phase.
///
/// Returns `None` if the source can’t push notifications.
pub(crate) fn schedule_rerender_on_change<V>(
    handle: &ViewHandle<V>,
    source: &dyn LazyValue,
    run_loop: &RunLoop,
) -> Option<Subscription>
where
    V: BoundRenderable + 'static,
{
    let id = handle.lock().core().id();
    let weak = Arc::downgrade(handle);
    let run_loop = run_loop.clone();

    source.subscribe(Arc::new(move || {
        let view = match weak.upgrade() {
            Some(view) => view,
            None => return,
        };
        // if the view is busy (e.g. rendering), schedule anyway; the state gate decides later
        if let Some(locked) = view.try_lock() {
            if !locked.core().state().handlers().invoke_observer {
                trace!(view = %id, state = ?locked.core().state(), "notification dropped");
                return;
            }
        }
        let weak = Arc::downgrade(&view);
        run_loop.schedule_once(Phase::Render, id, "rerender_if_needed", move || {
            let view = weak.upgrade().ok_or(ViewError::ViewGone(id))?;
            let mut view = view.lock();
            view.rerender_if_needed()
        });
    }))
}

/// Construction-time configuration of a [`BoundView`].
#[derive(Clone)]
pub struct BoundViewOptions {
    should_display: Predicate,
    preserve_context: bool,
    previous_context: Value,
    display_template: Option<TemplateRef>,
    inverse_template: Option<TemplateRef>,
    value_normalizer: Option<Normalizer>,
    lazy_value: Arc<dyn LazyValue>,
}

impl BoundViewOptions {
    /// Creates options bound to `lazy_value`.
    ///
    /// By default, the display template is shown for truthy values, the context is not preserved,
    /// and there are no templates (i.e. the value is interpolated as text).
    pub fn new(lazy_value: Arc<dyn LazyValue>) -> BoundViewOptions {
        BoundViewOptions {
            should_display: Arc::new(Value::is_truthy),
            preserve_context: false,
            previous_context: Value::Null,
            display_template: None,
            inverse_template: None,
            value_normalizer: None,
            lazy_value,
        }
    }

    /// Like [`BoundViewOptions::new`], for a source that isn’t shared yet.
    pub fn from_source(source: impl LazyValue + 'static) -> BoundViewOptions {
        BoundViewOptions::new(Arc::new(source))
    }

    /// Sets the predicate that picks the display template over the inverse template.
    pub fn should_display(mut self, f: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.should_display = Arc::new(f);
        self
    }

    /// If true, templates are rendered against `previous_context` instead of the bound value.
    ///
    /// This is what an `if` block wants; a `with` block wants the bound value.
    pub fn preserve_context(mut self, preserve: bool) -> Self {
        self.preserve_context = preserve;
        self
    }

    /// The enclosing context, used when the context is preserved.
    pub fn previous_context(mut self, context: Value) -> Self {
        self.previous_context = context;
        self
    }

    /// Template rendered when the predicate holds.
    pub fn display_template(mut self, template: TemplateRef) -> Self {
        self.display_template = Some(template);
        self
    }

    /// Template rendered when the predicate doesn’t hold.
    pub fn inverse_template(mut self, template: TemplateRef) -> Self {
        self.inverse_template = Some(template);
        self
    }

    /// Transforms each value read from the source before it is compared or displayed.
    pub fn value_normalizer(mut self, f: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        self.value_normalizer = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for BoundViewOptions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BoundViewOptions")
            .field("preserve_context", &self.preserve_context)
            .field("previous_context", &self.previous_context)
            .field("display_template", &self.display_template)
            .field("inverse_template", &self.inverse_template)
            .field("value_normalizer", &self.value_normalizer.is_some())
            .finish()
    }
}

/// A view that renders one of two templates depending on a bound value, and only re-renders when
/// that value (after normalization) changes.
///
/// This backs both bare interpolations (no templates: the value is written out as text) and
/// blocks like `if`/`unless`/`with`.
pub struct BoundView {
    core: ViewCore,
    options: BoundViewOptions,
    last_normalized_value: Option<Value>,
    subscription: Option<Subscription>,
}

impl BoundView {
    pub fn new(options: BoundViewOptions) -> BoundView {
        BoundView {
            core: ViewCore::new(),
            options,
            last_normalized_value: None,
            subscription: None,
        }
    }

    /// Wraps the view in a handle and, if the bound source can push changes, subscribes to it so
    /// that changes schedule a re-render check on `run_loop`.
    pub fn init(self, run_loop: &RunLoop) -> ViewHandle<BoundView> {
        let source = Arc::clone(&self.options.lazy_value);
        let handle = Arc::new(Mutex::new(self));
        let subscription = schedule_rerender_on_change(&handle, &*source, run_loop);
        handle.lock().subscription = subscription;
        handle
    }

    pub fn options(&self) -> &BoundViewOptions {
        &self.options
    }

    /// Returns true while the view holds a subscription to its source.
    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }
}

impl NormalizedChangeDetection for BoundView {
    fn normalized_value(&self) -> Value {
        let value = self.options.lazy_value.value();
        match &self.options.value_normalizer {
            Some(normalize) => normalize(value),
            None => value,
        }
    }

    fn last_normalized_value(&self) -> Option<&Value> {
        self.last_normalized_value.as_ref()
    }
}

impl BoundRenderable for BoundView {}

impl_view! {
    BoundView;

    /// Picks the template and context for the current value, then renders.
    ///
    /// If the predicate holds, the display template is used; otherwise the inverse template, or
    /// nothing if there is none. The chosen template gets the enclosing context if the context
    /// is preserved, or the bound value otherwise. Without any display template the value itself
    /// is written out, with `null` and `undefined` written as nothing.
    fn render(&mut self, buffer: &mut RenderBuffer) {
        let options = &self.options;
        let result = self.normalized_value();
        self.last_normalized_value = Some(result.clone());

        if (options.should_display)(&result) {
            self.core.set_template(options.display_template.clone());

            if options.preserve_context {
                self.core.set_context(options.previous_context.clone());
            } else if options.display_template.is_some() {
                self.core.set_context(result);
            } else {
                // not a block; just the value
                let result = if result.is_nullish() { Value::from("") } else { result };
                buffer.append(&result);
                return;
            }
        } else if let Some(inverse) = &options.inverse_template {
            self.core.set_template(Some(inverse.clone()));
            if options.preserve_context {
                self.core.set_context(options.previous_context.clone());
            } else {
                self.core.set_context(result);
            }
        } else {
            self.core.set_template(Some(TemplateRef::empty()));
        }

        self.core.render_template(buffer);
    }

    fn will_destroy(&mut self) {
        if self.subscription.take().is_some() {
            trace!(view = %self.core.id(), "released source subscription");
        }
    }
}

impl fmt::Debug for BoundView {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BoundView")
            .field("core", &self.core)
            .field("options", &self.options)
            .field("last_normalized_value", &self.last_normalized_value)
            .field("subscribed", &self.subscription.is_some())
            .finish()
    }
}
