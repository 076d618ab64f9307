use crate::bound_view::schedule_rerender_on_change;
use crate::buffer::RenderBuffer;
use crate::impl_view;
use crate::run_loop::RunLoop;
use crate::source::{Stream, Subscription};
use crate::template::TemplateRef;
use crate::value::Value;
use crate::view::{BoundRenderable, NormalizedChangeDetection, ViewCore, ViewHandle};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

/// Construction-time configuration of a [`BoundIfView`].
#[derive(Debug, Clone)]
pub struct BoundIfViewOptions {
    condition_stream: Stream,
    truthy_template: Option<TemplateRef>,
    falsy_template: Option<TemplateRef>,
    context: Value,
}

impl BoundIfViewOptions {
    /// Creates options switching on `condition_stream`, with no templates and a null context.
    pub fn new(condition_stream: Stream) -> BoundIfViewOptions {
        BoundIfViewOptions {
            condition_stream,
            truthy_template: None,
            falsy_template: None,
            context: Value::Null,
        }
    }

    /// Template rendered while the condition is truthy.
    pub fn truthy_template(mut self, template: TemplateRef) -> Self {
        self.truthy_template = Some(template);
        self
    }

    /// Template rendered while the condition is falsy.
    pub fn falsy_template(mut self, template: TemplateRef) -> Self {
        self.falsy_template = Some(template);
        self
    }

    /// The enclosing context both branches are rendered against.
    pub fn context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }
}

/// A view that switches between two templates on the truthiness of a condition stream.
///
/// Both branches always render against the enclosing context. Stream updates schedule a
/// re-render check in the render phase rather than rendering right away.
#[derive(Debug)]
pub struct BoundIfView {
    core: ViewCore,
    options: BoundIfViewOptions,
    last_normalized_value: Option<Value>,
    subscription: Option<Subscription>,
}

impl BoundIfView {
    pub fn new(options: BoundIfViewOptions) -> BoundIfView {
        let mut core = ViewCore::new();
        core.set_context(options.context.clone());
        BoundIfView {
            core,
            options,
            last_normalized_value: None,
            subscription: None,
        }
    }

    /// Wraps the view in a handle and subscribes it to its condition stream.
    pub fn init(self, run_loop: &RunLoop) -> ViewHandle<BoundIfView> {
        let stream = self.options.condition_stream.clone();
        let handle = Arc::new(Mutex::new(self));
        let subscription = schedule_rerender_on_change(&handle, &stream, run_loop);
        handle.lock().subscription = subscription;
        handle
    }

    /// Returns true while the view listens to its condition stream.
    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }
}

impl NormalizedChangeDetection for BoundIfView {
    fn normalized_value(&self) -> Value {
        self.options.condition_stream.value()
    }

    fn last_normalized_value(&self) -> Option<&Value> {
        self.last_normalized_value.as_ref()
    }
}

impl BoundRenderable for BoundIfView {}

impl_view! {
    BoundIfView;

    fn render(&mut self, buffer: &mut RenderBuffer) {
        let result = self.options.condition_stream.value();
        let template = if result.is_truthy() {
            self.options.truthy_template.clone()
        } else {
            self.options.falsy_template.clone()
        };
        self.last_normalized_value = Some(result);
        self.core.set_template(template);
        self.core.render_template(buffer);
    }

    fn will_destroy(&mut self) {
        if self.subscription.take().is_some() {
            trace!(view = %self.core.id(), "released condition stream subscription");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_loop::Phase;
    use crate::states::LifecycleState;
    use crate::view;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn branch(name: &'static str, renders: &Arc<AtomicUsize>) -> TemplateRef {
        let renders = Arc::clone(renders);
        TemplateRef::new(name, move |ctx: &Value, b: &mut RenderBuffer| {
            renders.fetch_add(1, Ordering::SeqCst);
            b.push(name);
            b.append(&ctx.get("suffix"));
        })
    }

    struct Fixture {
        run_loop: RunLoop,
        stream: Stream,
        renders: Arc<AtomicUsize>,
        truthy: TemplateRef,
        falsy: TemplateRef,
        view: ViewHandle<BoundIfView>,
    }

    fn fixture(initial: impl Into<Value>) -> Fixture {
        let run_loop = RunLoop::new();
        let stream = Stream::new(initial);
        let renders = Arc::new(AtomicUsize::new(0));
        let truthy = branch("A", &renders);
        let falsy = branch("B", &renders);
        let options = BoundIfViewOptions::new(stream.clone())
            .truthy_template(truthy.clone())
            .falsy_template(falsy.clone())
            .context(Value::object(vec![("suffix", Value::from("!"))]));
        let view = BoundIfView::new(options).init(&run_loop);
        Fixture {
            run_loop,
            stream,
            renders,
            truthy,
            falsy,
            view,
        }
    }

    #[test]
    fn initial_render_picks_truthy_branch() {
        let f = fixture(true);
        view::append(&mut *f.view.lock()).unwrap();

        let view = f.view.lock();
        assert_eq!(view.core.element(), Some("A!"));
        assert_eq!(view.core.template(), Some(&f.truthy));
        assert_eq!(view.last_normalized_value(), Some(&Value::Bool(true)));
    }

    #[test]
    fn stream_update_schedules_one_check() {
        let f = fixture(true);
        view::append(&mut *f.view.lock()).unwrap();
        let id = f.view.lock().core.id();

        f.stream.set(false);
        assert!(f.run_loop.is_scheduled(Phase::Render, id, "rerender_if_needed"));
        // nothing renders synchronously
        assert_eq!(f.view.lock().core.element(), Some("A!"));

        assert_eq!(f.run_loop.flush(), Ok(1));
        let view = f.view.lock();
        assert_eq!(view.core.element(), Some("B!"));
        assert_eq!(view.core.template(), Some(&f.falsy));
        assert_eq!(f.renders.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn flapping_within_a_cycle_renders_final_value_once() {
        let f = fixture(true);
        view::append(&mut *f.view.lock()).unwrap();

        f.stream.set(false);
        f.stream.set(true);
        f.stream.set(0);
        assert_eq!(f.run_loop.pending_count(), 1);
        f.run_loop.flush().unwrap();
        assert_eq!(f.view.lock().core.element(), Some("B!"));
        assert_eq!(f.renders.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unchanged_value_does_not_rerender() {
        let f = fixture(true);
        view::append(&mut *f.view.lock()).unwrap();

        f.stream.set(true);
        assert_eq!(f.run_loop.flush(), Ok(1));
        assert_eq!(f.renders.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn truthiness_not_identity_picks_the_branch() {
        let f = fixture("yes");
        view::append(&mut *f.view.lock()).unwrap();
        assert_eq!(f.view.lock().core.element(), Some("A!"));

        f.stream.set("");
        f.run_loop.flush().unwrap();
        assert_eq!(f.view.lock().core.element(), Some("B!"));
    }

    #[test]
    fn context_is_never_rebound() {
        let f = fixture(Value::object(vec![("suffix", Value::from("?"))]));
        view::append(&mut *f.view.lock()).unwrap();
        assert_eq!(f.view.lock().core.element(), Some("A!"));
    }

    #[test]
    fn missing_falsy_template_renders_nothing() {
        let run_loop = RunLoop::new();
        let stream = Stream::new(false);
        let options = BoundIfViewOptions::new(stream.clone()).truthy_template(TemplateRef::new(
            "A",
            |_: &Value, b: &mut RenderBuffer| b.push("A"),
        ));
        let view = BoundIfView::new(options).init(&run_loop);
        view::append(&mut *view.lock()).unwrap();
        assert_eq!(view.lock().core.element(), Some(""));
        assert_eq!(view.lock().core.template(), None);
    }

    #[test]
    fn destroy_unsubscribes() {
        let f = fixture(true);
        view::append(&mut *f.view.lock()).unwrap();
        assert_eq!(f.stream.subscriber_count(), 1);

        view::destroy(&mut *f.view.lock()).unwrap();
        assert_eq!(f.stream.subscriber_count(), 0);
        assert!(!f.view.lock().is_subscribed());

        f.stream.set(false);
        assert_eq!(f.run_loop.pending_count(), 0);
    }

    #[test]
    fn destroyed_before_phase_runs_is_a_no_op() {
        let f = fixture(true);
        view::append(&mut *f.view.lock()).unwrap();

        f.stream.set(false);
        view::destroy(&mut *f.view.lock()).unwrap();
        assert_eq!(f.run_loop.flush(), Ok(1));

        let view = f.view.lock();
        assert_eq!(view.core.state(), LifecycleState::Destroyed);
        assert_eq!(view.last_normalized_value(), Some(&Value::Bool(true)));
        assert_eq!(f.renders.load(Ordering::SeqCst), 1);
    }
}
