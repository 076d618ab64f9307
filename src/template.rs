use crate::buffer::RenderBuffer;
use crate::value::Value;
use core::fmt;
use std::sync::{Arc, OnceLock};

/// A renderable unit: given a context, writes output into a buffer.
///
/// Templates should be pure functions of their context. Any closure with the right signature is a
/// template.
pub trait Template: Send + Sync {
    fn render(&self, context: &Value, buffer: &mut RenderBuffer);
}

impl<F> Template for F
where
    F: Fn(&Value, &mut RenderBuffer) + Send + Sync,
{
    fn render(&self, context: &Value, buffer: &mut RenderBuffer) {
        self(context, buffer)
    }
}

/// A shared handle to a template.
///
/// Handles compare by identity, so a view can tell which of its branches is active.
#[derive(Clone)]
pub struct TemplateRef {
    name: &'static str,
    template: Arc<dyn Template>,
}

impl TemplateRef {
    /// Wraps a template; `name` is only used for debugging.
    pub fn new(name: &'static str, template: impl Template + 'static) -> TemplateRef {
        TemplateRef {
            name,
            template: Arc::new(template),
        }
    }

    /// Returns the shared template that renders nothing.
    pub fn empty() -> TemplateRef {
        static EMPTY: OnceLock<TemplateRef> = OnceLock::new();
        EMPTY
            .get_or_init(|| TemplateRef::new("empty", |_: &Value, _: &mut RenderBuffer| {}))
            .clone()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_empty(&self) -> bool {
        *self == TemplateRef::empty()
    }

    /// Renders the template against `context`.
    pub fn render(&self, context: &Value, buffer: &mut RenderBuffer) {
        self.template.render(context, buffer)
    }
}

impl PartialEq for TemplateRef {
    fn eq(&self, other: &TemplateRef) -> bool {
        Arc::ptr_eq(&self.template, &other.template)
    }
}

impl fmt::Debug for TemplateRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TemplateRef({})", self.name)
    }
}
