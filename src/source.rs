//! Sources of bound values.
//!
//! A bound view reads its value through [`LazyValue`], which is pull-based. Sources that can also
//! push change notifications ([`Stream`], keys of [`Properties`]) return a [`Subscription`] from
//! `subscribe`; dropping the subscription unsubscribes.

use crate::value::Value;
use core::fmt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// A change notification callback.
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// A pull-based accessor for the current bound value.
pub trait LazyValue: Send + Sync {
    /// Returns the current value.
    fn value(&self) -> Value;

    /// Subscribes to change notifications, if this source can push them.
    ///
    /// Returns `None` for pull-only sources.
    fn subscribe(&self, callback: Callback) -> Option<Subscription> {
        drop(callback);
        None
    }
}

/// Closures are pull-only sources.
impl<F> LazyValue for F
where
    F: Fn() -> Value + Send + Sync,
{
    fn value(&self) -> Value {
        self()
    }
}

struct Subscribers {
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(u64, Callback)>>,
}

impl Subscribers {
    fn new() -> Subscribers {
        Subscribers {
            next_id: AtomicU64::new(0),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    fn subscribe(self: &Arc<Self>, callback: Callback) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks.lock().push((id, callback));
        Subscription {
            id,
            subscribers: Arc::downgrade(self),
        }
    }

    fn notify(&self) {
        // callbacks may subscribe or unsubscribe, so they must not run under the lock
        let callbacks: Vec<Callback> = self
            .callbacks
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback();
        }
    }

    fn len(&self) -> usize {
        self.callbacks.lock().len()
    }
}

/// An unsubscribe handle. Unsubscribes when dropped.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    subscribers: Weak<Subscribers>,
}

impl Subscription {
    /// Unsubscribes now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.callbacks.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// A push-based value stream.
///
/// Every `set` notifies all subscribers, even if the value did not change; deciding whether that
/// warrants any work is up to the subscriber. Clones share the same stream.
#[derive(Clone)]
pub struct Stream {
    value: Arc<Mutex<Value>>,
    subscribers: Arc<Subscribers>,
}

impl Stream {
    /// Creates a stream holding `value`.
    pub fn new(value: impl Into<Value>) -> Stream {
        Stream {
            value: Arc::new(Mutex::new(value.into())),
            subscribers: Arc::new(Subscribers::new()),
        }
    }

    /// Returns the current value.
    pub fn value(&self) -> Value {
        self.value.lock().clone()
    }

    /// Replaces the value and notifies subscribers.
    pub fn set(&self, value: impl Into<Value>) {
        *self.value.lock() = value.into();
        self.notify();
    }

    /// Notifies subscribers without changing the value.
    pub fn notify(&self) {
        self.subscribers.notify();
    }

    /// Calls `callback` after every `set` or `notify`, until the subscription is dropped.
    pub fn subscribe(&self, callback: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.subscribers.subscribe(Arc::new(callback))
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl LazyValue for Stream {
    fn value(&self) -> Value {
        Stream::value(self)
    }

    fn subscribe(&self, callback: Callback) -> Option<Subscription> {
        Some(self.subscribers.subscribe(callback))
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Stream")
            .field("value", &*self.value.lock())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

/// A bag of observable properties.
///
/// Unlike [`Stream::set`], [`Properties::set`] only notifies observers when the value actually
/// changed. Clones share the same properties.
#[derive(Clone, Default)]
pub struct Properties {
    keys: Arc<Mutex<HashMap<String, Stream>>>,
}

impl Properties {
    pub fn new() -> Properties {
        Properties::default()
    }

    fn stream(&self, key: &str) -> Stream {
        self.keys
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Stream::new(Value::Undefined))
            .clone()
    }

    /// Returns the value of a property; `Undefined` if it was never set.
    pub fn get(&self, key: &str) -> Value {
        match self.keys.lock().get(key) {
            Some(stream) => stream.value(),
            None => Value::Undefined,
        }
    }

    /// Sets a property, notifying its observers if the value changed.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        let stream = self.stream(key);
        if stream.value() != value {
            stream.set(value);
        }
    }

    /// Observes changes of one property.
    pub fn observe(&self, key: &str, callback: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.stream(key).subscribe(callback)
    }

    /// Returns a source bound to one property, for use as a bound view's lazy value.
    pub fn lazy_value(&self, key: &str) -> Arc<dyn LazyValue> {
        Arc::new(self.stream(key))
    }
}

impl fmt::Debug for Properties {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let keys = self.keys.lock();
        f.debug_map()
            .entries(keys.iter().map(|(k, stream)| (k, stream.value())))
            .finish()
    }
}
