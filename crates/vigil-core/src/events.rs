//! Event system shared by the vigil components.
//!
//! Every pattern crate defines its own event enum (circuit breaker, bulkhead,
//! supervisor, ...) and emits through an [`EventListeners`] collection held in
//! its configuration. Observability subscribes here instead of holding a
//! back-pointer into the component.

#[cfg(feature = "tracing")]
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Trait implemented by events emitted by vigil components.
pub trait CoreEvent: Send + Sync + fmt::Debug {
    /// Short machine-readable kind, e.g. "state_transition" or "call_rejected".
    fn event_kind(&self) -> &'static str;

    /// When the event occurred.
    fn timestamp(&self) -> Instant;

    /// Name of the component instance that emitted the event.
    fn component(&self) -> &str;
}

/// Trait for consuming events of one component.
pub trait EventListener<E: CoreEvent>: Send + Sync {
    fn on_event(&self, event: &E);
}

type BoxedListener<E> = Arc<dyn EventListener<E>>;

/// A collection of listeners for one event type.
///
/// Emission isolates listener panics: a panicking listener never prevents the
/// remaining listeners from observing the event.
#[derive(Clone)]
pub struct EventListeners<E: CoreEvent> {
    listeners: Vec<BoxedListener<E>>,
}

impl<E: CoreEvent> EventListeners<E> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Adds a listener.
    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Emits `event` to every registered listener.
    pub fn emit(&self, event: &E) {
        for (index, listener) in self.listeners.iter().enumerate() {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));

            if let Err(_payload) = outcome {
                #[cfg(feature = "tracing")]
                log_listener_panic(index, event, _payload.as_ref());

                #[cfg(feature = "metrics")]
                metrics::counter!(
                    "vigil_event_listener_panics_total",
                    "component" => event.component().to_string(),
                    "event_kind" => event.event_kind().to_string()
                )
                .increment(1);

                #[cfg(not(feature = "tracing"))]
                let _ = index;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: CoreEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Function-based listener, convenient for the `on_*` builder hooks.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _phantom: std::marker::PhantomData<E>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: CoreEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}

#[cfg(feature = "tracing")]
fn log_listener_panic<E: CoreEvent>(index: usize, event: &E, payload: &(dyn Any + Send)) {
    let message = payload
        .downcast_ref::<&'static str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());

    tracing::warn!(
        listener_index = index,
        component = event.component(),
        event_kind = event.event_kind(),
        panic_message = %message,
        "event listener panicked"
    );
}
