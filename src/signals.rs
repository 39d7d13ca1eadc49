//! Change notifications emitted by the image stack.
//!
//! Handlers are plain callbacks registered per event kind. Delivery is synchronous, on the
//! calling thread, in subscription order, immediately after the mutation that caused it.

use std::fmt;

use uuid::Uuid;

use crate::geometry::{IntRect, IntSize};
use crate::layer::{LayerId, LayerProperty};

/// Whether an image is open for editing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum EditingState {
    #[default]
    NoImage,
    Editing,
}

/// A notification with its payload.
#[derive(Clone, Debug, PartialEq)]
pub enum StackEvent {
    /// Merged image content changed.
    ContentChanged,
    /// The selection mask changed; merged content did not.
    SelectionChanged,
    SizeChanged(IntSize),
    LayerAdded(LayerId),
    LayerRemoved(LayerId),
    /// A layer changed position in the tree.
    LayerMoved(LayerId),
    ActiveLayerChanged(Option<LayerId>),
    GenerationAreaBoundsChanged(IntRect),
    LayerChanged(LayerId, LayerProperty),
    EditingStateChanged(EditingState),
}

/// Event discriminant used to pick which events a handler receives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    ContentChanged,
    SelectionChanged,
    SizeChanged,
    LayerAdded,
    LayerRemoved,
    LayerMoved,
    ActiveLayerChanged,
    GenerationAreaBoundsChanged,
    LayerChanged,
    EditingStateChanged,
}

impl StackEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            StackEvent::ContentChanged => EventKind::ContentChanged,
            StackEvent::SelectionChanged => EventKind::SelectionChanged,
            StackEvent::SizeChanged(_) => EventKind::SizeChanged,
            StackEvent::LayerAdded(_) => EventKind::LayerAdded,
            StackEvent::LayerRemoved(_) => EventKind::LayerRemoved,
            StackEvent::LayerMoved(_) => EventKind::LayerMoved,
            StackEvent::ActiveLayerChanged(_) => EventKind::ActiveLayerChanged,
            StackEvent::GenerationAreaBoundsChanged(_) => EventKind::GenerationAreaBoundsChanged,
            StackEvent::LayerChanged(..) => EventKind::LayerChanged,
            StackEvent::EditingStateChanged(_) => EventKind::EditingStateChanged,
        }
    }
}

/// Subscription handle for unsubscribing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sub({})", &self.0.to_string()[..8])
    }
}

type Handler = Box<dyn FnMut(&StackEvent) + Send>;

struct Subscription {
    id: SubscriptionId,
    filter: Option<EventKind>,
    handler: Handler,
}

/// Registry of notification handlers.
#[derive(Default)]
pub struct Signals {
    subscriptions: Vec<Subscription>,
}

impl fmt::Debug for Signals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signals")
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

impl Signals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `kind`.
    pub fn subscribe<F>(&mut self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: FnMut(&StackEvent) + Send + 'static,
    {
        self.push(Some(kind), Box::new(handler))
    }

    /// Register `handler` for every event.
    pub fn subscribe_all<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&StackEvent) + Send + 'static,
    {
        self.push(None, Box::new(handler))
    }

    fn push(&mut self, filter: Option<EventKind>, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId::new();
        tracing::trace!(%id, ?filter, "signal subscription added");
        self.subscriptions.push(Subscription { id, filter, handler });
        id
    }

    /// Returns `false` if the id was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|sub| sub.id != id);
        before != self.subscriptions.len()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn emit(&mut self, event: &StackEvent) {
        let kind = event.kind();
        for sub in self.subscriptions.iter_mut() {
            if sub.filter.is_none_or(|filter| filter == kind) {
                (sub.handler)(event);
            }
        }
    }
}
