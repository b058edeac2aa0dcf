//! Change notifications raised by the garden.
//!
//! Events are sent synchronously on a `tokio` broadcast channel at the point
//! the change happens. Nobody is called back in-line; subscribers drain their
//! receiver whenever they like, so they can freely read the garden again.

use garden_core::Identifier;
use tokio::sync::broadcast;
use tracing::trace;

use crate::model::BinKind;

/// A change observable by presentation layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GardenEvent {
    /// Membership or content of a bin changed.
    BinChanged(BinKind),
    /// The garden-wide selection moved.
    SelectionChanged {
        /// Newly selected session, if any.
        selected: Option<Identifier>,
        /// Previously selected session, if any.
        previous: Option<Identifier>,
    },
    /// The selected session changed in place (a leaf was written or streamed).
    SelectionUpdated(Identifier),
}

/// Sending half of the event channel.
pub(crate) struct Notifier {
    tx: broadcast::Sender<GardenEvent>,
}

impl Notifier {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<GardenEvent> {
        self.tx.subscribe()
    }

    /// Send an event. Having no subscribers is not an error.
    pub(crate) fn emit(&self, event: GardenEvent) {
        trace!(?event, "garden event");
        let _ = self.tx.send(event);
    }
}

/// Collects affected bins so a bulk operation raises one event per bin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    bins: [bool; 3],
}

impl ChangeBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `kind` changed.
    pub fn mark(&mut self, kind: BinKind) {
        self.bins[kind.index()] = true;
    }

    /// Whether `kind` was recorded.
    pub fn contains(&self, kind: BinKind) -> bool {
        self.bins[kind.index()]
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        !self.bins.iter().any(|b| *b)
    }

    /// Emit one `BinChanged` per recorded bin, in bin order, and reset.
    pub(crate) fn flush(&mut self, notifier: &Notifier) {
        for kind in BinKind::ALL {
            if self.contains(kind) {
                notifier.emit(GardenEvent::BinChanged(kind));
            }
        }
        self.bins = [false; 3];
    }
}
