use chrono::{DateTime, Utc};

/// A fact emitted by an aggregate.
///
/// Events are immutable once appended and carry a schema version so stored
/// payloads can evolve.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable dotted type name, e.g. `"catalog.product.created"`.
    fn event_type(&self) -> &'static str;

    /// Schema version of this event type.
    fn version(&self) -> u32;

    /// Business time of the fact.
    fn occurred_at(&self) -> DateTime<Utc>;
}
