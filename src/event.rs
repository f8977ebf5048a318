use serde::de::DeserializeOwned;
use serde::Serialize;

/// A domain event: an immutable fact recording a committed transition.
///
/// Events are serialized when persisted and deserialized through
/// [`Upcaster::upcast`] when read back, so historical payloads are never
/// rewritten in place - schema evolution happens in the fold.
pub trait Event: Serialize + DeserializeOwned + Upcaster {
    /// The event kind, matched against [`Transition::event_kind`] during
    /// replay to recover the aggregate's status.
    ///
    /// [`Transition::event_kind`]: crate::Transition::event_kind
    fn kind(&self) -> &'static str;
}

/// Decodes a persisted payload, possibly written by an older version of the
/// event type, into the current one.
///
/// The default implementation deserializes the payload as-is. Implementors
/// with versioned schemas should bump [`Upcaster::current_version`] and match
/// on the stored version to migrate old shapes.
pub trait Upcaster
where
    Self: Sized + DeserializeOwned,
{
    fn upcast(value: serde_json::Value, _version: Option<i32>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// The schema version written alongside newly appended events.
    fn current_version() -> Option<i32> {
        None
    }
}
