//! # Standard Components
//!
//! Components every game object can carry regardless of the scene it lives
//! in: a string name and signal/slot triggers.

pub mod string_id;
pub mod triggers;

pub use string_id::{
    get_string_id, set_string_id, string_hash, RoStringQuery, StringHashQuery, StringId,
    StringIdComponent, StringIdView, StringPatternQuery, StringQuery, STRING_ID_LENGTH,
};
pub use triggers::{
    connect_trigger, trigger, SlotFn, TriggerComponent, TriggerId, TriggerView, Triggers,
    TRANSFORM_CHANGED,
};
