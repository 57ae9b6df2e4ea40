//! Segmented engine mapping
//!
//! The segmented engine reports discrete `(event, code, message)` triples, so the
//! mapping is a straight table.

use crate::engine::SegmentedNativeEvent;
use crate::state::CanonicalEvent;

/// Translate one native triple
pub fn translate(event: SegmentedNativeEvent, code: i32, message: &str) -> CanonicalEvent {
    match event {
        SegmentedNativeEvent::None => CanonicalEvent::None,
        SegmentedNativeEvent::Start => CanonicalEvent::Started,
        SegmentedNativeEvent::Pause | SegmentedNativeEvent::Stop => CanonicalEvent::Stopped,
        SegmentedNativeEvent::Complete => CanonicalEvent::Completed,
        SegmentedNativeEvent::Error => CanonicalEvent::failed(code, message),
        SegmentedNativeEvent::Remove => CanonicalEvent::RemovalRequested,
    }
}

/// Translate the engine's raw integer event code
pub fn translate_code(event: i32, code: i32, message: &str) -> CanonicalEvent {
    translate(SegmentedNativeEvent::from_i32(event), code, message)
}
