//! JSON encoding of learning states for cache storage.

use crate::progress::LearningState;

use super::{CacheError, Result};

pub fn serialize_state(state: &LearningState) -> Result<Vec<u8>> {
    serde_json::to_vec(state).map_err(|e| CacheError::Serialization(e.to_string()))
}

pub fn deserialize_state(bytes: &[u8]) -> Result<LearningState> {
    serde_json::from_slice(bytes).map_err(|e| CacheError::Serialization(e.to_string()))
}

/// Serializes an ordered schedule.
pub fn serialize_states(states: &[LearningState]) -> Result<Vec<u8>> {
    serde_json::to_vec(states).map_err(|e| CacheError::Serialization(e.to_string()))
}

pub fn deserialize_states(bytes: &[u8]) -> Result<Vec<LearningState>> {
    serde_json::from_slice(bytes).map_err(|e| CacheError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{apply_grade, Grade, SchedulerParams};
    use chrono::{DateTime, TimeZone, Utc};
    use uuid::Uuid;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 10, 30, 0).unwrap()
    }

    fn reviewed_state() -> LearningState {
        let params = SchedulerParams::default();
        let state = LearningState::new(
            Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap(),
            Uuid::parse_str("6ba7b810-9dad-11d1-80b4-00c04fd430c8").unwrap(),
            fixed_now(),
            &params,
        );
        apply_grade(&state, Grade::Hard, fixed_now(), &params).with_version(4)
    }

    #[test]
    fn test_roundtrip_reviewed_state() {
        let state = reviewed_state();

        let bytes = serialize_state(&state).expect("serialize should succeed");
        let deserialized = deserialize_state(&bytes).expect("deserialize should succeed");

        assert_eq!(state, deserialized);
    }

    #[test]
    fn test_never_reviewed_state_keeps_null_timestamp() {
        let state = LearningState::new(
            Uuid::nil(),
            Uuid::nil(),
            fixed_now(),
            &SchedulerParams::default(),
        );

        let bytes = serialize_state(&state).expect("serialize should succeed");
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert!(json["last_reviewed_at"].is_null());
        assert_eq!(deserialize_state(&bytes).unwrap(), state);
    }

    #[test]
    fn test_schedule_preserves_order() {
        let first = reviewed_state();
        let second = LearningState {
            item_id: Uuid::from_u128(9),
            ..reviewed_state()
        };

        let bytes = serialize_states(&[first.clone(), second.clone()]).unwrap();

        assert_eq!(deserialize_states(&bytes).unwrap(), vec![first, second]);
    }

    #[test]
    fn test_serialize_empty_schedule() {
        let bytes = serialize_states(&[]).unwrap();

        assert_eq!(bytes, b"[]");
        assert!(deserialize_states(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_deserialize_malformed_bytes() {
        assert!(matches!(
            deserialize_state(b"not valid json"),
            Err(CacheError::Serialization(_))
        ));
        assert!(matches!(
            deserialize_states(b"{\"invalid\": true}"),
            Err(CacheError::Serialization(_))
        ));
    }
}
