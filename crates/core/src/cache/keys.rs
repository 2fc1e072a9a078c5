use uuid::Uuid;

/// Returns the cache key for the state of one item for one learner.
pub fn progress_key(learner_id: Uuid, item_id: Uuid) -> String {
    format!("progress:{}:{}", learner_id, item_id)
}

/// Returns the cache key for a learner's full schedule.
pub fn learner_schedule_key(learner_id: Uuid) -> String {
    format!("learner:{}:schedule", learner_id)
}

/// Returns the prefix shared by all query keys of a learner.
pub fn learner_prefix(learner_id: Uuid) -> String {
    format!("learner:{}:", learner_id)
}

/// Extracts the learner ID from a cache key, if present.
///
/// Both `progress:` and `learner:` keys carry the learner in their second
/// segment.
///
/// # Examples
///
/// ```
/// use recall_core::cache::{extract_learner_id_from_key, progress_key};
/// use uuid::Uuid;
///
/// let learner = Uuid::from_u128(7);
/// let key = progress_key(learner, Uuid::nil());
/// assert_eq!(extract_learner_id_from_key(&key), Some(learner));
///
/// assert_eq!(extract_learner_id_from_key("session:123"), None);
/// ```
pub fn extract_learner_id_from_key(key: &str) -> Option<Uuid> {
    let rest = key
        .strip_prefix("progress:")
        .or_else(|| key.strip_prefix("learner:"))?;
    let uuid_part = rest.split(':').next()?;
    Uuid::parse_str(uuid_part).ok()
}

/// Extracts the learner ID from an invalidation prefix, if the prefix is
/// scoped to exactly one learner.
pub fn extract_learner_id_from_prefix(prefix: &str) -> Option<Uuid> {
    let rest = prefix
        .strip_prefix("progress:")
        .or_else(|| prefix.strip_prefix("learner:"))?;
    let (uuid_part, _) = rest.split_once(':')?;
    Uuid::parse_str(uuid_part).ok()
}
