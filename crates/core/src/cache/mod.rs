mod error;
mod keys;
mod serialization;
mod traits;

pub use error::{CacheError, Result};
pub use keys::{
    extract_learner_id_from_key, extract_learner_id_from_prefix, learner_prefix,
    learner_schedule_key, progress_key,
};
pub use serialization::{deserialize_state, deserialize_states, serialize_state, serialize_states};
pub use traits::Cache;
