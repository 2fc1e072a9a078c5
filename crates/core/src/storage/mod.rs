mod batch;
mod error;
mod traits;

pub use batch::{StagedWrite, WriteBatch};
pub use error::{record_id, Result, StoreError};
pub use traits::ProgressStore;
