mod error;
mod exit_code;

pub use error::{Result, ReviewError};
pub use exit_code::{
    review_error_to_exit_code, EXIT_DATA_ERROR, EXIT_NOT_FOUND, EXIT_TEMPORARY,
};
