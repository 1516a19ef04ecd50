pub mod types;

pub use types::{Assessment, ErrorCategory, ParseCategoryError, RawCandidate, ValidatedError};
