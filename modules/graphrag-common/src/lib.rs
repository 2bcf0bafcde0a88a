pub mod config;
pub mod error;
pub mod safety;
pub mod traits;
pub mod types;

pub use config::Config;
pub use error::{GraphReadError, RagError};
pub use safety::{validate_read_only, ValidatedQuery};
pub use traits::{GraphReader, TextEmbedder, TextGenerator};
pub use types::*;
