pub mod config;
pub mod error;
pub mod text;
pub mod types;

pub use config::{AiProvider, Config, DeepDiveConfig};
pub use error::{DeepDiveError, ProviderError};
pub use text::*;
pub use types::*;
