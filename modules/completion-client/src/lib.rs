//! Structured completion adapters.
//!
//! Each client takes a system prompt, a user prompt and a JSON schema, and returns
//! the model's reply as a `serde_json::Value` that conforms to the schema (or an error).

pub mod claude;
pub mod error;
pub mod openai;
pub mod schema;
pub mod util;

pub use claude::Claude;
pub use error::{CompletionError, Result};
pub use openai::OpenAi;
pub use schema::{strict_schema, strictify};
