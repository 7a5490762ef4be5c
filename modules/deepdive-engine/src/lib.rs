pub mod candidates;
pub mod canonical;
pub mod clues;
pub mod context;
pub mod discovery;
pub mod emails;
pub mod engine;
pub mod expansion;
pub mod identity;
pub mod job;
pub mod planner;
pub mod search;
pub mod store;
pub mod summarize;
pub mod sync;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;

pub use candidates::CandidateMap;
pub use context::RunContext;
pub use engine::DeepDive;
pub use identity::{Candidate, CandidateSource, IdentityValidator};
pub use job::DeepDiveJob;
pub use store::{MemoryLeadStore, PgLeadStore};
pub use sync::SyncReport;
pub use traits::{LeadStore, LinkResolver, ProfileFetcher, SearchProvider, StructuredCompletion};
