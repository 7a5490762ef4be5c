pub mod memory;
pub mod postgres;

pub use memory::MemoryLeadStore;
pub use postgres::PgLeadStore;
