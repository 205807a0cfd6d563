//! Backing stores for polls, votes, and profiles.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;
