pub mod retry;
pub mod scylla;
pub mod query_builder;

pub use self::scylla::ScyllaConnection;
pub use query_builder::QueryBuilder;
pub use retry::{PollOutcome, PollPolicy};
