pub mod job;
pub mod registry;
pub mod worker;

pub use job::{JobStatus, PollingJob};
pub use registry::PollingRegistry;
