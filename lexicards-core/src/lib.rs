pub mod errors;
pub mod filters;
pub mod models;
pub mod queue;
pub mod repo;
pub mod scheduler;
pub mod service;
pub mod stats;

pub use errors::*;
pub use filters::*;
pub use models::*;
pub use queue::*;
pub use repo::*;
pub use scheduler::*;
pub use service::*;
pub use stats::*;
