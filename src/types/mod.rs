//! Task record, service options, and response types.

pub mod options;
pub mod response;
pub mod task;

pub use options::*;
pub use response::*;
pub use task::*;
