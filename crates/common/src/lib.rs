//! Shared types for the social backend services.

pub mod deadline;
pub mod types;

pub use deadline::Deadline;
pub use types::{DialogId, GlobalId, GroupId, MessageId, RequestId, RowId, UserId, now_millis};
