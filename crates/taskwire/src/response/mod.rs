/*
[INPUT]:  Completed task bytes and response heads
[OUTPUT]: Typed task responses produced by transforms
[POS]:    Response layer - transform pipeline
[UPDATE]: When adding built-in transforms or response fields
*/

pub mod transform;
pub mod types;

pub use transform::{Charset, JsonOptions, Transform};
pub use types::TaskResponse;
