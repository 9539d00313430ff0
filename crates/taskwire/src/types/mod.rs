/*
[INPUT]:  Request parameters, transport requests/responses, hook decisions
[OUTPUT]: Typed Rust structs/enums shared across the crate
[POS]:    Data layer - type definitions for task communication
[UPDATE]: When new shared types are added
*/

pub mod enums;
pub mod models;
pub mod parameter;

pub use enums::*;
pub use models::*;
pub use parameter::*;
