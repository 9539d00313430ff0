/*
[INPUT]:  Parameter trees and encoding modes
[OUTPUT]: Requests carrying encoded parameters
[POS]:    Encoding layer - parameter encoder
[UPDATE]: When adding encoding modes
*/

pub mod encoder;
pub mod query;

pub use encoder::{CustomEncoder, ParameterEncoding, PropertyListOptions};
pub use query::{RESERVED_CHARACTERS, escape, query_string};
