#![cfg(feature = "net")]

mod deadline;
mod parser;
mod response;

pub(super) use deadline::RequestDeadline;
pub use parser::read_request;
pub use parser::SimpleHttpRequest;
pub(super) use response::write_json_response;
