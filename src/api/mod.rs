//! JSON-lines API over TCP

pub mod message;
pub mod server;

pub use message::{ErrorBody, Request, Response};
pub use server::{dispatch, ApiServer};
