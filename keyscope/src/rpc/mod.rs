//! Line-delimited JSON front end.
//!
//! The protocol carries one request or response object per line; see
//! [`proto`] for the envelope and error codes.

mod error;
mod handlers;
pub mod proto;
mod request;
mod response;
mod server;

pub use error::RpcError;
pub use handlers::Handler;
pub use server::Server;
