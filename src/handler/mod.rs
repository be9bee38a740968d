//! Request handler module
//!
//! Routes requests to the JSON endpoints and the media directory.

pub mod media;
pub mod router;

pub use router::handle_request;
