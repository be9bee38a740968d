//! HTTP protocol layer module
//!
//! Protocol-level helpers (response builders, caching, MIME types) shared
//! by the JSON endpoints and the media route.

pub mod cache;
pub mod mime;
pub mod response;

pub use cache::CachePolicy;
pub use response::{
    build_304_response, build_405_response, build_media_response, build_options_response,
    json_response,
};
