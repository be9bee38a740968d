// JSON API module
// Health check, media catalog and sticker matching endpoints

pub mod handlers;
mod types;

pub use handlers::{handle_catalog, handle_health, handle_match};
