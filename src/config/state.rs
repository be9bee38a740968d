// Application state module
// Shared, read-mostly state handed to every connection

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::types::Config;
use crate::matcher::Matcher;

/// Application state
pub struct AppState {
    pub config: Config,
    pub matcher: Matcher,

    // Cached config values for fast access without locks
    pub cached_access_log: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            matcher: Matcher::new(config.matcher.clone(), config.media.dir.clone()),
            cached_access_log: Arc::new(AtomicBool::new(config.logging.access_log)),
        }
    }

    pub fn access_log_enabled(&self) -> bool {
        self.cached_access_log.load(Ordering::Relaxed)
    }
}
