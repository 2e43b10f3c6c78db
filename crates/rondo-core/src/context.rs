//! Explicit process context.
//!
//! Rondo carries no hidden globals: configuration and the cancellation
//! signal travel together through every entry point as a [`Context`] value.

use crate::config::Config;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared context threaded through solver and executor entry points.
#[derive(Debug, Clone)]
pub struct Context {
    config: Arc<Config>,
    cancel: CancellationToken,
}

impl Context {
    /// Build a context from a configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            cancel: CancellationToken::new(),
        }
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The cancellation token; clone it to hand out to workers.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request cancellation at the next safe boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
