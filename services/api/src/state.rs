//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like upstream clients and stored analysis results.

use crate::{
    analysis::AnalysisStore,
    config::Config,
    upstream::{ImageAnalyzer, SessionMinter},
};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<dyn SessionMinter>,
    pub analyzer: Arc<dyn ImageAnalyzer>,
    pub analyses: Arc<AnalysisStore>,
    pub config: Arc<Config>,
}
