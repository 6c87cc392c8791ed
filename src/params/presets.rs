use std::sync::Arc;

use crate::error::Result;
use crate::params::{EngineParams, EngineParamsBuilder};

/// 2^40 scale, 64 filters, auto-bootstrap at level 1.
/// Matches `backend::sim::params::compact`.
pub fn compact() -> Result<Arc<EngineParams>> {
    EngineParamsBuilder::new()
        .log_scale(40)
        .filter_count(64)
        .bootstrap(true)
        .build()
}

/// Same as [`compact`] without a bootstrapper. Products that run out of
/// depth are reported instead of refreshed.
pub fn no_bootstrap() -> Result<Arc<EngineParams>> {
    EngineParamsBuilder::new()
        .log_scale(40)
        .filter_count(64)
        .bootstrap(false)
        .build()
}

/// 2^45 scale, 1024 filters. Matches `backend::sim::params::wide`.
pub fn wide() -> Result<Arc<EngineParams>> {
    EngineParamsBuilder::new()
        .log_scale(45)
        .filter_count(1024)
        .bootstrap(true)
        .build()
}
