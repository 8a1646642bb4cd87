use std::sync::Arc;
use std::time::Instant;

use log::Logger;

use crate::io::UploadLimits;
use crate::lifecycle::Lifecycle;
use crate::urls::Urls;

/// Everything a request handler needs, cloned into each route.
#[derive(Clone)]
pub struct Environment {
    pub logger: Arc<Logger>,
    pub lifecycle: Arc<Lifecycle>,
    pub urls: Arc<Urls>,
    pub limits: UploadLimits,

    /// When the service started, for reporting uptime.
    pub started: Instant,
}

impl Environment {
    pub fn new(
        logger: Arc<Logger>,
        lifecycle: Arc<Lifecycle>,
        urls: Arc<Urls>,
        limits: UploadLimits,
    ) -> Self {
        Self {
            logger,
            lifecycle,
            urls,
            limits,
            started: Instant::now(),
        }
    }
}
