pub mod orchestrator;
pub mod scan_session;
pub mod uplink;

use tokio::time::{Duration, Instant};

/// A deadline that never fires; used to park disabled `select!` branches
pub(crate) fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(60 * 60 * 24 * 365)
}
