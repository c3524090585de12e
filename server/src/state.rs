use std::sync::Arc;

use crate::delivery::DeliveryCoordinator;
use crate::matching::MatchScheduler;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Presence, channels and conversations, behind the delivery coordinator
    pub delivery: Arc<DeliveryCoordinator>,
    /// Daily match scheduler (also ticked by its own background task)
    pub scheduler: Arc<MatchScheduler>,
}
