use std::sync::Arc;

use crate::application::{ChatService, TrainingTracker};
use crate::domain::ports::RateLimiter;
use crate::infrastructure::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ChatService>,
    pub training: Arc<TrainingTracker>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        chat_service: ChatService,
        rate_limiter: Arc<dyn RateLimiter>,
        config: AppConfig,
    ) -> Self {
        Self {
            chat_service: Arc::new(chat_service),
            training: Arc::new(TrainingTracker::new()),
            rate_limiter,
            config: Arc::new(config),
        }
    }
}
