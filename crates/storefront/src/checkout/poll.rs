//! Bounded settlement polling.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::commerce::ShopApi;

/// Default number of polls before giving up.
pub const DEFAULT_ATTEMPTS: u32 = 10;

/// Default delay between polls.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Waits between polls.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Polls the active order until payment settlement is visible.
///
/// Settlement shows up either as the order reaching a settled state or as
/// the session having no active order at all (the platform detaches an
/// order from the session once it is paid).
#[derive(Clone)]
pub struct SettlementPoller {
    sleeper: Arc<dyn Sleeper>,
    attempts: u32,
    interval: Duration,
}

impl Default for SettlementPoller {
    fn default() -> Self {
        Self::new(Arc::new(TokioSleeper))
    }
}

impl SettlementPoller {
    #[must_use]
    pub fn new(sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            sleeper,
            attempts: DEFAULT_ATTEMPTS,
            interval: DEFAULT_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_schedule(mut self, attempts: u32, interval: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.interval = interval;
        self
    }

    /// Poll until settlement is observed or attempts run out.
    ///
    /// Returns whether settlement was observed. Poll errors count as a
    /// failed attempt.
    pub async fn wait_for_settlement(&self, commerce: &dyn ShopApi) -> bool {
        for attempt in 1..=self.attempts {
            match commerce.active_order().await {
                Ok(None) => {
                    debug!(attempt, "No active order, payment settled");
                    return true;
                }
                Ok(Some(order)) if order.state.is_settled() => {
                    debug!(attempt, state = %order.state, "Order settled");
                    return true;
                }
                Ok(Some(order)) => {
                    debug!(attempt, state = %order.state, "Order not settled yet");
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Settlement poll failed");
                }
            }

            if attempt < self.attempts {
                self.sleeper.sleep(self.interval).await;
            }
        }

        false
    }
}
