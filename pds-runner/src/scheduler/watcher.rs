//! Execution watcher
//!
//! Periodically reconciles finished tasks in the execution queue. The loop
//! holds a weak reference so it never keeps a dropped service alive.

use std::sync::Weak;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};
use tracing::{debug, info};

use crate::service::StandardExecutionService;

pub struct ExecutionWatcher {
    service: Weak<StandardExecutionService>,
    initial_delay: Duration,
    interval: Duration,
}

impl ExecutionWatcher {
    pub fn new(
        service: Weak<StandardExecutionService>,
        initial_delay: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            service,
            initial_delay,
            interval,
        }
    }

    /// Spawns the watcher loop
    ///
    /// The loop ends on its own once the service is dropped.
    pub fn spawn(self) -> JoinHandle<()> {
        info!(
            "Starting execution watcher (initial delay: {:?}, interval: {:?})",
            self.initial_delay, self.interval
        );

        tokio::spawn(async move {
            time::sleep(self.initial_delay).await;

            let mut ticker = time::interval(self.interval);

            loop {
                ticker.tick().await;

                let Some(service) = self.service.upgrade() else {
                    debug!("Execution service gone, stopping watcher");
                    break;
                };

                service.inspect_jobs_in_queue().await;
            }
        })
    }
}
