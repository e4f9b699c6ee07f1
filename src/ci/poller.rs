//! Fixed-interval daily build polling
//!
//! Every cycle issues one query and hands a finished record to the caller.
//! Failed queries, empty results and unfinished builds are only logged; the
//! loop sleeps a full interval and tries again.

use crate::ci::client::{DailyBuild, DailyBuildSource, DailyBuildsQuery};
use crate::error::FirmloopResult;
use crate::exec::check_cancelled;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Polls a daily build source until a caller-accepted record shows up
#[derive(Clone)]
pub struct CiPoller {
    source: Arc<dyn DailyBuildSource>,
    interval: Duration,
}

impl CiPoller {
    /// Create a poller sleeping `interval` between cycles
    pub fn new(source: Arc<dyn DailyBuildSource>, interval: Duration) -> Self {
        Self { source, interval }
    }

    /// Underlying record source
    pub fn source(&self) -> &Arc<dyn DailyBuildSource> {
        &self.source
    }

    /// Poll until `extract` accepts a finished record and return its value.
    ///
    /// Cancellation is checked at the start of each cycle; the sleep between
    /// cycles always runs to completion.
    pub async fn poll_until<F, Fut>(
        &self,
        query: &DailyBuildsQuery,
        cancel: &CancellationToken,
        mut extract: F,
    ) -> FirmloopResult<String>
    where
        F: FnMut(DailyBuild) -> Fut,
        Fut: Future<Output = Option<String>>,
    {
        loop {
            check_cancelled(cancel)?;

            match self.source.daily_builds(query).await {
                Ok(records) => match records.into_iter().next() {
                    Some(record) if record.is_terminal() => {
                        if let Some(found) = extract(record).await {
                            return Ok(found);
                        }
                    }
                    Some(record) => debug!(
                        "Latest build {} of {} is still '{}'",
                        record.id, query.component, record.current_status
                    ),
                    None => debug!("No daily builds for {} yet", query.component),
                },
                Err(e) => error!("Can not query builds: {}", e),
            }

            tokio::time::sleep(self.interval).await;
        }
    }
}
