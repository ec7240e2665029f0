//! Concurrent session execution and result aggregation.
//!
//! Spawns one [`CheckinSession`] per (account, target) pair, routes each
//! account's inbound events to the owning session, enforces one wall-clock
//! deadline shared by the whole run, and returns exactly one result per
//! pair.

use super::captcha::CaptchaResolver;
use super::history::HistoryStore;
use super::profile::TargetProfile;
use super::session::{CheckinOutcome, CheckinSession};
use crate::config::SESSION_CHANNEL_CAPACITY;
use crate::ocr::CaptchaOcr;
use crate::transport::{ChatTransport, InboundEvent};
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace, warn};

/// One terminal outcome per (account, target) pair.
pub type RunResults = HashMap<(String, String), CheckinOutcome>;

/// Runs all sessions of one check-in run.
pub struct SessionOrchestrator {
    transport: Arc<dyn ChatTransport>,
    ocr: Arc<dyn CaptchaOcr>,
    history: Arc<Mutex<HistoryStore>>,
    retries: u32,
}

impl SessionOrchestrator {
    /// Create an orchestrator over the shared collaborators.
    #[must_use]
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        ocr: Arc<dyn CaptchaOcr>,
        history: Arc<Mutex<HistoryStore>>,
        retries: u32,
    ) -> Self {
        Self {
            transport,
            ocr,
            history,
            retries,
        }
    }

    /// Run one session per (account, target) pair under a shared deadline.
    ///
    /// Sessions still non-terminal when `per_run_timeout` elapses are forced
    /// to [`CheckinOutcome::TimedOut`]. Every pair is present in the result,
    /// including pairs whose account had no inbound stream to subscribe to.
    pub async fn run(
        &self,
        accounts: &[String],
        targets: &[TargetProfile],
        per_run_timeout: Duration,
    ) -> RunResults {
        let deadline = CancellationToken::new();
        let mut sessions = Vec::new();
        let mut routers = Vec::new();

        for account in accounts {
            let Some(inbound) = self.transport.subscribe(account).await else {
                warn!(account = %account, "no inbound stream for account");
                continue;
            };
            let mut routes: HashMap<i64, mpsc::Sender<InboundEvent>> = HashMap::new();
            for target in targets {
                let (tx, rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
                routes.insert(target.chat_id, tx);
                let session = CheckinSession::new(
                    account.clone(),
                    target.clone(),
                    Arc::clone(&self.transport),
                    CaptchaResolver::new(Arc::clone(&self.ocr)),
                    Arc::clone(&self.history),
                    self.retries,
                );
                sessions.push(tokio::spawn(session.run(rx, deadline.clone())));
            }
            routers.push(tokio::spawn(route_account_events(inbound, routes)));
        }

        let timer = {
            let deadline = deadline.clone();
            tokio::spawn(async move {
                tokio::time::sleep(per_run_timeout).await;
                deadline.cancel();
            })
        };

        // Prefilled with timed-out so the report stays complete even for
        // pairs whose session never ran.
        let mut results: RunResults = accounts
            .iter()
            .flat_map(|a| {
                targets
                    .iter()
                    .map(move |t| ((a.clone(), t.id.clone()), CheckinOutcome::TimedOut))
            })
            .collect();

        for joined in join_all(sessions).await {
            match joined {
                Ok(report) => {
                    results.insert((report.account, report.target), report.outcome);
                }
                Err(e) => error!(error = %e, "session task failed"),
            }
        }

        timer.abort();
        for router in routers {
            router.abort();
        }

        for ((account, target), outcome) in &results {
            info!(
                account = %account,
                bot = %target,
                outcome = %outcome,
                "check-in result"
            );
        }
        results
    }
}

/// Forward one account's inbound events to the owning sessions by chat id.
async fn route_account_events(
    mut inbound: mpsc::Receiver<InboundEvent>,
    routes: HashMap<i64, mpsc::Sender<InboundEvent>>,
) {
    while let Some(event) = inbound.recv().await {
        let Some(tx) = routes.get(&event.chat.chat_id) else {
            trace!(chat_id = event.chat.chat_id, "event for unknown chat dropped");
            continue;
        };
        // A closed channel means the session is terminal; late events are
        // dropped, not buffered.
        let _ = tx.send(event).await;
    }
}
