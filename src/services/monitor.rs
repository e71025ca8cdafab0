use crate::models::{classify_delivered, ripple_to_unix, Delivered, LedgerTransaction};
use crate::services::Analytics;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Absolute floor on the tolerance band, so tiny purchases still match.
pub const MIN_TOLERANCE: f64 = 0.001;

/// Transactions older than monitoring start minus this buffer are ignored,
/// so a stale payment from an earlier attempt cannot satisfy this one.
pub const STALE_BUFFER_SECS: i64 = 60;

pub const DEFAULT_TX_PAGE_LIMIT: u32 = 20;

/// Where the monitor reads recent ledger history from. Production wires the
/// public-node RPC client; tests script histories.
#[async_trait]
pub trait LedgerSource: Send + Sync {
    async fn recent_transactions(
        &self,
        account: &str,
        limit: u32,
    ) -> Result<Vec<LedgerTransaction>>;
}

/// Parameters for one monitoring attempt. Lives from a successful initiate
/// until match, timeout, or cancellation.
#[derive(Debug, Clone)]
pub struct MonitoringSession {
    pub destination_address: String,
    pub expected_amount: f64,
    pub currency_code: String,
    pub issuer: Option<String>,
    pub tolerance_fraction: f64,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub tx_page_limit: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchedPayment {
    pub tx_hash: String,
    pub explorer_url: String,
    pub actual_amount: f64,
    pub delivered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MonitorState {
    Idle,
    Polling {
        started_at: DateTime<Utc>,
        polls: u64,
    },
    Matched {
        payment: MatchedPayment,
    },
    TimedOut {
        error: String,
    },
    Cancelled,
}

struct ActiveSession {
    cancel: watch::Sender<bool>,
    state: Arc<RwLock<MonitorState>>,
    handle: JoinHandle<()>,
}

/// Owns the single active monitoring session. Starting a new session tears
/// down the previous one first; one cancel signal stops both the poll loop
/// and the countdown, since both live in the same task.
pub struct MonitorService {
    active: Mutex<Option<ActiveSession>>,
    analytics: Arc<Analytics>,
}

impl MonitorService {
    pub fn new(analytics: Arc<Analytics>) -> Self {
        Self {
            active: Mutex::new(None),
            analytics,
        }
    }

    pub async fn start(&self, session: MonitoringSession, source: Arc<dyn LedgerSource>) {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            tracing::info!("Replacing active monitoring session");
            cancel_session(previous).await;
        }

        let state = Arc::new(RwLock::new(MonitorState::Polling {
            started_at: Utc::now(),
            polls: 0,
        }));
        let (cancel_tx, cancel_rx) = watch::channel(false);

        tracing::info!(
            destination = %session.destination_address,
            expected = session.expected_amount,
            timeout_secs = session.timeout.as_secs(),
            "Starting payment monitoring"
        );

        let handle = tokio::spawn(run_monitor(
            session,
            source,
            state.clone(),
            cancel_rx,
            self.analytics.clone(),
        ));

        *active = Some(ActiveSession {
            cancel: cancel_tx,
            state,
            handle,
        });
    }

    /// Cancels the active session, if any. Required cleanup contract for
    /// checkout teardown; a forgotten session would poll the ledger for the
    /// rest of its timeout.
    pub async fn cancel(&self) -> bool {
        let mut active = self.active.lock().await;
        match active.take() {
            Some(session) => {
                cancel_session(session).await;
                true
            }
            None => false,
        }
    }

    pub async fn status(&self) -> MonitorState {
        let active = self.active.lock().await;
        match active.as_ref() {
            Some(session) => session.state.read().await.clone(),
            None => MonitorState::Idle,
        }
    }
}

async fn cancel_session(session: ActiveSession) {
    let _ = session.cancel.send(true);
    session.handle.abort();

    let mut state = session.state.write().await;
    if matches!(*state, MonitorState::Polling { .. }) {
        *state = MonitorState::Cancelled;
    }
}

async fn run_monitor(
    session: MonitoringSession,
    source: Arc<dyn LedgerSource>,
    state: Arc<RwLock<MonitorState>>,
    mut cancel_rx: watch::Receiver<bool>,
    analytics: Arc<Analytics>,
) {
    let started_at = Utc::now();
    let criteria = MatchCriteria {
        destination: session.destination_address.clone(),
        expected_amount: session.expected_amount,
        currency_code: session.currency_code.clone(),
        issuer: session.issuer.clone(),
        tolerance_fraction: session.tolerance_fraction,
        cutoff_unix: started_at.timestamp() - STALE_BUFFER_SECS,
    };

    let deadline = tokio::time::sleep(session.timeout);
    tokio::pin!(deadline);
    let mut ticker = tokio::time::interval(session.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut polls: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel_rx.changed() => {
                let mut current = state.write().await;
                if matches!(*current, MonitorState::Polling { .. }) {
                    *current = MonitorState::Cancelled;
                }
                tracing::info!("Monitoring session cancelled after {} polls", polls);
                return;
            }

            _ = &mut deadline => {
                *state.write().await = MonitorState::TimedOut {
                    error: "timeout".to_string(),
                };
                analytics.record_payment_timed_out();
                tracing::warn!(
                    "No matching payment within {}s, giving up",
                    session.timeout.as_secs()
                );
                return;
            }

            _ = ticker.tick() => {
                polls += 1;
                match source
                    .recent_transactions(&session.destination_address, session.tx_page_limit)
                    .await
                {
                    Ok(transactions) => {
                        if let Some(payment) = find_matching_payment(&transactions, &criteria) {
                            tracing::info!(
                                tx_hash = %payment.tx_hash,
                                actual = payment.actual_amount,
                                expected = session.expected_amount,
                                "Matching payment observed on poll {}",
                                polls
                            );
                            *state.write().await = MonitorState::Matched { payment };
                            analytics.record_payment_matched();
                            return;
                        }
                        *state.write().await = MonitorState::Polling { started_at, polls };
                    }
                    Err(e) => {
                        // Transient ledger errors degrade to a missed poll.
                        tracing::warn!("Ledger poll {} failed: {:#}", polls, e);
                        *state.write().await = MonitorState::Polling { started_at, polls };
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatchCriteria {
    pub destination: String,
    pub expected_amount: f64,
    pub currency_code: String,
    pub issuer: Option<String>,
    pub tolerance_fraction: f64,
    pub cutoff_unix: i64,
}

/// Loose band absorbing price drift between checkout-time conversion and
/// wallet-side execution.
pub fn within_tolerance(delivered: f64, expected: f64, fraction: f64) -> bool {
    let tolerance = (expected * fraction).max(MIN_TOLERANCE);
    (delivered - expected).abs() <= tolerance
}

/// Scans a most-recent-first transaction page for a payment satisfying the
/// session criteria.
pub fn find_matching_payment(
    transactions: &[LedgerTransaction],
    criteria: &MatchCriteria,
) -> Option<MatchedPayment> {
    for entry in transactions {
        let Some(tx) = entry.tx.as_ref() else { continue };

        if tx.transaction_type.as_deref() != Some("Payment") {
            continue;
        }
        let result = entry
            .meta
            .as_ref()
            .and_then(|m| m.transaction_result.as_deref());
        if result != Some("tesSUCCESS") {
            continue;
        }
        if tx.destination.as_deref() != Some(criteria.destination.as_str()) {
            continue;
        }

        let Some(date) = tx.date else { continue };
        if ripple_to_unix(date) < criteria.cutoff_unix {
            continue;
        }

        let delivered =
            classify_delivered(entry, &criteria.currency_code, criteria.issuer.as_deref());
        let actual_amount = match delivered {
            Delivered::Expected(amount) => amount,
            Delivered::Ambiguous => {
                tracing::warn!(
                    tx_hash = ?tx.hash,
                    "Delivered amount is ambiguous (bare drops with a {} trust line touched), skipping",
                    criteria.currency_code
                );
                continue;
            }
            Delivered::Native(_) | Delivered::Other => continue,
        };

        if !within_tolerance(actual_amount, criteria.expected_amount, criteria.tolerance_fraction) {
            continue;
        }

        let Some(hash) = tx.hash.clone() else { continue };
        return Some(MatchedPayment {
            explorer_url: explorer_url(&hash),
            tx_hash: hash,
            actual_amount,
            delivered_at: DateTime::from_timestamp(ripple_to_unix(date), 0)
                .unwrap_or_else(Utc::now),
        });
    }

    None
}

pub fn explorer_url(tx_hash: &str) -> String {
    format!("https://livenet.xrpl.org/transactions/{}", tx_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RIPPLE_EPOCH_OFFSET;
    use crate::services::StorageService;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DEST: &str = "rRippleBidsTreasuryXXXXXXXXXXXXXX";
    const ISSUER: &str = "rXRPBIssuerAddressXXXXXXXXXXXXXXXX";

    struct ScriptedLedger {
        calls: AtomicUsize,
        pages: Vec<Vec<LedgerTransaction>>,
    }

    impl ScriptedLedger {
        fn new(pages: Vec<Vec<LedgerTransaction>>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                pages,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LedgerSource for ScriptedLedger {
        async fn recent_transactions(
            &self,
            _account: &str,
            _limit: u32,
        ) -> Result<Vec<LedgerTransaction>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let page = self
                .pages
                .get(call)
                .or_else(|| self.pages.last())
                .cloned()
                .unwrap_or_default();
            Ok(page)
        }
    }

    fn xrpb_payment(value: &str, hash: &str) -> LedgerTransaction {
        let now_ripple = Utc::now().timestamp() - RIPPLE_EPOCH_OFFSET;
        serde_json::from_value(json!({
            "tx": {
                "TransactionType": "Payment",
                "Destination": DEST,
                "hash": hash,
                "date": now_ripple
            },
            "meta": {
                "TransactionResult": "tesSUCCESS",
                "delivered_amount": {
                    "currency": "5852504200000000000000000000000000000000",
                    "issuer": ISSUER,
                    "value": value
                },
                "AffectedNodes": []
            }
        }))
        .unwrap()
    }

    fn session(expected: f64) -> MonitoringSession {
        MonitoringSession {
            destination_address: DEST.to_string(),
            expected_amount: expected,
            currency_code: "XRPB".to_string(),
            issuer: Some(ISSUER.to_string()),
            tolerance_fraction: 0.09,
            timeout: Duration::from_secs(600),
            poll_interval: Duration::from_millis(10_000),
            tx_page_limit: DEFAULT_TX_PAGE_LIMIT,
        }
    }

    async fn monitor() -> MonitorService {
        let storage = Arc::new(StorageService::new("redis://127.0.0.1:1").await.unwrap());
        MonitorService::new(Arc::new(Analytics::new(storage)))
    }

    #[test]
    fn tolerance_accepts_nine_percent_drift_and_rejects_beyond() {
        // diff 3 against a 45-token band
        assert!(within_tolerance(503.0, 500.0, 0.09));
        assert!(within_tolerance(497.0, 500.0, 0.09));
        // diff 100 is far outside the band
        assert!(!within_tolerance(600.0, 500.0, 0.09));
        // the floor keeps micro-amounts matchable
        assert!(within_tolerance(0.0105, 0.01, 0.09));
    }

    #[test]
    fn stale_transactions_are_not_matched() {
        let mut tx = xrpb_payment("500", "STALE");
        if let Some(t) = tx.tx.as_mut() {
            t.date = Some(Utc::now().timestamp() - RIPPLE_EPOCH_OFFSET - 3600);
        }
        let criteria = MatchCriteria {
            destination: DEST.to_string(),
            expected_amount: 500.0,
            currency_code: "XRPB".to_string(),
            issuer: Some(ISSUER.to_string()),
            tolerance_fraction: 0.09,
            cutoff_unix: Utc::now().timestamp() - STALE_BUFFER_SECS,
        };
        assert!(find_matching_payment(&[tx], &criteria).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn payment_within_tolerance_matches_on_second_poll() {
        // $50 at 0.1 USD/XRPB expects 500; 502 lands inside the band.
        let ledger = ScriptedLedger::new(vec![vec![], vec![xrpb_payment("502", "E2EHASH")]]);
        let service = monitor().await;
        service.start(session(500.0), ledger.clone()).await;

        tokio::time::sleep(Duration::from_secs(15)).await;

        match service.status().await {
            MonitorState::Matched { payment } => {
                assert_eq!(payment.tx_hash, "E2EHASH");
                assert_eq!(payment.actual_amount, 502.0);
                assert!(payment.explorer_url.contains("E2EHASH"));
            }
            other => panic!("expected Matched, got {:?}", other),
        }
        assert_eq!(ledger.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn session_times_out_once_and_polling_stops() {
        let ledger = ScriptedLedger::new(vec![vec![]]);
        let service = monitor().await;
        service.start(session(500.0), ledger.clone()).await;

        tokio::time::sleep(Duration::from_secs(700)).await;

        assert!(matches!(
            service.status().await,
            MonitorState::TimedOut { .. }
        ));
        let calls_at_timeout = ledger.calls();

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(ledger.calls(), calls_at_timeout);
        assert!(matches!(
            service.status().await,
            MonitorState::TimedOut { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_mid_session_stops_all_timers() {
        let ledger = ScriptedLedger::new(vec![vec![]]);
        let service = monitor().await;
        service.start(session(500.0), ledger.clone()).await;

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert!(service.cancel().await);

        let calls_at_cancel = ledger.calls();
        tokio::time::sleep(Duration::from_secs(1200)).await;

        assert_eq!(ledger.calls(), calls_at_cancel);
        // the session is gone, not timed out
        assert!(matches!(service.status().await, MonitorState::Idle));
    }

    #[tokio::test(start_paused = true)]
    async fn starting_a_new_session_cancels_the_previous_one() {
        let first = ScriptedLedger::new(vec![vec![]]);
        let second = ScriptedLedger::new(vec![vec![]]);
        let service = monitor().await;

        service.start(session(500.0), first.clone()).await;
        tokio::time::sleep(Duration::from_secs(15)).await;
        let first_calls = first.calls();

        service.start(session(750.0), second.clone()).await;
        tokio::time::sleep(Duration::from_secs(35)).await;

        assert_eq!(first.calls(), first_calls);
        assert!(second.calls() > 0);
        assert!(matches!(
            service.status().await,
            MonitorState::Polling { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn ambiguous_delivery_is_skipped_not_matched() {
        let now_ripple = Utc::now().timestamp() - RIPPLE_EPOCH_OFFSET;
        let ambiguous: LedgerTransaction = serde_json::from_value(json!({
            "tx": {
                "TransactionType": "Payment",
                "Destination": DEST,
                "hash": "AMBIG",
                "date": now_ripple
            },
            "meta": {
                "TransactionResult": "tesSUCCESS",
                "delivered_amount": "500000000",
                "AffectedNodes": [{
                    "ModifiedNode": {
                        "LedgerEntryType": "RippleState",
                        "FinalFields": {
                            "Balance": {"currency": "5852504200000000000000000000000000000000",
                                        "issuer": "rrrrrrrrrrrrrrrrrrrrBZbvji", "value": "-500"},
                            "HighLimit": {"issuer": ISSUER, "currency": "XRPB", "value": "0"},
                            "LowLimit": {"issuer": "rHolder", "currency": "XRPB", "value": "1000000"}
                        }
                    }
                }]
            }
        }))
        .unwrap();

        let ledger = ScriptedLedger::new(vec![vec![ambiguous]]);
        let service = monitor().await;
        service.start(session(500.0), ledger).await;

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(matches!(
            service.status().await,
            MonitorState::Polling { .. }
        ));
    }
}
