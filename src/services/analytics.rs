use crate::{models::Stats, services::StorageService};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub struct Analytics {
    storage: Arc<StorageService>,
    checkouts_started: AtomicU64,
    payments_matched: AtomicU64,
    payments_timed_out: AtomicU64,
    payments_finalized: AtomicU64,
    requests_handled: AtomicU64,
    start_time: Instant,
}

impl Analytics {
    pub fn new(storage: Arc<StorageService>) -> Self {
        Self {
            storage,
            checkouts_started: AtomicU64::new(0),
            payments_matched: AtomicU64::new(0),
            payments_timed_out: AtomicU64::new(0),
            payments_finalized: AtomicU64::new(0),
            requests_handled: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Called from router middleware on every handled request.
    pub async fn record_request(&self) {
        self.requests_handled.fetch_add(1, Ordering::SeqCst);

        let date = Utc::now().format("%Y-%m-%d").to_string();
        let _ = self
            .storage
            .increment(&format!("analytics:requests:{}", date), 1)
            .await;
    }

    pub async fn record_checkout_started(&self, chain: &str, fiat_amount: f64) {
        self.checkouts_started.fetch_add(1, Ordering::SeqCst);

        let date = Utc::now().format("%Y-%m-%d").to_string();
        let _ = self
            .storage
            .increment(&format!("analytics:checkouts:{}", date), 1)
            .await;
        let _ = self
            .storage
            .increment(&format!("analytics:chain:{}:{}", chain, date), 1)
            .await;

        tracing::info!("Checkout started: ${} via {}", fiat_amount, chain);
    }

    pub fn record_payment_matched(&self) {
        self.payments_matched.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_payment_timed_out(&self) {
        self.payments_timed_out.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_payment_finalized(&self) {
        self.payments_finalized.fetch_add(1, Ordering::SeqCst);
    }

    pub async fn get_stats(&self) -> Stats {
        let date = Utc::now().format("%Y-%m-%d").to_string();

        // The per-day Redis counter survives restarts; without Redis the
        // in-process counter carries the number.
        let persisted = self
            .storage
            .increment(&format!("analytics:requests:{}", date), 0)
            .await
            .unwrap_or(0) as u64;
        let requests_today = persisted.max(self.requests_handled.load(Ordering::SeqCst));

        Stats {
            checkouts_started: self.checkouts_started.load(Ordering::SeqCst),
            payments_matched: self.payments_matched.load(Ordering::SeqCst),
            payments_timed_out: self.payments_timed_out.load(Ordering::SeqCst),
            payments_finalized: self.payments_finalized.load(Ordering::SeqCst),
            requests_today,
            uptime_seconds: self.uptime_seconds(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn analytics() -> Analytics {
        let storage = Arc::new(StorageService::new("redis://127.0.0.1:1").await.unwrap());
        Analytics::new(storage)
    }

    #[tokio::test]
    async fn handled_requests_show_up_in_stats() {
        let analytics = analytics().await;
        assert_eq!(analytics.get_stats().await.requests_today, 0);

        analytics.record_request().await;
        analytics.record_request().await;
        analytics.record_request().await;

        assert_eq!(analytics.get_stats().await.requests_today, 3);
    }

    #[tokio::test]
    async fn checkout_counters_track_the_session_lifecycle() {
        let analytics = analytics().await;

        analytics.record_checkout_started("xrpl", 50.0).await;
        analytics.record_payment_matched();
        analytics.record_payment_finalized();

        let stats = analytics.get_stats().await;
        assert_eq!(stats.checkouts_started, 1);
        assert_eq!(stats.payments_matched, 1);
        assert_eq!(stats.payments_timed_out, 0);
        assert_eq!(stats.payments_finalized, 1);
    }
}
