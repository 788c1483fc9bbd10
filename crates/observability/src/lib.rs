use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

#[derive(Debug, Default)]
pub struct AppMetrics {
    queries_total: AtomicU64,
    unrecognized_total: AtomicU64,
    missing_input_total: AtomicU64,
    state_replacements_total: AtomicU64,
    total_latency_micros: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub queries_total: u64,
    pub unrecognized_total: u64,
    pub missing_input_total: u64,
    pub state_replacements_total: u64,
    pub avg_latency_micros: f64,
}

impl AppMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Counts one answered query under its intent tag.
    pub fn record_query(&self, intent_tag: &'static str) {
        self.queries_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("crisis_qa_queries_total", "intent" => intent_tag).increment(1);
    }

    pub fn inc_unrecognized(&self) {
        self.unrecognized_total.fetch_add(1, Ordering::Relaxed);
    }

    /// A recognized question whose planning stage has not been computed yet.
    pub fn inc_missing_input(&self, stage: &'static str) {
        self.missing_input_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("crisis_qa_missing_input_total", "stage" => stage).increment(1);
    }

    pub fn inc_state_replacement(&self) {
        self.state_replacements_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("crisis_qa_state_replacements_total").increment(1);
    }

    pub fn observe_latency(&self, duration: Duration) {
        self.total_latency_micros
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let queries = self.queries_total.load(Ordering::Relaxed);
        let latency = self.total_latency_micros.load(Ordering::Relaxed);

        MetricsSnapshot {
            queries_total: queries,
            unrecognized_total: self.unrecognized_total.load(Ordering::Relaxed),
            missing_input_total: self.missing_input_total.load(Ordering::Relaxed),
            state_replacements_total: self.state_replacements_total.load(Ordering::Relaxed),
            avg_latency_micros: if queries == 0 {
                0.0
            } else {
                latency as f64 / queries as f64
            },
        }
    }
}

pub fn init_tracing(service_name: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}=info,crisis_api=info,crisis_agents=info,crisis_storage=info",
                service_name
            ))
        });

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(std::io::stderr)
            .init();
    });
}
