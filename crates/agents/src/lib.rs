use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use crisis_core::{answer_detailed, Intent, PlanningState, QaResponse};
use crisis_observability::AppMetrics;
use crisis_storage::PlanningStateRepository;
use tracing::{debug, info, instrument};

/// Answers operator questions against whatever snapshot the store holds at
/// the moment the question arrives.
#[derive(Clone)]
pub struct PlanQaAgent<S>
where
    S: PlanningStateRepository,
{
    store: Arc<S>,
    metrics: Arc<AppMetrics>,
}

impl<S> PlanQaAgent<S>
where
    S: PlanningStateRepository,
{
    pub fn new(store: Arc<S>, metrics: Arc<AppMetrics>) -> Self {
        Self { store, metrics }
    }

    #[instrument(skip(self, query), fields(query_len = query.len()))]
    pub async fn handle_query(&self, query: &str) -> Result<QaResponse> {
        let started = Instant::now();
        let snapshot = self
            .store
            .snapshot()
            .await
            .context("failed to read planning state")?;

        let answer = answer_detailed(query, &snapshot);
        self.metrics.record_query(answer.intent.as_tag());

        if answer.intent == Intent::Unrecognized {
            self.metrics.inc_unrecognized();
        }
        if let Some(stage) = answer.intent.required_input() {
            if snapshot.stage(stage).is_none() {
                self.metrics.inc_missing_input(stage);
                debug!(stage, "planning stage not available yet");
            }
        }

        let elapsed = started.elapsed();
        self.metrics.observe_latency(elapsed);
        info!(
            intent = answer.intent.as_tag(),
            state_version = snapshot.version,
            latency_micros = elapsed.as_micros() as u64,
            "query answered"
        );

        Ok(QaResponse {
            answer: answer.text,
            intent: answer.intent,
            version: snapshot.version,
        })
    }

    pub async fn snapshot(&self) -> Result<Arc<PlanningState>> {
        self.store.snapshot().await
    }

    #[instrument(skip(self, outputs))]
    pub async fn replace_state(&self, outputs: PlanningState) -> Result<Arc<PlanningState>> {
        let present = PlanningState::STAGES
            .iter()
            .filter(|stage| outputs.stage(stage).is_some())
            .count();

        let next = self
            .store
            .replace(outputs)
            .await
            .context("failed to replace planning state")?;
        self.metrics.inc_state_replacement();

        info!(
            version = next.version,
            stages_present = present,
            "planning state replaced"
        );
        Ok(next)
    }

    pub fn metrics(&self) -> &Arc<AppMetrics> {
        &self.metrics
    }
}
