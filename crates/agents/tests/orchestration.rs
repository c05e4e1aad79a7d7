use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use proptest::prelude::*;
use serde_json::{Value as JsonValue, json};

use opspilot_agents::{
    AgentContext, AgentError, AnalysisResult, AnalysisUnit, BatchStatus, Findings, NarrativeError, NarrativeService,
    Orchestrator, OrchestratorConfig, OrchestratorError, Registry,
};
use opspilot_core::{
    AuditRecord, DataStore, DataStoreExt, Filter, InMemoryDataStore, Outcome, Record, StoreError, StoreResult, Table,
};

#[derive(Clone, Copy, Debug)]
enum Behaviour {
    Succeed,
    Fail,
    Panic,
    Hang,
    /// Sleeps, then writes a risk row and succeeds.
    SlowWrite,
}

struct Scripted {
    behaviour: Behaviour,
    calls: Arc<AtomicUsize>,
}

impl Scripted {
    fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl AnalysisUnit for Scripted {
    fn entity_type(&self) -> &'static str {
        "scripted"
    }

    fn description(&self) -> &'static str {
        "scripted run"
    }

    async fn execute(&self, ctx: &AgentContext) -> Result<AnalysisResult, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Succeed => Ok(AnalysisResult::new(
                ctx.agent(),
                Outcome::Success,
                format!("{} ok", ctx.agent()),
                Findings::Custom(ctx.input().cloned().unwrap_or(JsonValue::Null)),
            )
            .with_recommendations(vec!["keep going".to_string()])
            .with_narrative(ctx.narrate("summarize the run", &ctx.agent()).await)),
            Behaviour::Fail => Err(AgentError::analysis("db timeout")),
            Behaviour::Panic => panic!("scripted exploded"),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!()
            }
            Behaviour::SlowWrite => {
                tokio::time::sleep(Duration::from_millis(200)).await;
                ctx.store()
                    .insert(Table::RiskFindings, vec![json!({"vendor_id": "v-1", "source": ctx.agent()})])
                    .await?;
                Ok(AnalysisResult::new(
                    ctx.agent(),
                    Outcome::Success,
                    "slow write done",
                    Findings::Custom(JsonValue::Null),
                ))
            }
        }
    }
}

/// Store whose audit table rejects every write.
struct BrokenAuditStore {
    inner: InMemoryDataStore,
}

#[async_trait]
impl DataStore for BrokenAuditStore {
    async fn select(&self, table: Table, filter: &Filter) -> StoreResult<Vec<Record>> {
        self.inner.select(table, filter).await
    }

    async fn insert(&self, table: Table, records: Vec<Record>) -> StoreResult<Vec<Record>> {
        if table == Table::AgentActions {
            return Err(StoreError::backend("audit table offline"));
        }
        self.inner.insert(table, records).await
    }

    async fn update(&self, table: Table, filter: &Filter, patch: Record) -> StoreResult<Vec<Record>> {
        self.inner.update(table, filter, patch).await
    }
}

/// Narrator returning a fixed answer.
struct FixedNarrator(Result<String, NarrativeError>);

#[async_trait]
impl NarrativeService for FixedNarrator {
    async fn generate(&self, _prompt: &str, _context: &JsonValue) -> Result<String, NarrativeError> {
        self.0.clone()
    }
}

fn orchestrator(units: Vec<(&str, Behaviour)>) -> (Orchestrator, Arc<InMemoryDataStore>) {
    let registry = Registry::new();
    for (name, behaviour) in units {
        registry.register(name, Scripted::new(behaviour)).unwrap();
    }
    let store = Arc::new(InMemoryDataStore::new());
    (Orchestrator::new(Arc::new(registry), store.clone()), store)
}

async fn audit_rows(store: &InMemoryDataStore) -> Vec<AuditRecord> {
    store.select_as(Table::AgentActions, &Filter::all()).await.unwrap()
}

#[tokio::test]
async fn run_all_isolates_failures_and_audits_in_order() {
    let (orch, store) = orchestrator(vec![
        ("vendor-monitor", Behaviour::Succeed),
        ("invoice-validator", Behaviour::Fail),
    ]);

    let batch = orch.run_all().await.unwrap();

    assert_eq!(batch.len(), 2);
    assert_eq!(batch.entries[0].name, "vendor-monitor");
    assert!(matches!(&batch.entries[0].status, BatchStatus::Success { result } if result.agent == "vendor-monitor"));
    assert_eq!(batch.entries[1].name, "invoice-validator");
    assert_eq!(
        batch.entries[1].status,
        BatchStatus::Failed {
            error: "db timeout".to_string()
        }
    );

    let wire = serde_json::to_value(&batch).unwrap();
    assert_eq!(wire[0]["status"], "success");
    assert_eq!(wire[1], json!({"name": "invoice-validator", "status": "failed", "error": "db timeout"}));

    let audits = audit_rows(&store).await;
    let agents: Vec<_> = audits.iter().map(|a| a.agent.as_str()).collect();
    assert_eq!(agents, vec!["vendor-monitor", "invoice-validator"]);
    assert_eq!(audits[0].outcome, Outcome::Success);
    assert_eq!(audits[0].metadata.as_ref().unwrap()["trigger"], "batch");
    assert_eq!(audits[1].outcome, Outcome::Failed);
    assert_eq!(audits[1].action, "scripted run failed: db timeout");
}

#[tokio::test]
async fn run_one_failure_is_audited_then_raised() {
    let (orch, store) = orchestrator(vec![("vendor-monitor", Behaviour::Fail)]);

    let err = orch.run_one("vendor-monitor", None).await.unwrap_err();
    match err {
        OrchestratorError::UnitExecution { agent, source } => {
            assert_eq!(agent, "vendor-monitor");
            assert_eq!(source.to_string(), "db timeout");
        }
        other => panic!("unexpected error: {other}"),
    }

    let audits = audit_rows(&store).await;
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].outcome, Outcome::Failed);
    assert_eq!(audits[0].metadata.as_ref().unwrap()["error"], "db timeout");
}

#[tokio::test]
async fn run_one_success_writes_one_matching_record() {
    let (orch, store) = orchestrator(vec![("a", Behaviour::Succeed), ("b", Behaviour::Succeed)]);

    let result = orch.run_one("b", Some(json!({"limit": 5}))).await.unwrap();
    assert_eq!(result.findings, Findings::Custom(json!({"limit": 5})));

    let audits = audit_rows(&store).await;
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].agent, "b");
    assert_eq!(audits[0].action, "b ok");
    assert_eq!(audits[0].entity_type, "scripted");
    let meta = audits[0].metadata.as_ref().unwrap();
    assert_eq!(meta["trigger"], "manual");
    assert_eq!(meta["recommendations"], json!(["keep going"]));

    let status = orch.registry().status().unwrap();
    assert_eq!(status[0].last_run_at, None);
    assert_eq!(status[1].last_outcome, Some(Outcome::Success));
}

#[tokio::test]
async fn run_one_unknown_agent_writes_nothing() {
    let (orch, store) = orchestrator(vec![("a", Behaviour::Succeed)]);

    let err = orch.run_one("nonexistent", None).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::NotFound(ref n) if n == "nonexistent"));
    assert_eq!(store.count(Table::AgentActions), 0);
}

#[tokio::test]
async fn empty_registry_yields_empty_batch() {
    let (orch, store) = orchestrator(vec![]);

    let batch = orch.run_all().await.unwrap();
    assert!(batch.is_empty());
    assert_eq!(serde_json::to_value(&batch).unwrap(), json!([]));
    assert_eq!(store.count(Table::AgentActions), 0);
}

#[tokio::test]
async fn audit_failure_does_not_change_outcome() {
    let registry = Registry::new();
    registry.register("a", Scripted::new(Behaviour::Succeed)).unwrap();
    registry.register("b", Scripted::new(Behaviour::Succeed)).unwrap();
    let store = Arc::new(BrokenAuditStore {
        inner: InMemoryDataStore::new(),
    });
    let orch = Orchestrator::new(Arc::new(registry), store);

    let result = orch.run_one("a", None).await.unwrap();
    assert_eq!(result.outcome, Outcome::Success);

    let batch = orch.run_all().await.unwrap();
    assert_eq!(batch.succeeded(), 2);
}

#[tokio::test]
async fn panicking_unit_is_contained() {
    let (orch, store) = orchestrator(vec![
        ("boom", Behaviour::Panic),
        ("after", Behaviour::Succeed),
    ]);

    let batch = orch.run_all().await.unwrap();
    assert!(matches!(&batch.entries[0].status, BatchStatus::Failed { error } if error.contains("scripted exploded")));
    assert!(batch.entries[1].is_success());
    assert_eq!(store.count(Table::AgentActions), 2);
}

#[tokio::test(start_paused = true)]
async fn hung_unit_times_out_when_configured() {
    let registry = Registry::new();
    registry.register("slow", Scripted::new(Behaviour::Hang)).unwrap();
    registry.register("fast", Scripted::new(Behaviour::Succeed)).unwrap();
    let store = Arc::new(InMemoryDataStore::new());
    let orch = Orchestrator::new(Arc::new(registry), store.clone()).with_config(OrchestratorConfig {
        unit_timeout: Some(Duration::from_secs(5)),
    });

    let batch = orch.run_all().await.unwrap();
    assert!(matches!(&batch.entries[0].status, BatchStatus::Failed { error } if error.contains("timed out")));
    assert!(batch.entries[1].is_success());
    assert_eq!(store.count(Table::AgentActions), 2);
}

#[tokio::test]
async fn rerunning_is_not_deduplicated() {
    let scripted = Scripted::new(Behaviour::Succeed);
    let calls = Arc::clone(&scripted.calls);
    let registry = Registry::new();
    registry.register("a", scripted).unwrap();
    let store = Arc::new(InMemoryDataStore::new());
    let orch = Orchestrator::new(Arc::new(registry), store.clone());

    orch.run_one("a", None).await.unwrap();
    orch.run_all().await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.count(Table::AgentActions), 2);
}

#[tokio::test(start_paused = true)]
async fn dropped_caller_still_gets_an_audit_record() {
    let scripted = Scripted::new(Behaviour::SlowWrite);
    let calls = Arc::clone(&scripted.calls);
    let registry = Registry::new();
    registry.register("a", scripted).unwrap();
    let store = Arc::new(InMemoryDataStore::new());
    let orch = Orchestrator::new(Arc::new(registry), store.clone());

    let abandoned = tokio::time::timeout(Duration::from_millis(50), orch.run_one("a", None)).await;
    assert!(abandoned.is_err());
    assert_eq!(store.count(Table::AgentActions), 0);

    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.count(Table::RiskFindings), 1);
    let audits = audit_rows(&store).await;
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].agent, "a");
    assert_eq!(audits[0].outcome, Outcome::Success);
    assert_eq!(orch.registry().status().unwrap()[0].last_outcome, Some(Outcome::Success));
}

#[tokio::test]
async fn completed_at_is_stamped_after_the_unit_finishes() {
    let (orch, _store) = orchestrator(vec![("slow", Behaviour::SlowWrite)]);

    let before = chrono::Utc::now();
    let result = orch.run_one("slow", None).await.unwrap();

    assert!(result.completed_at - before >= chrono::Duration::milliseconds(200));
    assert!(result.completed_at <= chrono::Utc::now());
}

#[tokio::test]
async fn failing_narrator_leaves_result_without_narrative() {
    let registry = Registry::new();
    registry.register("a", Scripted::new(Behaviour::Succeed)).unwrap();
    let store = Arc::new(InMemoryDataStore::new());
    let orch = Orchestrator::new(Arc::new(registry), store.clone())
        .with_narrator(Arc::new(FixedNarrator(Err(NarrativeError::Timeout))));

    let result = orch.run_one("a", None).await.unwrap();
    assert_eq!(result.outcome, Outcome::Success);
    assert_eq!(result.narrative, None);
    assert_eq!(audit_rows(&store).await[0].outcome, Outcome::Success);
}

#[tokio::test]
async fn working_narrator_fills_in_narrative() {
    let registry = Registry::new();
    registry.register("a", Scripted::new(Behaviour::Succeed)).unwrap();
    let orch = Orchestrator::new(Arc::new(registry), Arc::new(InMemoryDataStore::new()))
        .with_narrator(Arc::new(FixedNarrator(Ok("Vendors look healthy.".to_string()))));

    let result = orch.run_one("a", None).await.unwrap();
    assert_eq!(result.narrative.as_deref(), Some("Vendors look healthy."));

    let batch = orch.run_all().await.unwrap();
    assert!(matches!(
        &batch.entries[0].status,
        BatchStatus::Success { result } if result.narrative.as_deref() == Some("Vendors look healthy.")
    ));
}

fn behaviour() -> impl Strategy<Value = Behaviour> {
    prop_oneof![Just(Behaviour::Succeed), Just(Behaviour::Fail), Just(Behaviour::Panic)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn run_all_writes_one_audit_per_unit_in_registry_order(behaviours in proptest::collection::vec(behaviour(), 0..8)) {
        let names: Vec<String> = (0..behaviours.len()).map(|i| format!("unit-{i}")).collect();
        let units = names.iter().map(String::as_str).zip(behaviours.iter().copied()).collect();
        let (orch, store) = orchestrator(units);

        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let (batch, audits) = rt.block_on(async {
            let batch = orch.run_all().await.unwrap();
            (batch, audit_rows(&store).await)
        });

        let batch_names: Vec<_> = batch.iter().map(|e| e.name.clone()).collect();
        let audit_names: Vec<_> = audits.iter().map(|a| a.agent.clone()).collect();
        prop_assert_eq!(&batch_names, &names);
        prop_assert_eq!(&audit_names, &names);

        for (entry, b) in batch.iter().zip(&behaviours) {
            prop_assert_eq!(entry.is_success(), matches!(b, Behaviour::Succeed));
        }
    }
}
