use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Value as JsonValue, json};

use opspilot_agents::{AgentContext, AgentError, AnalysisResult, AnalysisUnit, Orchestrator, Registry};
use opspilot_api::app::{AppServices, build_app};
use opspilot_core::InMemoryDataStore;
use opspilot_infra::{Scheduler, seed_demo_data};

struct AlwaysFails;

#[async_trait]
impl AnalysisUnit for AlwaysFails {
    fn entity_type(&self) -> &'static str {
        "always-fails"
    }

    fn description(&self) -> &'static str {
        "always fails"
    }

    async fn execute(&self, _ctx: &AgentContext) -> Result<AnalysisResult, AgentError> {
        Err(AgentError::analysis("db timeout"))
    }
}

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

async fn seeded_orchestrator(registry: Registry) -> Arc<Orchestrator> {
    let store = Arc::new(InMemoryDataStore::new());
    seed_demo_data(store.as_ref()).await.expect("failed to seed");
    Arc::new(Orchestrator::new(Arc::new(registry), store))
}

impl TestServer {
    async fn spawn(registry: Registry) -> Self {
        Self::spawn_services(AppServices::new(seeded_orchestrator(registry).await)).await
    }

    async fn spawn_services(services: AppServices) -> Self {
        // Same router as prod, bound to an ephemeral port.
        let app = build_app(Arc::new(services));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    async fn with_default_units() -> Self {
        Self::spawn(Registry::with_default_units().unwrap()).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn post(srv: &TestServer, path: &str, body: Option<JsonValue>) -> (StatusCode, JsonValue) {
    let client = reqwest::Client::new();
    let mut req = client.post(format!("{}{}", srv.base_url, path));
    if let Some(body) = body {
        req = req.json(&body);
    }
    let res = req.send().await.unwrap();
    let status = res.status();
    (status, res.json().await.unwrap())
}

async fn get(srv: &TestServer, path: &str) -> (StatusCode, JsonValue) {
    let res = reqwest::get(format!("{}{}", srv.base_url, path)).await.unwrap();
    let status = res.status();
    (status, res.json().await.unwrap())
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::with_default_units().await;
    let res = reqwest::get(format!("{}/health", srv.base_url)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn status_lists_registered_agents_in_order() {
    let srv = TestServer::with_default_units().await;

    let (status, body) = get(&srv, "/agents/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["timestamp"].is_string());

    let agents = body["data"].as_array().unwrap();
    let names: Vec<_> = agents.iter().map(|a| a["name"].as_str().unwrap()).collect();
    assert_eq!(
        names,
        vec![
            "vendor-monitor",
            "invoice-validator",
            "shipment-tracker",
            "customs-compliance",
            "esg-risk",
            "procurement"
        ]
    );
    assert!(agents.iter().all(|a| a["state"] == "active" && a["last_run_at"].is_null()));
}

#[tokio::test]
async fn run_agent_returns_result_and_records_action() {
    let srv = TestServer::with_default_units().await;

    let (status, body) = post(&srv, "/agents/run/vendor-monitor", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["agent"], "vendor-monitor");
    assert_eq!(body["data"]["findings"]["kind"], "vendor_performance");
    assert_eq!(body["data"]["findings"]["data"]["total_vendors"], 5);

    let (_, actions) = get(&srv, "/agents/actions?limit=5").await;
    let actions = actions["data"].as_array().unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0]["agent"], "vendor-monitor");
    assert_eq!(actions[0]["entity_type"], "vendor");
    assert_eq!(actions[0]["metadata"]["trigger"], "manual");

    let (_, status_body) = get(&srv, "/agents/status").await;
    assert!(status_body["data"][0]["last_run_at"].is_string());
}

#[tokio::test]
async fn run_agent_passes_input_through() {
    let srv = TestServer::with_default_units().await;

    let (status, body) = post(&srv, "/agents/run/invoice-validator", Some(json!({"data": {"limit": 2}}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["findings"]["data"]["total_invoices"], 2);

    let (status, body) = post(&srv, "/agents/run/invoice-validator", Some(json!({"data": {"limit": 0}}))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "unit_execution_failed");
}

#[tokio::test]
async fn unknown_agent_is_404_and_not_audited() {
    let srv = TestServer::with_default_units().await;

    let (status, body) = post(&srv, "/agents/run/nonexistent", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "agent_not_found");

    let (_, actions) = get(&srv, "/agents/actions").await;
    assert_eq!(actions["data"], json!([]));
}

#[tokio::test]
async fn failing_agent_is_500_with_message() {
    let registry = Registry::new();
    registry.register("vendor-monitor", AlwaysFails).unwrap();
    let srv = TestServer::spawn(registry).await;

    let (status, body) = post(&srv, "/agents/run/vendor-monitor", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "unit_execution_failed");
    assert!(body["message"].as_str().unwrap().contains("db timeout"));

    let (_, actions) = get(&srv, "/agents/actions").await;
    assert_eq!(actions["data"][0]["outcome"], "failed");
}

#[tokio::test]
async fn run_all_returns_ordered_batch() {
    let registry = Registry::with_default_units().unwrap();
    registry.register("broken", AlwaysFails).unwrap();
    let srv = TestServer::spawn(registry).await;

    let (status, body) = post(&srv, "/agents/run-all", None).await;
    assert_eq!(status, StatusCode::OK);

    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 7);
    assert_eq!(entries[0]["name"], "vendor-monitor");
    assert!(entries[..6].iter().all(|e| e["status"] == "success"));
    assert_eq!(entries[6], json!({"name": "broken", "status": "failed", "error": "db timeout"}));

    let (_, actions) = get(&srv, "/agents/actions?limit=50").await;
    assert_eq!(actions["data"].as_array().unwrap().len(), 7);
}

#[tokio::test]
async fn schedule_trigger_runs_a_background_pass() {
    let orchestrator = seeded_orchestrator(Registry::with_default_units().unwrap()).await;
    let scheduler = Scheduler::new(Duration::from_secs(3600)).spawn(Arc::clone(&orchestrator));
    let services = AppServices::new(orchestrator).with_scheduler_trigger(scheduler.trigger_handle());
    let srv = TestServer::spawn_services(services).await;

    let (status, body) = post(&srv, "/agents/schedule/trigger", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["request"], "queued");

    for _ in 0..100 {
        if scheduler.passes() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(scheduler.passes(), 1);

    let (_, actions) = get(&srv, "/agents/actions?limit=50").await;
    let actions = actions["data"].as_array().unwrap();
    assert_eq!(actions.len(), 6);
    assert!(actions.iter().all(|a| a["metadata"]["trigger"] == "batch"));

    scheduler.shutdown().await;
}

#[tokio::test]
async fn schedule_trigger_without_scheduler_is_503() {
    let srv = TestServer::with_default_units().await;

    let (status, body) = post(&srv, "/agents/schedule/trigger", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "scheduler_disabled");
}
