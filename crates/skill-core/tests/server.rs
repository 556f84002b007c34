//! The HTTP listener against a recording backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;

use skill_core::backend::BackendError;
use skill_core::transact::TransactError;
use skill_core::{
    Entity, EventHandler, RequestContext, Skill, SkillBackend, SkillEvent, State, Status,
    Transactor,
};

#[derive(Default)]
struct NoopTransactor;

#[async_trait]
impl Transactor for NoopTransactor {
    async fn transact(&self, _entities: Vec<Entity>) -> Result<(), TransactError> {
        Ok(())
    }
}

#[derive(Default)]
struct RecordingBackend {
    statuses: Mutex<Vec<(String, Status)>>,
}

#[async_trait]
impl SkillBackend for RecordingBackend {
    fn transactor(&self, _event: &SkillEvent) -> Arc<dyn Transactor> {
        Arc::new(NoopTransactor)
    }

    fn http_client(&self) -> reqwest::Client {
        reqwest::Client::new()
    }

    async fn report_status(&self, event: &SkillEvent, status: &Status) -> Result<(), BackendError> {
        self.statuses
            .lock()
            .unwrap()
            .push((event.execution_id.clone(), status.clone()));
        Ok(())
    }
}

#[derive(Default)]
struct Counting {
    calls: AtomicUsize,
}

#[async_trait]
impl EventHandler for Counting {
    async fn handle(&self, ctx: RequestContext) -> Status {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Status::completed(format!("handled {}", ctx.event.name().unwrap_or_default()))
    }
}

struct Panicking;

#[async_trait]
impl EventHandler for Panicking {
    async fn handle(&self, _ctx: RequestContext) -> Status {
        panic!("boom");
    }
}

struct Answering;

#[async_trait]
impl EventHandler for Answering {
    async fn handle(&self, _ctx: RequestContext) -> Status {
        Status::completed("answered").with_sync_request(json!({"results": [1, 2]}))
    }
}

async fn serve(skill: Skill) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, skill.router()).await.unwrap();
    });
    format!("http://{addr}")
}

fn payload(context: serde_json::Value) -> serde_json::Value {
    json!({
        "executionId": "exec-7",
        "skill": {"namespace": "acme", "name": "policy", "version": "1.0.0"},
        "workspaceId": "W1",
        "context": context,
        "urls": {
            "execution": "http://localhost/executions/7",
            "transactions": "http://localhost/transactions/7",
            "query": "http://localhost/graphql"
        },
        "token": "t0ken"
    })
}

fn webhook(name: &str) -> serde_json::Value {
    payload(json!({"webhook": {"name": name, "body": "{}"}}))
}

struct Fixture {
    url: String,
    backend: Arc<RecordingBackend>,
    counting: Arc<Counting>,
}

async fn fixture() -> Fixture {
    let backend = Arc::new(RecordingBackend::default());
    let counting = Arc::new(Counting::default());
    let skill = Skill::new(backend.clone())
        .handler("on_push", counting.clone())
        .handler("explode", Arc::new(Panicking))
        .handler_for(["evaluate_goals_locally"], Arc::new(Answering));
    Fixture {
        url: serve(skill).await,
        backend,
        counting,
    }
}

#[tokio::test]
async fn undecodable_payload_is_accepted_and_ignored() {
    let f = fixture().await;
    let response = reqwest::Client::new()
        .post(&f.url)
        .body("{not edn, not json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(response.text().await.unwrap().is_empty());
    assert_eq!(f.counting.calls.load(Ordering::SeqCst), 0);
    assert!(f.backend.statuses.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unrouted_event_is_accepted_and_ignored() {
    let f = fixture().await;
    let response = reqwest::Client::new()
        .post(&f.url)
        .json(&webhook("on_tag"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(f.counting.calls.load(Ordering::SeqCst), 0);
    assert!(f.backend.statuses.lock().unwrap().is_empty());
}

#[tokio::test]
async fn routed_event_reports_status_before_responding() {
    let f = fixture().await;
    let response = reqwest::Client::new()
        .post(&f.url)
        .json(&webhook("on_push"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(f.counting.calls.load(Ordering::SeqCst), 1);

    let statuses = f.backend.statuses.lock().unwrap();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].0, "exec-7");
    assert_eq!(statuses[0].1.state, State::Completed);
    assert_eq!(statuses[0].1.reason, "handled on_push");
}

#[tokio::test]
async fn panicking_handler_reports_failure() {
    let f = fixture().await;
    let response = reqwest::Client::new()
        .post(&f.url)
        .json(&webhook("explode"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let statuses = f.backend.statuses.lock().unwrap();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].1.state, State::Failed);
    assert!(statuses[0].1.reason.contains("boom"));
}

#[tokio::test]
async fn sync_request_answers_with_body() {
    let f = fixture().await;
    let response = reqwest::Client::new()
        .post(&f.url)
        .json(&payload(json!({
            "syncRequest": {"name": "evaluate_goals_locally", "configurations": []}
        })))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, json!({"results": [1, 2]}));
    assert_eq!(f.backend.statuses.lock().unwrap()[0].1.state, State::Completed);
}
