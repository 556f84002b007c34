//! Outbound HTTP clients against an in-process scripted server.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State as AxumState;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::Router;
use serde_json::json;

use skill_core::datasource::DataSourceError;
use skill_core::event::Urls;
use skill_core::policy::EvaluationStorage;
use skill_core::transact::TransactError;
use skill_core::{
    AsyncQueryClient, AsyncQueryError, AsyncQueryRequest, AsyncQuerySubmitter, BackendError,
    DataSource, Entity, GoalEvaluationQueryResult, GraphqlDataSource, HttpBackend,
    HttpTransactor, ObjectEvaluationStorage, QueryResponse, QueryTarget, SkillBackend,
    SkillEvent, Status, StorageId, Transactor, Value, ValueMap, Variables,
};
use skill_state::{FsObjectStore, PutOutcome};

#[derive(Debug, Clone)]
struct Captured {
    method: Method,
    path: String,
    auth: Option<String>,
    body: serde_json::Value,
}

#[derive(Default)]
struct Script {
    requests: Mutex<Vec<Captured>>,
    responses: Mutex<VecDeque<(StatusCode, String)>>,
}

impl Script {
    fn requests(&self) -> Vec<Captured> {
        self.requests.lock().unwrap().clone()
    }
}

async fn record(
    AxumState(script): AxumState<Arc<Script>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    script.requests.lock().unwrap().push(Captured {
        method,
        path: uri.path().to_string(),
        auth: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null),
    });
    script
        .responses
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or((StatusCode::OK, "{}".to_string()))
}

/// Serve scripted responses in order; `200 {}` once the script runs out.
async fn scripted(responses: Vec<(u16, &str)>) -> (String, Arc<Script>) {
    let script = Arc::new(Script {
        requests: Mutex::new(Vec::new()),
        responses: Mutex::new(
            responses
                .into_iter()
                .map(|(code, body)| (StatusCode::from_u16(code).unwrap(), body.to_string()))
                .collect(),
        ),
    });
    let app = Router::new().fallback(record).with_state(script.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), script)
}

fn graphql(base: &str) -> GraphqlDataSource {
    GraphqlDataSource::new(
        reqwest::Client::new(),
        QueryTarget::new(&format!("{base}/graphql"), "t0ken"),
    )
    .with_retry_backoff(Duration::from_millis(10))
}

#[tokio::test]
async fn graphql_retries_once_after_server_error() {
    let (base, script) = scripted(vec![
        (500, "overloaded"),
        (200, r#"{"data": {"packages": ["pkg:npm/a@1"]}}"#),
    ])
    .await;

    let mut vars = Variables::new();
    vars.insert("digest".to_string(), Value::from("sha256:abc"));
    let answer = graphql(&base)
        .query("packages", "query Packages { packages }", &vars)
        .await
        .unwrap();

    assert_eq!(
        answer,
        Some(QueryResponse::Data(Value::from(
            json!({"packages": ["pkg:npm/a@1"]})
        )))
    );

    let requests = script.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].path, "/graphql");
    assert_eq!(requests[0].auth.as_deref(), Some("Bearer t0ken"));
    assert_eq!(requests[1].body["variables"]["digest"], "sha256:abc");
}

#[tokio::test]
async fn graphql_gives_up_after_second_server_error() {
    let (base, script) = scripted(vec![(503, "down"), (503, "still down")]).await;

    let err = graphql(&base)
        .query("packages", "query { packages }", &Variables::new())
        .await
        .unwrap_err();

    match err {
        DataSourceError::QueryFailed { status, body, .. } => {
            assert_eq!(status, 503);
            assert_eq!(body, "still down");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(script.requests().len(), 2);
}

#[tokio::test]
async fn graphql_client_errors_are_not_retried() {
    let (base, script) = scripted(vec![(401, "unauthorized")]).await;

    let err = graphql(&base)
        .query("packages", "query { packages }", &Variables::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DataSourceError::QueryFailed { status: 401, .. }));
    assert_eq!(script.requests().len(), 1);
}

#[tokio::test]
async fn graphql_errors_surface_and_transient_ones_retry() {
    let (base, _) = scripted(vec![
        (200, r#"{"errors": [{"message": "Cannot query field"}]}"#),
        (
            200,
            r#"{"data": null, "errors": [{"message": "An unexpected error has occurred"}]}"#,
        ),
    ])
    .await;
    let source = graphql(&base);

    let err = source
        .query("packages", "query { nope }", &Variables::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DataSourceError::GraphqlErrors { .. }));
    assert!(!err.is_retryable());

    let err = source
        .query("packages", "query { packages }", &Variables::new())
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn enqueue_posts_envelope_to_enqueue_url() {
    let (base, script) = scripted(vec![(202, "")]).await;
    let target = QueryTarget::new(&format!("{base}/graphql"), "t0ken");

    let mut vars = Variables::new();
    vars.insert("digest".to_string(), Value::from("sha256:abc"));
    let request = AsyncQueryRequest::new(
        "packages",
        "query Packages { packages }",
        &vars,
        "opaque-token".to_string(),
    );
    AsyncQueryClient::default()
        .submit(&target, &request)
        .await
        .unwrap();

    let requests = script.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::POST);
    assert_eq!(requests[0].path, "/graphql:enqueue");
    assert_eq!(requests[0].auth.as_deref(), Some("Bearer t0ken"));
    assert_eq!(
        requests[0].body,
        json!({
            "name": "async-query-packages",
            "body": {
                "query": "query Packages { packages }",
                "variables": {"digest": "sha256:abc"}
            },
            "metadata": "opaque-token"
        })
    );
}

#[tokio::test]
async fn enqueue_failures_split_into_rejected_and_retryable() {
    let (base, _) = scripted(vec![
        (400, "invalid query"),
        (500, r#"{"errors": [{"message": "An unexpected error has occurred"}]}"#),
    ])
    .await;
    let target = QueryTarget::new(&format!("{base}/graphql"), "t0ken");
    let request = AsyncQueryRequest::new("packages", "query { p }", &Variables::new(), String::new());
    let client = AsyncQueryClient::default();

    let err = client.submit(&target, &request).await.unwrap_err();
    assert!(matches!(err, AsyncQueryError::Rejected { status: 400, .. }));
    assert!(!err.is_retryable());

    let err = client.submit(&target, &request).await.unwrap_err();
    assert!(matches!(err, AsyncQueryError::Retryable { status: 500, .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn transactor_posts_entities_envelope() {
    let (base, script) = scripted(vec![(200, "{}"), (403, "forbidden")]).await;
    let transactor = HttpTransactor::new(
        reqwest::Client::new(),
        &format!("{base}/transactions/7"),
        "t0ken",
    );

    let entity = Entity::new("goal-evaluation-result", "e-1")
        .with_attribute("subject", Value::from("sha256:abc"))
        .with_attribute("deviationCount", Value::from(json!(2)));
    transactor.transact(vec![entity.clone()]).await.unwrap();

    let requests = script.requests();
    assert_eq!(requests[0].path, "/transactions/7");
    assert_eq!(requests[0].auth.as_deref(), Some("Bearer t0ken"));
    assert_eq!(
        requests[0].body,
        json!({"entities": [{
            "type": "goal-evaluation-result",
            "id": "e-1",
            "attributes": {"deviationCount": 2, "subject": "sha256:abc"}
        }]})
    );

    let err = transactor.transact(vec![entity]).await.unwrap_err();
    assert!(matches!(err, TransactError::Rejected { status: 403, .. }));
}

#[tokio::test]
async fn backend_patches_status_to_execution_url() {
    let (base, script) = scripted(vec![(204, ""), (500, "nope")]).await;
    let event = SkillEvent {
        execution_id: "exec-7".to_string(),
        workspace_id: "W1".to_string(),
        urls: Urls {
            execution: format!("{base}/executions/7"),
            transactions: format!("{base}/transactions/7"),
            query: format!("{base}/graphql"),
            ..Default::default()
        },
        token: "t0ken".to_string(),
        ..Default::default()
    };
    let backend = HttpBackend::default();

    backend
        .report_status(&event, &Status::completed("2 deviations recorded"))
        .await
        .unwrap();

    let requests = script.requests();
    assert_eq!(requests[0].method, Method::PATCH);
    assert_eq!(requests[0].path, "/executions/7");
    assert_eq!(requests[0].auth.as_deref(), Some("Bearer t0ken"));
    assert_eq!(
        requests[0].body,
        json!({"state": "completed", "reason": "2 deviations recorded"})
    );

    let err = backend
        .report_status(&event, &Status::failed("boom"))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Rejected { status: 500, .. }));
}

#[tokio::test]
async fn evaluation_storage_on_disk_is_write_once() {
    let dir = tempfile::tempdir().unwrap();
    let storage = ObjectEvaluationStorage::new(FsObjectStore::new(dir.path()).unwrap());

    let mut details = ValueMap::new();
    details.insert("purl".to_string(), Value::from("pkg:npm/a@1"));
    let first = vec![GoalEvaluationQueryResult::new(details)];
    let id = StorageId::Hash("ab".repeat(32));

    assert_eq!(storage.store(&first, &id).await.unwrap(), PutOutcome::Created);
    assert_eq!(
        storage.store(&[], &id).await.unwrap(),
        PutOutcome::AlreadyExists
    );
    assert_eq!(storage.retrieve(&id).await.unwrap(), first);

    assert!(storage.store(&first, &StorageId::NoData).await.is_err());
}
