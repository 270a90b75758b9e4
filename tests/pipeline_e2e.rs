//! End-to-end pipeline runs against real SQLite and mocked HTTP services.
//!
//! One mock server stands in for the key unwrap service, both providers and
//! Open-Meteo. Jobs are driven with [`Pipeline::drain`] so every test is
//! deterministic.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use plotwise::contract::{ActionType, CreateTask, Priority, TargetType};
use plotwise::credentials::{AUTH_TAG_LEN, EncryptedCredential, HttpKeyUnwrapper, IV_LEN};
use plotwise::llm::provider::ProviderRole;
use plotwise::photos::StoredPhotoSource;
use plotwise::pipeline::{TRIGGER_JOB, TriggerJob};
use plotwise::queue::{self, JobOptions, SqliteJobQueue};
use plotwise::store::{
    Garden, GardenStore, GeoPoint, SqliteGardenStore, TaskScope, TaskStatus, Zone,
};
use plotwise::weather::OpenMeteoClient;
use plotwise::{Pipeline, PipelineDeps, PlotwiseConfig};
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ANTHROPIC_KEY: &str = "sk-ant-e2e";
const OPENAI_KEY: &str = "sk-openai-e2e";

fn record(ciphertext: &[u8]) -> EncryptedCredential {
    EncryptedCredential::from_parts(ciphertext, &[7u8; IV_LEN], &[9u8; AUTH_TAG_LEN])
}

struct Harness {
    server: MockServer,
    store: Arc<SqliteGardenStore>,
    queue: Arc<SqliteJobQueue>,
    pipeline: Pipeline,
}

impl Harness {
    async fn new() -> Self {
        let server = MockServer::start().await;
        mount_unwrap(&server, b"anthropic", ANTHROPIC_KEY).await;
        mount_unwrap(&server, b"openai", OPENAI_KEY).await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "current": {"temperature_2m": 18.0, "relative_humidity_2m": 60.0},
                "daily": {
                    "time": ["2025-06-01"],
                    "temperature_2m_max": [22.0],
                    "temperature_2m_min": [11.0],
                    "precipitation_sum": [0.0]
                }
            })))
            .mount(&server)
            .await;

        let mut config = PlotwiseConfig::default();
        config.providers.primary.base_url = server.uri();
        config.providers.fallback.base_url = server.uri();
        config.weather.base_url = server.uri();
        config.credentials.unwrap_url = format!("{}/unwrap", server.uri());

        let store = Arc::new(SqliteGardenStore::open_in_memory().unwrap());
        let queue = Arc::new(SqliteJobQueue::connect_in_memory().unwrap());
        seed(&store);

        let deps = PipelineDeps {
            store: store.clone(),
            queue: queue.clone(),
            providers: config.providers(),
            unwrapper: Arc::new(HttpKeyUnwrapper::new(
                config.credentials.unwrap_url.clone(),
                None,
            )),
            weather: Arc::new(OpenMeteoClient::new(config.weather.base_url.clone())),
            photos: Arc::new(StoredPhotoSource::new(store.clone(), "https://photos.example")),
        };
        let pipeline = Pipeline::new(deps, config.pipeline_settings());
        Self {
            server,
            store,
            queue,
            pipeline,
        }
    }

    async fn trigger(&self) {
        queue::send(
            self.queue.as_ref(),
            TRIGGER_JOB,
            &TriggerJob { slot: None },
            JobOptions::no_retry(),
        )
        .await
        .unwrap();
    }
}

async fn mount_unwrap(server: &MockServer, ciphertext: &[u8], plaintext: &str) {
    Mock::given(method("POST"))
        .and(path("/unwrap"))
        .and(body_partial_json(json!({"ciphertext": record(ciphertext).ciphertext})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"plaintext": plaintext})))
        .mount(server)
        .await;
}

fn seed(store: &SqliteGardenStore) {
    store
        .insert_garden(&Garden {
            id: "g1".into(),
            user_id: "u1".into(),
            name: "Allotment".into(),
            location: Some(GeoPoint { lat: 51.5, lng: -0.1 }),
            hardiness_zone: Some("8b".into()),
        })
        .unwrap();
    store
        .insert_zone(&Zone {
            id: "z1".into(),
            garden_id: "g1".into(),
            name: "Raised bed".into(),
            soil_type: Some("loam".into()),
            sun_exposure: Some("full sun".into()),
            notes: None,
        })
        .unwrap();
}

fn analysis_output(close_task: &str) -> Value {
    json!({
        "operations": [
            {
                "op": "create",
                "targetType": "zone",
                "targetId": "z1",
                "actionType": "water",
                "priority": "today",
                "label": "Deep water the bed",
                "suggestedDate": "2025-06-02",
                "context": "No rain forecast this week"
            },
            {"op": "complete", "taskId": close_task, "reason": "Mulch visible in photos"}
        ],
        "observations": "Soil looks dry on the surface"
    })
}

fn anthropic_reply(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "content": [{"type": "text", "text": text}],
        "usage": {"input_tokens": 900, "output_tokens": 140}
    }))
}

fn openai_reply(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{"index": 0, "message": {"role": "assistant", "content": text}}],
        "usage": {"prompt_tokens": 800, "completion_tokens": 120}
    }))
}

async fn existing_task(store: &SqliteGardenStore) -> String {
    let create = CreateTask {
        target_type: TargetType::Zone,
        target_id: "z1".into(),
        action_type: ActionType::Other,
        priority: Priority::Upcoming,
        label: "Mulch the bed".into(),
        suggested_date: NaiveDate::from_ymd_opt(2025, 5, 30).unwrap(),
        context: None,
        recurrence: None,
        request_photo: None,
    };
    store
        .insert_task(&TaskScope::new("g1", "z1"), &create, None, Utc::now())
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn daily_run_analyzes_zone_with_primary_provider() {
    let h = Harness::new().await;
    h.store
        .put_provider_credential("u1", ProviderRole::Primary, &record(b"anthropic"))
        .unwrap();
    let mulch = existing_task(&h.store).await;

    let fenced = format!("```json\n{}\n```", analysis_output(&mulch));
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", ANTHROPIC_KEY))
        .respond_with(anthropic_reply(&fenced))
        .expect(1)
        .mount(&h.server)
        .await;

    h.trigger().await;
    let report = h.pipeline.drain().await.unwrap();
    assert_eq!(report.completed, 3, "trigger, garden and zone jobs");
    assert_eq!(report.failed + report.retried, 0);

    let audits = h.store.recent_analyses("g1", 10).await.unwrap();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].provider, ProviderRole::Primary);
    assert_eq!(audits[0].input_tokens, 900);
    assert_eq!(audits[0].result.operations.len(), 2);

    let pending = h.store.pending_tasks("z1").await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].label, "Deep water the bed");
    assert_eq!(pending[0].analysis_id.as_deref(), Some(audits[0].id.as_str()));

    let closed = h.store.task(&mulch).await.unwrap().unwrap();
    assert_eq!(closed.status, TaskStatus::Completed);
    assert_eq!(closed.context.as_deref(), Some("Mulch visible in photos"));

    assert!(h.store.cached_weather("g1").await.unwrap().is_some());
    assert!(!h.pipeline.service().analysis_status("g1").await.unwrap().is_running());
}

#[tokio::test]
async fn fallback_provider_is_used_and_recorded() {
    let h = Harness::new().await;
    h.store
        .put_provider_credential("u1", ProviderRole::Fallback, &record(b"openai"))
        .unwrap();
    let mulch = existing_task(&h.store).await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", format!("Bearer {OPENAI_KEY}").as_str()))
        .respond_with(openai_reply(&analysis_output(&mulch).to_string()))
        .expect(1)
        .mount(&h.server)
        .await;

    h.pipeline.service().trigger_analysis("g1").await.unwrap();
    let report = h.pipeline.drain().await.unwrap();
    assert_eq!(report.completed, 2, "garden and zone jobs");

    let audits = h.pipeline.service().recent_analyses("g1", 5).await.unwrap();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].provider, ProviderRole::Fallback);
    assert_eq!(audits[0].model_used, "gpt-4o");
    assert_eq!(audits[0].output_tokens, 120);
}

#[tokio::test]
async fn empty_provider_response_leaves_zone_job_for_retry() {
    let h = Harness::new().await;
    h.store
        .put_provider_credential("u1", ProviderRole::Primary, &record(b"anthropic"))
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [],
            "usage": {"input_tokens": 900, "output_tokens": 0}
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    h.trigger().await;
    let report = h.pipeline.drain().await.unwrap();
    assert_eq!(report.completed, 2);
    assert_eq!(report.retried, 1);

    let status = h.pipeline.service().analysis_status("g1").await.unwrap();
    assert_eq!(status.zone_jobs, 1, "zone job waits out its retry delay");
    assert!(h.store.recent_analyses("g1", 5).await.unwrap().is_empty());
    assert!(h.store.pending_tasks("z1").await.unwrap().is_empty());
}

#[tokio::test]
async fn rejected_provider_key_fails_zone_job_without_retry() {
    let h = Harness::new().await;
    h.store
        .put_provider_credential("u1", ProviderRole::Primary, &record(b"anthropic"))
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "type": "error",
            "error": {"type": "authentication_error", "message": "invalid x-api-key"}
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    h.trigger().await;
    let report = h.pipeline.drain().await.unwrap();
    assert_eq!(report.completed, 2, "trigger and garden jobs");
    assert_eq!(report.retried, 0);
    assert_eq!(report.failed, 1);

    let status = h.pipeline.service().analysis_status("g1").await.unwrap();
    assert_eq!(status.zone_jobs, 0, "nothing left to retry");
    assert!(h.store.recent_analyses("g1", 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn zone_without_credentials_is_skipped() {
    let h = Harness::new().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&h.server)
        .await;

    h.trigger().await;
    let report = h.pipeline.drain().await.unwrap();
    assert_eq!(report.completed, 3);
    assert!(h.store.recent_analyses("g1", 5).await.unwrap().is_empty());
}
