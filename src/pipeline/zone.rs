//! Zone job: provider selection, analysis, audit, reconciliation.
//!
//! Everything before reconciliation propagates its error so the queue
//! retries the job. A missing credential or a zone deleted since fan-out
//! completes the job without work.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use super::jobs::ZoneJob;
use super::selection::select_provider;
use crate::context::{ContextBuilder, ContextError};
use crate::credentials::KeyUnwrapper;
use crate::llm::Providers;
use crate::queue::{Job, JobHandler};
use crate::reconcile::{ReconcileReport, reconcile};
use crate::store::{AnalysisScope, GardenStore, NewAnalysisRecord, TaskScope};

/// Runs one zone analysis end to end.
pub struct ZoneHandler {
    store: Arc<dyn GardenStore>,
    providers: Providers,
    unwrapper: Arc<dyn KeyUnwrapper>,
    context: ContextBuilder,
}

/// What a zone job did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneOutcome {
    /// No provider credential for the garden owner.
    NoCredential,
    /// Garden or zone disappeared after fan-out.
    ZoneMissing,
    Analyzed {
        analysis_id: String,
        report: ReconcileReport,
    },
}

impl ZoneHandler {
    pub fn new(
        store: Arc<dyn GardenStore>,
        providers: Providers,
        unwrapper: Arc<dyn KeyUnwrapper>,
        context: ContextBuilder,
    ) -> Self {
        Self {
            store,
            providers,
            unwrapper,
            context,
        }
    }

    /// Analyze one zone and reconcile its tasks.
    pub async fn run(&self, job: &ZoneJob) -> crate::Result<ZoneOutcome> {
        let Some(selection) = select_provider(self.store.as_ref(), &job.user_id).await? else {
            info!(
                garden_id = %job.garden_id,
                zone_id = %job.zone_id,
                "no provider credential; skipping zone"
            );
            return Ok(ZoneOutcome::NoCredential);
        };

        let now = Utc::now();
        let context = match self
            .context
            .build(&job.garden_id, &job.zone_id, &job.user_id, job.weather.clone(), now)
            .await
        {
            Ok(context) => context,
            Err(e @ (ContextError::GardenNotFound(_) | ContextError::ZoneNotFound { .. })) => {
                warn!(error = %e, "zone vanished since fan-out; skipping");
                return Ok(ZoneOutcome::ZoneMissing);
            }
            Err(e) => return Err(e.into()),
        };

        let credential = self.unwrapper.unwrap_key(&selection.credential).await?;
        let adapter = self.providers.get(selection.role);
        let (result, usage) = adapter.analyze(&context, &credential).await?;

        let record = self
            .store
            .insert_analysis(
                &NewAnalysisRecord {
                    garden_id: job.garden_id.clone(),
                    zone_id: job.zone_id.clone(),
                    user_id: job.user_id.clone(),
                    scope: AnalysisScope::Zone,
                    provider: selection.role,
                    model_used: adapter.model().to_owned(),
                    input_tokens: usage.input_tokens,
                    output_tokens: usage.output_tokens,
                    result,
                },
                now,
            )
            .await?;
        info!(
            analysis_id = %record.id,
            provider = %selection.role,
            model = %record.model_used,
            operations = record.result.operations.len(),
            "analysis recorded"
        );

        let scope = TaskScope::new(&job.garden_id, &job.zone_id);
        let report = reconcile(
            self.store.as_ref(),
            &scope,
            &record.id,
            &record.result.operations,
            Utc::now(),
        )
        .await;

        Ok(ZoneOutcome::Analyzed {
            analysis_id: record.id,
            report,
        })
    }
}

#[async_trait]
impl JobHandler for ZoneHandler {
    async fn handle(&self, job: &Job) -> crate::Result<()> {
        let payload: ZoneJob = job.payload()?;
        self.run(&payload).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::context::{AnalysisContext, ContextSettings};
    use crate::contract::{
        ActionType, AnalysisResult, CreateTask, Operation, Priority, TargetType,
    };
    use crate::credentials::{CredentialError, EncryptedCredential};
    use crate::error::PlotwiseError;
    use crate::llm::{
        AnalysisError, ChatReply, ChatRequest, ChatStream, Credential, ProviderAdapter,
        ProviderRole, TokenUsage,
    };
    use crate::photos::StoredPhotoSource;
    use crate::store::{Garden, SqliteGardenStore, TaskStatus, Zone};
    use chrono::NaiveDate;
    use std::sync::Mutex;

    /// Returns a fixed result, or an empty-response error when `result` is None.
    struct ScriptedAdapter {
        name: &'static str,
        result: Option<AnalysisResult>,
        seen_keys: Mutex<Vec<String>>,
    }

    impl ScriptedAdapter {
        fn new(name: &'static str, result: Option<AnalysisResult>) -> Arc<Self> {
            Arc::new(Self {
                name,
                result,
                seen_keys: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedAdapter {
        fn name(&self) -> &str {
            self.name
        }

        fn model(&self) -> &str {
            "scripted-model"
        }

        async fn analyze(
            &self,
            _context: &AnalysisContext,
            credential: &Credential,
        ) -> Result<(AnalysisResult, TokenUsage), AnalysisError> {
            self.seen_keys.lock().unwrap().push(credential.expose().to_owned());
            match &self.result {
                Some(result) => Ok((result.clone(), TokenUsage::new(120, 30))),
                None => Err(AnalysisError::ProviderEmptyResponse(self.name.to_owned())),
            }
        }

        async fn chat(
            &self,
            _request: &ChatRequest,
            _credential: &Credential,
        ) -> Result<ChatReply, AnalysisError> {
            unreachable!("zone jobs never chat")
        }

        async fn chat_stream(
            &self,
            _request: &ChatRequest,
            _credential: &Credential,
        ) -> Result<ChatStream, AnalysisError> {
            unreachable!("zone jobs never stream")
        }
    }

    /// Treats the ciphertext bytes as the plaintext key.
    struct EchoUnwrapper;

    #[async_trait]
    impl KeyUnwrapper for EchoUnwrapper {
        async fn unwrap_key(
            &self,
            record: &EncryptedCredential,
        ) -> Result<Credential, CredentialError> {
            Ok(Credential::new(format!("key-{}", record.ciphertext)))
        }
    }

    fn one_create() -> AnalysisResult {
        AnalysisResult {
            operations: vec![Operation::Create(CreateTask {
                target_type: TargetType::Zone,
                target_id: "z1".into(),
                action_type: ActionType::Monitor,
                priority: Priority::Upcoming,
                label: "Check for slugs".into(),
                suggested_date: NaiveDate::from_ymd_opt(2025, 6, 3).unwrap(),
                context: None,
                recurrence: None,
                request_photo: None,
            })],
            observations: Some("Leaves look healthy".into()),
            alerts: Vec::new(),
        }
    }

    struct Fixture {
        store: Arc<SqliteGardenStore>,
        primary: Arc<ScriptedAdapter>,
        fallback: Arc<ScriptedAdapter>,
        handler: ZoneHandler,
    }

    fn fixture(primary: Option<AnalysisResult>, fallback: Option<AnalysisResult>) -> Fixture {
        let store = Arc::new(SqliteGardenStore::open_in_memory().unwrap());
        store
            .insert_garden(&Garden {
                id: "g1".into(),
                user_id: "u1".into(),
                name: "Patio".into(),
                location: None,
                hardiness_zone: None,
            })
            .unwrap();
        store
            .insert_zone(&Zone {
                id: "z1".into(),
                garden_id: "g1".into(),
                name: "Herb pots".into(),
                soil_type: Some("potting mix".into()),
                sun_exposure: Some("full sun".into()),
                notes: None,
            })
            .unwrap();

        let primary = ScriptedAdapter::new("primary", primary);
        let fallback = ScriptedAdapter::new("fallback", fallback);
        let dyn_store: Arc<dyn GardenStore> = store.clone();
        let photos = Arc::new(StoredPhotoSource::new(
            Arc::clone(&dyn_store),
            "https://photos.example",
        ));
        let handler = ZoneHandler::new(
            Arc::clone(&dyn_store),
            Providers::new(primary.clone(), fallback.clone()),
            Arc::new(EchoUnwrapper),
            ContextBuilder::new(dyn_store, photos, ContextSettings::default()),
        );
        Fixture {
            store,
            primary,
            fallback,
            handler,
        }
    }

    fn job() -> ZoneJob {
        ZoneJob {
            garden_id: "g1".into(),
            zone_id: "z1".into(),
            user_id: "u1".into(),
            weather: None,
        }
    }

    fn credential(tag: u8) -> EncryptedCredential {
        EncryptedCredential::from_parts(&[tag; 4], &[0; 12], &[0; 16])
    }

    #[tokio::test]
    async fn without_credentials_the_zone_is_skipped() {
        let fx = fixture(Some(one_create()), Some(one_create()));
        let outcome = fx.handler.run(&job()).await.unwrap();
        assert_eq!(outcome, ZoneOutcome::NoCredential);
        assert!(fx.store.recent_analyses("g1", 10).await.unwrap().is_empty());
        assert!(fx.primary.seen_keys.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fallback_is_used_and_recorded_when_primary_key_missing() {
        let fx = fixture(None, Some(one_create()));
        fx.store
            .put_provider_credential("u1", ProviderRole::Fallback, &credential(7))
            .unwrap();

        let outcome = fx.handler.run(&job()).await.unwrap();
        let ZoneOutcome::Analyzed { analysis_id, report } = outcome else {
            panic!("expected an analysis");
        };
        assert_eq!(report.applied(), 1);
        assert!(fx.primary.seen_keys.lock().unwrap().is_empty());
        assert_eq!(fx.fallback.seen_keys.lock().unwrap().len(), 1);

        let audits = fx.store.recent_analyses("g1", 10).await.unwrap();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].id, analysis_id);
        assert_eq!(audits[0].provider, ProviderRole::Fallback);
        assert_eq!(audits[0].model_used, "scripted-model");
        assert_eq!(audits[0].input_tokens, 120);

        let tasks = fx.store.pending_tasks("z1").await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, TaskStatus::Pending);
        assert_eq!(tasks[0].analysis_id.as_deref(), Some(analysis_id.as_str()));
    }

    #[tokio::test]
    async fn empty_provider_response_propagates_without_audit() {
        let fx = fixture(None, None);
        fx.store
            .put_provider_credential("u1", ProviderRole::Primary, &credential(1))
            .unwrap();

        let err = fx.handler.run(&job()).await.unwrap_err();
        assert!(matches!(
            err,
            PlotwiseError::Analysis(AnalysisError::ProviderEmptyResponse(_))
        ));
        assert!(fx.store.recent_analyses("g1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleted_zone_is_skipped() {
        let fx = fixture(Some(one_create()), None);
        fx.store
            .put_provider_credential("u1", ProviderRole::Primary, &credential(1))
            .unwrap();
        let mut gone = job();
        gone.zone_id = "z-deleted".into();
        assert_eq!(fx.handler.run(&gone).await.unwrap(), ZoneOutcome::ZoneMissing);
        assert!(fx.primary.seen_keys.lock().unwrap().is_empty());
    }
}
