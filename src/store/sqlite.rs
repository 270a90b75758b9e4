//! SQLite-backed [`GardenStore`].
//!
//! The connection sits behind a shared `Mutex`. Trait methods run their
//! queries on the blocking thread pool so async workers never stall on
//! SQLite I/O.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};

use super::schema::{apply_schema, read_schema_version};
use super::types::{
    AnalysisRecord, AnalysisScope, CachedWeather, CareLogEntry, CompletedVia, Garden, GeoPoint,
    NewAnalysisRecord, PhotoRecord, Plant, SensorReading, SkillLevel, Task, TaskClose, TaskScope,
    TaskStatus, Zone,
};
use super::{GardenStore, StoreError};
use crate::contract::{ActionType, CreateTask, Priority, TargetType, TaskUpdate};
use crate::credentials::EncryptedCredential;
use crate::llm::provider::ProviderRole;
use crate::weather::WeatherSnapshot;

const TASK_COLUMNS: &str = "id, garden_id, zone_id, target_type, target_id, action_type, \
     priority, status, label, suggested_date, context, recurrence, request_photo, \
     completed_at, completed_via, analysis_id, created_at, updated_at";

const ANALYSIS_COLUMNS: &str = "id, garden_id, zone_id, user_id, scope, provider, model_used, \
     input_tokens, output_tokens, result, created_at";

/// SQLite garden store.
pub struct SqliteGardenStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteGardenStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::from_connection(conn)
    }

    /// A private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        apply_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Stamped schema version.
    pub fn schema_version(&self) -> Result<Option<u32>, StoreError> {
        let conn = self.lock()?;
        Ok(read_schema_version(&conn)?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|e| StoreError::Lock(e.to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    // -----------------------------------------------------------------------
    // Seeding. The pipeline only reads these entities; admin tooling and
    // tests populate them.
    // -----------------------------------------------------------------------

    pub fn insert_garden(&self, garden: &Garden) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO gardens (id, user_id, name, lat, lng, hardiness_zone) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                garden.id,
                garden.user_id,
                garden.name,
                garden.location.map(|p| p.lat),
                garden.location.map(|p| p.lng),
                garden.hardiness_zone,
            ],
        )?;
        Ok(())
    }

    pub fn insert_zone(&self, zone: &Zone) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO zones (id, garden_id, name, soil_type, sun_exposure, notes) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                zone.id,
                zone.garden_id,
                zone.name,
                zone.soil_type,
                zone.sun_exposure,
                zone.notes,
            ],
        )?;
        Ok(())
    }

    pub fn insert_plant(&self, plant: &Plant) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO plants (id, zone_id, name, variety, planted_on, growth_stage, care_profile) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                plant.id,
                plant.zone_id,
                plant.name,
                plant.variety,
                plant.planted_on,
                plant.growth_stage,
                plant.care_profile,
            ],
        )?;
        Ok(())
    }

    pub fn insert_care_log(&self, entry: &CareLogEntry) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO care_logs (id, zone_id, plant_id, action, notes, performed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.id,
                entry.zone_id,
                entry.plant_id,
                entry.action,
                entry.notes,
                entry.performed_at,
            ],
        )?;
        Ok(())
    }

    pub fn insert_sensor_reading(&self, reading: &SensorReading) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sensor_readings (zone_id, metric, value, unit, recorded_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                reading.zone_id,
                reading.metric,
                reading.value,
                reading.unit,
                reading.recorded_at,
            ],
        )?;
        Ok(())
    }

    pub fn insert_photo(&self, photo: &PhotoRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO photos (id, zone_id, plant_id, storage_key, caption, taken_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                photo.id,
                photo.zone_id,
                photo.plant_id,
                photo.storage_key,
                photo.caption,
                photo.taken_at,
            ],
        )?;
        Ok(())
    }

    pub fn set_skill_level(&self, user_id: &str, level: SkillLevel) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO user_profiles (user_id, skill_level) VALUES (?1, ?2) \
             ON CONFLICT(user_id) DO UPDATE SET skill_level = excluded.skill_level",
            params![user_id, level.as_str()],
        )?;
        Ok(())
    }

    pub fn put_provider_credential(
        &self,
        user_id: &str,
        role: ProviderRole,
        record: &EncryptedCredential,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO provider_credentials (user_id, role, ciphertext, iv, auth_tag) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(user_id, role) DO UPDATE SET \
             ciphertext = excluded.ciphertext, iv = excluded.iv, auth_tag = excluded.auth_tag",
            params![
                user_id,
                role.as_str(),
                record.ciphertext,
                record.iv,
                record.auth_tag,
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl GardenStore for SqliteGardenStore {
    async fn list_gardens(&self) -> Result<Vec<Garden>, StoreError> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, name, lat, lng, hardiness_zone FROM gardens ORDER BY id",
            )?;
            let rows = stmt.query_map([], row_to_garden)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn garden(&self, garden_id: &str) -> Result<Option<Garden>, StoreError> {
        let garden_id = garden_id.to_owned();
        self.blocking(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT id, user_id, name, lat, lng, hardiness_zone FROM gardens WHERE id = ?1",
                    params![garden_id],
                    row_to_garden,
                )
                .optional()?)
        })
        .await
    }

    async fn zones_for_garden(&self, garden_id: &str) -> Result<Vec<Zone>, StoreError> {
        let garden_id = garden_id.to_owned();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, garden_id, name, soil_type, sun_exposure, notes FROM zones \
                 WHERE garden_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![garden_id], row_to_zone)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn zone(&self, garden_id: &str, zone_id: &str) -> Result<Option<Zone>, StoreError> {
        let (garden_id, zone_id) = (garden_id.to_owned(), zone_id.to_owned());
        self.blocking(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT id, garden_id, name, soil_type, sun_exposure, notes FROM zones \
                     WHERE id = ?1 AND garden_id = ?2",
                    params![zone_id, garden_id],
                    row_to_zone,
                )
                .optional()?)
        })
        .await
    }

    async fn plants_for_zone(&self, zone_id: &str) -> Result<Vec<Plant>, StoreError> {
        let zone_id = zone_id.to_owned();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, zone_id, name, variety, planted_on, growth_stage, care_profile \
                 FROM plants WHERE zone_id = ?1 ORDER BY name, id",
            )?;
            let rows = stmt.query_map(params![zone_id], |row| {
                Ok(Plant {
                    id: row.get(0)?,
                    zone_id: row.get(1)?,
                    name: row.get(2)?,
                    variety: row.get(3)?,
                    planted_on: row.get::<_, Option<NaiveDate>>(4)?,
                    growth_stage: row.get(5)?,
                    care_profile: row.get(6)?,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn recent_care_logs(
        &self,
        zone_id: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CareLogEntry>, StoreError> {
        let zone_id = zone_id.to_owned();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, zone_id, plant_id, action, notes, performed_at FROM care_logs \
                 WHERE zone_id = ?1 AND performed_at >= ?2 \
                 ORDER BY performed_at DESC LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![zone_id, since, sql_limit(limit)], |row| {
                Ok(CareLogEntry {
                    id: row.get(0)?,
                    zone_id: row.get(1)?,
                    plant_id: row.get(2)?,
                    action: row.get(3)?,
                    notes: row.get(4)?,
                    performed_at: row.get(5)?,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn latest_sensor_readings(
        &self,
        zone_id: &str,
    ) -> Result<Vec<SensorReading>, StoreError> {
        let zone_id = zone_id.to_owned();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT r.zone_id, r.metric, r.value, r.unit, r.recorded_at \
                 FROM sensor_readings r \
                 WHERE r.zone_id = ?1 AND r.recorded_at = ( \
                     SELECT MAX(recorded_at) FROM sensor_readings \
                     WHERE zone_id = r.zone_id AND metric = r.metric) \
                 ORDER BY r.metric",
            )?;
            let rows = stmt.query_map(params![zone_id], |row| {
                Ok(SensorReading {
                    zone_id: row.get(0)?,
                    metric: row.get(1)?,
                    value: row.get(2)?,
                    unit: row.get(3)?,
                    recorded_at: row.get(4)?,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn recent_photos(
        &self,
        zone_id: &str,
        limit: usize,
    ) -> Result<Vec<PhotoRecord>, StoreError> {
        let zone_id = zone_id.to_owned();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, zone_id, plant_id, storage_key, caption, taken_at FROM photos \
                 WHERE zone_id = ?1 OR plant_id IN (SELECT id FROM plants WHERE zone_id = ?1) \
                 ORDER BY taken_at DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![zone_id, sql_limit(limit)], |row| {
                Ok(PhotoRecord {
                    id: row.get(0)?,
                    zone_id: row.get(1)?,
                    plant_id: row.get(2)?,
                    storage_key: row.get(3)?,
                    caption: row.get(4)?,
                    taken_at: row.get(5)?,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn skill_level(&self, user_id: &str) -> Result<Option<SkillLevel>, StoreError> {
        let user_id = user_id.to_owned();
        self.blocking(move |conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT skill_level FROM user_profiles WHERE user_id = ?1",
                    params![user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(raw.and_then(|s| SkillLevel::parse(&s)))
        })
        .await
    }

    async fn provider_credential(
        &self,
        user_id: &str,
        role: ProviderRole,
    ) -> Result<Option<EncryptedCredential>, StoreError> {
        let user_id = user_id.to_owned();
        self.blocking(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT ciphertext, iv, auth_tag FROM provider_credentials \
                     WHERE user_id = ?1 AND role = ?2",
                    params![user_id, role.as_str()],
                    |row| {
                        Ok(EncryptedCredential {
                            ciphertext: row.get(0)?,
                            iv: row.get(1)?,
                            auth_tag: row.get(2)?,
                        })
                    },
                )
                .optional()?)
        })
        .await
    }

    async fn cached_weather(&self, garden_id: &str) -> Result<Option<CachedWeather>, StoreError> {
        let garden_id = garden_id.to_owned();
        self.blocking(move |conn| {
            let row: Option<(String, DateTime<Utc>)> = conn
                .query_row(
                    "SELECT snapshot, fetched_at FROM weather_cache WHERE garden_id = ?1",
                    params![garden_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            match row {
                Some((json, fetched_at)) => Ok(Some(CachedWeather {
                    snapshot: serde_json::from_str(&json)?,
                    garden_id,
                    fetched_at,
                })),
                None => Ok(None),
            }
        })
        .await
    }

    async fn store_weather(
        &self,
        garden_id: &str,
        snapshot: &WeatherSnapshot,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(snapshot)?;
        let garden_id = garden_id.to_owned();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO weather_cache (garden_id, snapshot, fetched_at) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(garden_id) DO UPDATE SET \
                 snapshot = excluded.snapshot, fetched_at = excluded.fetched_at",
                params![garden_id, json, fetched_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn pending_tasks(&self, zone_id: &str) -> Result<Vec<Task>, StoreError> {
        let zone_id = zone_id.to_owned();
        self.blocking(move |conn| {
            let sql = format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE zone_id = ?1 AND status = 'pending' \
                 ORDER BY suggested_date, created_at"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![zone_id], row_to_task)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn task(&self, task_id: &str) -> Result<Option<Task>, StoreError> {
        let task_id = task_id.to_owned();
        self.blocking(move |conn| {
            let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
            Ok(conn
                .query_row(&sql, params![task_id], row_to_task)
                .optional()?)
        })
        .await
    }

    async fn insert_task(
        &self,
        scope: &TaskScope,
        create: &CreateTask,
        analysis_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Task, StoreError> {
        let task = Task {
            id: new_id("task"),
            garden_id: scope.garden_id.clone(),
            zone_id: scope.zone_id.clone(),
            target_type: create.target_type,
            target_id: create.target_id.clone(),
            action_type: create.action_type,
            priority: create.priority,
            status: TaskStatus::Pending,
            label: create.label.clone(),
            suggested_date: create.suggested_date,
            context: create.context.clone(),
            recurrence: create.recurrence.clone(),
            request_photo: create.request_photo.unwrap_or(false),
            completed_at: None,
            completed_via: None,
            analysis_id: analysis_id.map(str::to_owned),
            created_at: now,
            updated_at: now,
        };

        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO tasks (id, garden_id, zone_id, target_type, target_id, action_type, \
                 priority, status, label, suggested_date, context, recurrence, request_photo, \
                 analysis_id, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                params![
                    task.id,
                    task.garden_id,
                    task.zone_id,
                    task.target_type.as_str(),
                    task.target_id,
                    task.action_type.as_str(),
                    task.priority.as_str(),
                    task.status.as_str(),
                    task.label,
                    task.suggested_date,
                    task.context,
                    task.recurrence,
                    task.request_photo,
                    task.analysis_id,
                    task.created_at,
                    task.updated_at,
                ],
            )?;
            Ok(task)
        })
        .await
    }

    async fn update_pending_task(
        &self,
        zone_id: &str,
        update: &TaskUpdate,
        analysis_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let (zone_id, analysis_id) = (zone_id.to_owned(), analysis_id.to_owned());
        let update = update.clone();
        self.blocking(move |conn| {
            let changed = conn.execute(
                "UPDATE tasks SET \
                 action_type    = COALESCE(?1, action_type), \
                 priority       = COALESCE(?2, priority), \
                 label          = COALESCE(?3, label), \
                 suggested_date = COALESCE(?4, suggested_date), \
                 context        = COALESCE(?5, context), \
                 recurrence     = COALESCE(?6, recurrence), \
                 request_photo  = COALESCE(?7, request_photo), \
                 updated_at     = ?8, \
                 analysis_id    = ?9 \
                 WHERE id = ?10 AND zone_id = ?11 AND status = 'pending'",
                params![
                    update.action_type.map(|a| a.as_str()),
                    update.priority.map(|p| p.as_str()),
                    update.label,
                    update.suggested_date,
                    update.context,
                    update.recurrence,
                    update.request_photo,
                    now,
                    analysis_id,
                    update.task_id,
                    zone_id,
                ],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    async fn close_pending_task(
        &self,
        zone_id: &str,
        task_id: &str,
        close: &TaskClose,
        analysis_id: Option<&str>,
    ) -> Result<bool, StoreError> {
        let (zone_id, task_id) = (zone_id.to_owned(), task_id.to_owned());
        let analysis_id = analysis_id.map(str::to_owned);
        let close = close.clone();
        self.blocking(move |conn| {
            let changed = conn.execute(
                "UPDATE tasks SET \
                 status        = ?1, \
                 completed_at  = ?2, \
                 completed_via = ?3, \
                 context       = COALESCE(?4, context), \
                 analysis_id   = COALESCE(?5, analysis_id), \
                 updated_at    = ?2 \
                 WHERE id = ?6 AND zone_id = ?7 AND status = 'pending'",
                params![
                    close.status.as_str(),
                    close.at,
                    close.via.as_str(),
                    close.reason,
                    analysis_id,
                    task_id,
                    zone_id,
                ],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    async fn insert_analysis(
        &self,
        record: &NewAnalysisRecord,
        now: DateTime<Utc>,
    ) -> Result<AnalysisRecord, StoreError> {
        let stored = AnalysisRecord {
            id: new_id("analysis"),
            garden_id: record.garden_id.clone(),
            zone_id: record.zone_id.clone(),
            user_id: record.user_id.clone(),
            scope: record.scope,
            provider: record.provider,
            model_used: record.model_used.clone(),
            input_tokens: record.input_tokens,
            output_tokens: record.output_tokens,
            result: record.result.clone(),
            created_at: now,
        };
        let result_json = serde_json::to_string(&stored.result)?;

        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO analyses (id, garden_id, zone_id, user_id, scope, provider, \
                 model_used, input_tokens, output_tokens, result, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    stored.id,
                    stored.garden_id,
                    stored.zone_id,
                    stored.user_id,
                    stored.scope.as_str(),
                    stored.provider.as_str(),
                    stored.model_used,
                    to_sql_count(stored.input_tokens),
                    to_sql_count(stored.output_tokens),
                    result_json,
                    stored.created_at,
                ],
            )?;
            Ok(stored)
        })
        .await
    }

    async fn recent_analyses(
        &self,
        garden_id: &str,
        limit: usize,
    ) -> Result<Vec<AnalysisRecord>, StoreError> {
        let garden_id = garden_id.to_owned();
        self.blocking(move |conn| {
            let sql = format!(
                "SELECT {ANALYSIS_COLUMNS} FROM analyses WHERE garden_id = ?1 \
                 ORDER BY created_at DESC, rowid DESC LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![garden_id, sql_limit(limit)], row_to_analysis)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Row conversion helpers
// ---------------------------------------------------------------------------

fn row_to_garden(row: &rusqlite::Row<'_>) -> rusqlite::Result<Garden> {
    let lat: Option<f64> = row.get(3)?;
    let lng: Option<f64> = row.get(4)?;
    Ok(Garden {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        location: lat.zip(lng).map(|(lat, lng)| GeoPoint { lat, lng }),
        hardiness_zone: row.get(5)?,
    })
}

fn row_to_zone(row: &rusqlite::Row<'_>) -> rusqlite::Result<Zone> {
    Ok(Zone {
        id: row.get(0)?,
        garden_id: row.get(1)?,
        name: row.get(2)?,
        soil_type: row.get(3)?,
        sun_exposure: row.get(4)?,
        notes: row.get(5)?,
    })
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let completed_via: Option<String> = row.get(14)?;
    Ok(Task {
        id: row.get(0)?,
        garden_id: row.get(1)?,
        zone_id: row.get(2)?,
        target_type: parse_column(row, 3, TargetType::parse)?,
        target_id: row.get(4)?,
        action_type: parse_column(row, 5, ActionType::parse)?,
        priority: parse_column(row, 6, Priority::parse)?,
        status: parse_column(row, 7, TaskStatus::parse)?,
        label: row.get(8)?,
        suggested_date: row.get(9)?,
        context: row.get(10)?,
        recurrence: row.get(11)?,
        request_photo: row.get(12)?,
        completed_at: row.get(13)?,
        completed_via: completed_via.as_deref().and_then(CompletedVia::parse),
        analysis_id: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

fn row_to_analysis(row: &rusqlite::Row<'_>) -> rusqlite::Result<AnalysisRecord> {
    let result_json: String = row.get(9)?;
    let result = serde_json::from_str(&result_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e)))?;
    Ok(AnalysisRecord {
        id: row.get(0)?,
        garden_id: row.get(1)?,
        zone_id: row.get(2)?,
        user_id: row.get(3)?,
        scope: parse_column(row, 4, |s| (s == "zone").then_some(AnalysisScope::Zone))?,
        provider: parse_column(row, 5, ProviderRole::parse)?,
        model_used: row.get(6)?,
        input_tokens: from_sql_count(row.get(7)?),
        output_tokens: from_sql_count(row.get(8)?),
        result,
        created_at: row.get(10)?,
    })
}

/// Read a text column through an enum parser, rejecting unknown values.
fn parse_column<T>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    parse: impl Fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unexpected value `{raw}`").into(),
        )
    })
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn to_sql_count(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn from_sql_count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4())
}
