//! SQLite DDL for the garden store.
//!
//! Timestamps are RFC 3339 text written by rusqlite's chrono support, so
//! lexical order matches chronological order.

use rusqlite::Connection;

/// Version stamped into `schema_meta` on a fresh database.
pub(crate) const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Complete DDL. Uses `IF NOT EXISTS` throughout so `apply_schema` is
/// idempotent.
pub(crate) const SCHEMA_SQL: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS gardens (
    id             TEXT PRIMARY KEY,
    user_id        TEXT NOT NULL,
    name           TEXT NOT NULL,
    lat            REAL,
    lng            REAL,
    hardiness_zone TEXT
);

CREATE TABLE IF NOT EXISTS zones (
    id           TEXT PRIMARY KEY,
    garden_id    TEXT NOT NULL REFERENCES gardens(id) ON DELETE CASCADE,
    name         TEXT NOT NULL,
    soil_type    TEXT,
    sun_exposure TEXT,
    notes        TEXT
);
CREATE INDEX IF NOT EXISTS idx_zones_garden ON zones(garden_id);

CREATE TABLE IF NOT EXISTS plants (
    id           TEXT PRIMARY KEY,
    zone_id      TEXT NOT NULL REFERENCES zones(id) ON DELETE CASCADE,
    name         TEXT NOT NULL,
    variety      TEXT,
    planted_on   TEXT,
    growth_stage TEXT,
    care_profile TEXT
);
CREATE INDEX IF NOT EXISTS idx_plants_zone ON plants(zone_id);

CREATE TABLE IF NOT EXISTS care_logs (
    id           TEXT PRIMARY KEY,
    zone_id      TEXT NOT NULL REFERENCES zones(id) ON DELETE CASCADE,
    plant_id     TEXT,
    action       TEXT NOT NULL,
    notes        TEXT,
    performed_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_care_logs_zone_time ON care_logs(zone_id, performed_at);

CREATE TABLE IF NOT EXISTS sensor_readings (
    zone_id     TEXT NOT NULL REFERENCES zones(id) ON DELETE CASCADE,
    metric      TEXT NOT NULL,
    value       REAL NOT NULL,
    unit        TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sensor_zone_metric ON sensor_readings(zone_id, metric, recorded_at);

CREATE TABLE IF NOT EXISTS photos (
    id          TEXT PRIMARY KEY,
    zone_id     TEXT NOT NULL REFERENCES zones(id) ON DELETE CASCADE,
    plant_id    TEXT,
    storage_key TEXT NOT NULL,
    caption     TEXT,
    taken_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_photos_zone_time ON photos(zone_id, taken_at);

CREATE TABLE IF NOT EXISTS user_profiles (
    user_id     TEXT PRIMARY KEY,
    skill_level TEXT NOT NULL
);

-- Provider keys, encrypted by the key service. Columns are base64 text.
CREATE TABLE IF NOT EXISTS provider_credentials (
    user_id    TEXT NOT NULL,
    role       TEXT NOT NULL,      -- primary | fallback
    ciphertext TEXT NOT NULL,
    iv         TEXT NOT NULL,
    auth_tag   TEXT NOT NULL,
    PRIMARY KEY (user_id, role)
);

CREATE TABLE IF NOT EXISTS weather_cache (
    garden_id  TEXT PRIMARY KEY,
    snapshot   TEXT NOT NULL,      -- JSON WeatherSnapshot
    fetched_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS analyses (
    id            TEXT PRIMARY KEY,
    garden_id     TEXT NOT NULL,
    zone_id       TEXT NOT NULL,
    user_id       TEXT NOT NULL,
    scope         TEXT NOT NULL,
    provider      TEXT NOT NULL,
    model_used    TEXT NOT NULL,
    input_tokens  INTEGER NOT NULL,
    output_tokens INTEGER NOT NULL,
    result        TEXT NOT NULL,   -- JSON AnalysisResult
    created_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_analyses_garden_time ON analyses(garden_id, created_at);

CREATE TABLE IF NOT EXISTS tasks (
    id             TEXT PRIMARY KEY,
    garden_id      TEXT NOT NULL,
    zone_id        TEXT NOT NULL,
    target_type    TEXT NOT NULL,
    target_id      TEXT NOT NULL,
    action_type    TEXT NOT NULL,
    priority       TEXT NOT NULL,
    status         TEXT NOT NULL DEFAULT 'pending',
    label          TEXT NOT NULL,
    suggested_date TEXT NOT NULL,
    context        TEXT,
    recurrence     TEXT,
    request_photo  INTEGER NOT NULL DEFAULT 0,
    completed_at   TEXT,
    completed_via  TEXT,
    analysis_id    TEXT,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tasks_zone_status ON tasks(zone_id, status);
"#;

/// Apply the full schema and seed the version stamp.
pub(crate) fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        rusqlite::params![CURRENT_SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

/// Read the stamped schema version, `None` when missing.
pub(crate) fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<u32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_meta WHERE key = 'schema_version'")?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => {
            let value: String = row.get(0)?;
            Ok(value.parse::<u32>().ok())
        }
        None => Ok(None),
    }
}
