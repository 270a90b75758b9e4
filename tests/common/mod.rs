//! Shared fixtures for integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use chrono::NaiveDate;
use plotwise::context::AnalysisContext;
use plotwise::llm::provider::{Credential, ImageRef};
use plotwise::store::{Garden, Plant, SkillLevel, Zone};
use serde_json::{Value, json};

/// A small zone with one plant and one photo, no history.
pub fn zone_context() -> AnalysisContext {
    AnalysisContext {
        garden: Garden {
            id: "g1".into(),
            user_id: "u1".into(),
            name: "Back garden".into(),
            location: None,
            hardiness_zone: Some("9a".into()),
        },
        zone: Zone {
            id: "z1".into(),
            garden_id: "g1".into(),
            name: "Tomato bed".into(),
            soil_type: Some("clay".into()),
            sun_exposure: Some("partial shade".into()),
            notes: None,
        },
        plants: vec![Plant {
            id: "p1".into(),
            zone_id: "z1".into(),
            name: "Tomato".into(),
            variety: Some("San Marzano".into()),
            planted_on: NaiveDate::from_ymd_opt(2025, 4, 12),
            growth_stage: Some("fruiting".into()),
            care_profile: None,
        }],
        care_log: Vec::new(),
        sensors: Vec::new(),
        weather: None,
        photos: vec![ImageRef {
            url: "https://photos.example/z1/leaf.jpg".into(),
            description: Some("Lower leaves".into()),
        }],
        pending_tasks: Vec::new(),
        today: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        skill_level: SkillLevel::Beginner,
    }
}

pub fn credential(key: &str) -> Credential {
    Credential::new(key)
}

/// A valid analysis result with a single `create` operation.
pub fn one_create_output() -> Value {
    json!({
        "operations": [{
            "op": "create",
            "targetType": "plant",
            "targetId": "p1",
            "actionType": "prune",
            "priority": "upcoming",
            "label": "Remove yellowing lower leaves",
            "suggestedDate": "2025-06-03"
        }],
        "alerts": ["Possible early blight"]
    })
}
