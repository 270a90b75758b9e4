//! Renders an [`AnalysisContext`] into provider-neutral prompt parts.
//!
//! Both adapters send the same system text, user text and images; only the
//! wire shape differs.

use std::fmt::Write as _;

use crate::context::AnalysisContext;
use crate::contract::instruction_block;
use crate::llm::provider::ImageRef;
use crate::store::SkillLevel;

/// Prompt parts for one zone analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisPrompt {
    pub system: String,
    pub user_text: String,
    pub images: Vec<ImageRef>,
}

/// Build the prompt for `context`.
pub fn analysis_prompt(context: &AnalysisContext) -> AnalysisPrompt {
    AnalysisPrompt {
        system: system_prompt(context),
        user_text: render_context(context),
        images: context.photos.clone(),
    }
}

fn system_prompt(context: &AnalysisContext) -> String {
    let audience = match context.skill_level {
        SkillLevel::Beginner => {
            "The gardener is a beginner: use plain words and say briefly why each task matters."
        }
        SkillLevel::Intermediate => "The gardener has some experience: be concise.",
        SkillLevel::Expert => {
            "The gardener is experienced: be terse and skip basic explanations."
        }
    };
    format!(
        "You are a horticulture assistant reviewing one garden zone. Propose changes to the \
         zone's task list based on the plants, recent care, sensor readings, weather and photos. \
         Only reference task ids listed under \"Pending tasks\" and plant ids listed under \
         \"Plants\". Prefer updating or closing an existing task over creating a duplicate.\n\
         {audience}\n\n{}",
        instruction_block(context.today)
    )
}

/// Human-readable rendering of the zone state.
pub fn render_context(context: &AnalysisContext) -> String {
    let mut out = String::new();
    let garden = &context.garden;
    let zone = &context.zone;

    let _ = writeln!(out, "Today: {}", context.today);
    let _ = write!(out, "Garden: {}", garden.name);
    if let Some(zone_climate) = &garden.hardiness_zone {
        let _ = write!(out, " (hardiness zone {zone_climate})");
    }
    if let Some(location) = garden.location {
        let _ = write!(out, " at {:.3}, {:.3}", location.lat, location.lng);
    }
    out.push('\n');

    let _ = writeln!(out, "Zone: {} [id {}]", zone.name, zone.id);
    if let Some(soil) = &zone.soil_type {
        let _ = writeln!(out, "Soil: {soil}");
    }
    if let Some(sun) = &zone.sun_exposure {
        let _ = writeln!(out, "Sun: {sun}");
    }
    if let Some(notes) = &zone.notes {
        let _ = writeln!(out, "Notes: {notes}");
    }

    out.push_str("\nPlants:\n");
    if context.plants.is_empty() {
        out.push_str("- none recorded\n");
    }
    for plant in &context.plants {
        let _ = write!(out, "- {} [id {}]", plant.name, plant.id);
        if let Some(variety) = &plant.variety {
            let _ = write!(out, ", variety {variety}");
        }
        if let Some(planted) = plant.planted_on {
            let _ = write!(out, ", planted {planted}");
        }
        if let Some(stage) = &plant.growth_stage {
            let _ = write!(out, ", stage {stage}");
        }
        if let Some(profile) = &plant.care_profile {
            let _ = write!(out, ", care: {profile}");
        }
        out.push('\n');
    }

    out.push_str("\nRecent care (newest first):\n");
    if context.care_log.is_empty() {
        out.push_str("- nothing logged\n");
    }
    for entry in &context.care_log {
        let _ = write!(
            out,
            "- {} {}",
            entry.performed_at.format("%Y-%m-%d"),
            entry.action
        );
        if let Some(plant) = &entry.plant_id {
            let _ = write!(out, " (plant {plant})");
        }
        if let Some(notes) = &entry.notes {
            let _ = write!(out, ": {notes}");
        }
        out.push('\n');
    }

    if !context.sensors.is_empty() {
        out.push_str("\nSensors:\n");
        for reading in &context.sensors {
            let _ = writeln!(
                out,
                "- {} = {}{} at {}",
                reading.metric,
                reading.value,
                reading.unit,
                reading.recorded_at.format("%Y-%m-%d %H:%M")
            );
        }
    }

    match &context.weather {
        Some(weather) => {
            let current = &weather.current;
            let _ = write!(out, "\nWeather now: {:.1}°C", current.temperature_c);
            if let Some(humidity) = current.humidity_pct {
                let _ = write!(out, ", humidity {humidity:.0}%");
            }
            if let Some(rain) = current.precipitation_mm {
                let _ = write!(out, ", rain {rain:.1} mm");
            }
            if let Some(wind) = current.wind_kph {
                let _ = write!(out, ", wind {wind:.0} km/h");
            }
            out.push('\n');
            for day in &weather.daily {
                let _ = write!(out, "- {}:", day.date);
                if let (Some(low), Some(high)) = (day.low_c, day.high_c) {
                    let _ = write!(out, " {low:.0} to {high:.0}°C");
                }
                if let Some(rain) = day.precipitation_mm {
                    let _ = write!(out, " rain {rain:.1} mm");
                }
                out.push('\n');
            }
        }
        None => out.push_str("\nWeather: unavailable\n"),
    }

    out.push_str("\nPending tasks:\n");
    if context.pending_tasks.is_empty() {
        out.push_str("- none\n");
    }
    for task in &context.pending_tasks {
        let _ = writeln!(
            out,
            "- [id {}] {} {} {} ({}, due {})",
            task.id,
            task.action_type,
            task.target_type,
            task.target_id,
            task.priority,
            task.suggested_date
        );
        let _ = writeln!(out, "  {}", task.label);
    }

    if !context.photos.is_empty() {
        let _ = writeln!(out, "\n{} photo(s) attached.", context.photos.len());
    }
    out
}
