use std::collections::HashMap;

use serde_json::Value;

use crate::fields::{
    finite_number, first_present, first_truthy, properties, resolve_features, scalar_text,
    strict_number,
};
use crate::models::ZoneAggregate;

const ID_KEYS: &[&str] = &["id", "zone_id", "zone", "name"];
const NAME_KEYS: &[&str] = &["name", "zone_name"];
const POPULATION_KEYS: &[&str] = &["population", "pop", "demand", "count"];
const RISK_KEYS: &[&str] = &["risk", "baseline_risk", "priority"];

/// Folds demand features into one aggregate per zone id, in first-seen order.
///
/// Population is summed across every feature of a zone. Risk is taken from the
/// last feature in scan order that carries a numeric value.
pub fn aggregate_zones(demand: Option<&Value>) -> Vec<ZoneAggregate> {
    let mut zones: Vec<ZoneAggregate> = Vec::new();
    let mut index_by_id: HashMap<String, usize> = HashMap::new();

    for feature in resolve_features(demand) {
        let Some(props) = properties(feature) else {
            continue;
        };
        let Some(id) = zone_id(props) else {
            continue;
        };

        let slot = *index_by_id.entry(id.clone()).or_insert_with(|| {
            zones.push(ZoneAggregate {
                name: zone_name(props).unwrap_or_else(|| id.clone()),
                id,
                population: 0.0,
                risk: None,
            });
            zones.len() - 1
        });

        let zone = &mut zones[slot];
        zone.population += population_of(props);
        if let Some(risk) = risk_of(props) {
            zone.risk = Some(risk);
        }
    }

    zones
}

/// Orders zones by risk (missing counts as zero) then population, both
/// descending. Ties keep first-seen order.
pub fn rank_zones(mut zones: Vec<ZoneAggregate>) -> Vec<ZoneAggregate> {
    zones.sort_by(|a, b| {
        b.risk
            .unwrap_or(0.0)
            .total_cmp(&a.risk.unwrap_or(0.0))
            .then_with(|| b.population.total_cmp(&a.population))
    });
    zones
}

fn zone_id(props: &Value) -> Option<String> {
    let id = scalar_text(first_truthy(props, ID_KEYS)?)?;
    let id = id.trim();
    (!id.is_empty()).then(|| id.to_string())
}

fn zone_name(props: &Value) -> Option<String> {
    first_truthy(props, NAME_KEYS).and_then(scalar_text)
}

fn population_of(props: &Value) -> f64 {
    first_truthy(props, POPULATION_KEYS)
        .and_then(finite_number)
        .unwrap_or(0.0)
}

fn risk_of(props: &Value) -> Option<f64> {
    first_present(props, RISK_KEYS).and_then(strict_number)
}
