use crate::fields::{finite_number, first_truthy, properties, resolve_features};
use crate::format::{group_thousands, plain_number, round_half_up};
use crate::intent::{classify_intent, normalize_query, query_words};
use crate::models::{Answer, Intent, PlanningState, ZoneAggregate};
use crate::zones::{aggregate_zones, rank_zones};

const PRIORITY_LIMIT: usize = 3;
const CAPACITY_KEYS: &[&str] = &["capacity", "cap"];

pub const HELP_TEXT: &str = "Examples:\n\
• How many people do I need to move from Zone Z1?\n\
• What are the top 3 priority zones?\n\
• What is the minimum route risk margin?\n\
• What’s the estimated population in impact?\n\
• What’s total shelter capacity?";

pub const FALLBACK_TEXT: &str = "I can answer about zones, evacuees, priorities, routes, shelters, and impact. Try: “How many people to move from Zone Z1?”";

/// Answers a free-text question against a planning snapshot. Never fails:
/// missing or unmatched data is reported in the returned text.
pub fn answer(query: &str, state: &PlanningState) -> String {
    answer_detailed(query, state).text
}

pub fn answer_detailed(query: &str, state: &PlanningState) -> Answer {
    let normalized = normalize_query(query);
    let intent = classify_intent(&normalized);
    Answer {
        intent,
        text: format_answer(intent, query, state),
    }
}

/// Renders the answer for an already classified intent.
///
/// `query` is the operator's text as typed. The zone key is read from its
/// normalized words and echoed back in the operator's spelling.
pub fn format_answer(intent: Intent, query: &str, state: &PlanningState) -> String {
    match intent {
        Intent::ZonePopulation => zone_population(query, state),
        Intent::PriorityZones => priority_zones(state),
        Intent::RouteRiskMargin => route_risk_margin(state),
        Intent::TotalImpact => total_impact(state),
        Intent::ShelterCapacity => shelter_capacity(state),
        Intent::Help => HELP_TEXT.to_string(),
        Intent::Unrecognized => FALLBACK_TEXT.to_string(),
    }
}

/// Zone key following the first `zone` word of the normalized query.
///
/// The key runs over the following words until a gap holding punctuation;
/// hyphens, whitespace and non-ASCII letters keep it going. The returned text is
/// the raw span those words cover, so replies keep the operator's spelling,
/// and it normalizes back to exactly the key words.
pub fn extract_zone_key(query: &str) -> Option<String> {
    let words = query_words(query);
    let marker = words.iter().position(|word| word.text == "zone")?;

    let first = words.get(marker + 1)?;
    let mut last = first;
    for next in &words[marker + 2..] {
        let gap = &query[last.span.end..next.span.start];
        if !gap.chars().all(|ch| ch == '-' || ch.is_whitespace() || ch.is_alphanumeric()) {
            break;
        }
        last = next;
    }

    Some(query[first.span.start..last.span.end].to_string())
}

fn zone_population(query: &str, state: &PlanningState) -> String {
    let Some(key) = extract_zone_key(query) else {
        return "I couldn't find a zone name in your question.".to_string();
    };

    let zones = aggregate_zones(state.demand.as_ref());
    match find_zone(&zones, &key) {
        Some(zone) => format!(
            "Estimated evacuees in {}: {}",
            zone.name,
            group_thousands(zone.population)
        ),
        None => format!("I couldn't find a zone matching \"{key}\"."),
    }
}

fn find_zone<'a>(zones: &'a [ZoneAggregate], key: &str) -> Option<&'a ZoneAggregate> {
    let wanted = normalize_query(key);
    if wanted.is_empty() {
        return None;
    }

    zones
        .iter()
        .find(|zone| normalize_query(&zone.id) == wanted)
        .or_else(|| {
            let wanted = format!(" {wanted} ");
            zones
                .iter()
                .find(|zone| format!(" {} ", normalize_query(&zone.name)).contains(&wanted))
        })
}

fn priority_zones(state: &PlanningState) -> String {
    let ranked = rank_zones(aggregate_zones(state.demand.as_ref()));
    if ranked.is_empty() {
        return "I don't have enough data to rank zones.".to_string();
    }

    let lines = ranked
        .iter()
        .take(PRIORITY_LIMIT)
        .enumerate()
        .map(|(index, zone)| {
            let risk = zone
                .risk
                .map(|risk| format!(", risk {}", plain_number(risk)))
                .unwrap_or_default();
            format!(
                "{}. {} ({}{})",
                index + 1,
                zone.name,
                group_thousands(zone.population),
                risk
            )
        })
        .collect::<Vec<_>>();

    format!("Top priority zones:\n{}", lines.join("\n"))
}

fn route_risk_margin(state: &PlanningState) -> String {
    let margin = state
        .transport
        .as_ref()
        .and_then(|transport| transport.get("riskMarginMin"))
        .and_then(finite_number);

    match margin {
        Some(minutes) => format!(
            "Minimum route risk margin: {} minutes",
            plain_number(minutes)
        ),
        None => "No route risk margin available.".to_string(),
    }
}

fn total_impact(state: &PlanningState) -> String {
    let total = state
        .hazard
        .as_ref()
        .and_then(|hazard| hazard.get("impact_population_total"))
        .and_then(finite_number);

    match total {
        Some(total) => format!(
            "Estimated population in impact: {}",
            group_thousands(round_half_up(total))
        ),
        None => "No impact population estimate available.".to_string(),
    }
}

fn shelter_capacity(state: &PlanningState) -> String {
    let total: f64 = resolve_features(state.shelter.as_ref())
        .iter()
        .filter_map(properties)
        .filter_map(|props| first_truthy(props, CAPACITY_KEYS))
        .filter_map(finite_number)
        .sum();

    if total > 0.0 {
        format!("Total shelter capacity: {}", group_thousands(total))
    } else {
        "Shelter capacity data not found.".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn demand(features: Vec<Value>) -> PlanningState {
        PlanningState {
            demand: Some(json!({
                "geojson": {
                    "type": "FeatureCollection",
                    "features": features
                        .into_iter()
                        .map(|props| json!({ "type": "Feature", "properties": props }))
                        .collect::<Vec<_>>()
                }
            })),
            ..PlanningState::default()
        }
    }

    #[test]
    fn answers_zone_population() {
        let state = demand(vec![json!({ "id": "Z1", "population": 1200 })]);
        let reply = answer("How many people do I need to move from Zone Z1?", &state);
        assert!(reply.contains("Z1"));
        assert!(reply.contains("1,200"));
        assert_eq!(reply, "Estimated evacuees in Z1: 1,200");
    }

    #[test]
    fn zone_lookup_falls_back_to_name_containment() {
        let state = demand(vec![
            json!({ "id": "Z7", "name": "Harbour District", "population": 4500 }),
            json!({ "id": "Z8", "name": "Old Town", "population": 300 }),
        ]);
        assert_eq!(
            answer("How many people live in zone harbour?", &state),
            "Estimated evacuees in Harbour District: 4,500"
        );
    }

    #[test]
    fn exact_id_match_beats_name_containment() {
        let state = demand(vec![
            json!({ "id": "A1", "name": "North B2 annex", "population": 10 }),
            json!({ "id": "B2", "name": "South", "population": 20 }),
        ]);
        assert_eq!(
            answer("how many people in zone b2", &state),
            "Estimated evacuees in South: 20"
        );
    }

    #[test]
    fn hyphenated_keys_match_normalized_ids() {
        let state = demand(vec![json!({ "zone": "Z-3", "population": 75 })]);
        assert_eq!(
            answer("How many people are in zone z-3?", &state),
            "Estimated evacuees in Z-3: 75"
        );
    }

    #[test]
    fn unknown_zone_is_named_in_reply() {
        let state = demand(vec![json!({ "id": "Z1", "population": 1200 })]);
        let reply = answer("How many people from Zone Q9?", &state);
        assert_eq!(reply, "I couldn't find a zone matching \"Q9\".");
    }

    #[test]
    fn zone_question_without_key_gets_generic_reply() {
        let state = demand(vec![json!({ "id": "Z1", "population": 1200 })]);
        assert_eq!(
            answer("how many people per zone", &state),
            "I couldn't find a zone name in your question."
        );
    }

    #[test]
    fn extracts_first_zone_word_only() {
        assert_eq!(extract_zone_key("people in ozone Z1"), None);
        assert_eq!(extract_zone_key("Zone Z1, please"), Some("Z1".to_string()));
        assert_eq!(extract_zone_key("zones a, zone  b-2?"), Some("b-2".to_string()));
        assert_eq!(extract_zone_key("zone ?"), None);
    }

    #[test]
    fn punctuation_around_the_key_is_ignored() {
        let state = demand(vec![json!({ "id": "Z1", "population": 1200 })]);
        for query in [
            "How many people in zone \"Z1\"?",
            "How many people in Zone:Z1?",
            "How many people in zone_Z1?",
            "How many people in zone (Z1)",
        ] {
            assert_eq!(answer(query, &state), "Estimated evacuees in Z1: 1,200", "{query}");
        }
    }

    #[test]
    fn non_ascii_key_never_matches_on_a_single_letter() {
        let state = demand(vec![
            json!({ "id": "A1", "name": "Zephyr Heights", "population": 5000 }),
            json!({ "id": "Z1", "population": 1200 }),
        ]);
        assert_eq!(
            answer("How many people in Zone Zürich?", &state),
            "I couldn't find a zone matching \"Zürich\"."
        );
        assert_eq!(
            answer("how many people in zone z", &state),
            "I couldn't find a zone matching \"z\"."
        );
    }

    #[test]
    fn non_ascii_names_match_whole_words() {
        let state = demand(vec![
            json!({ "id": "A1", "name": "Zephyr Heights", "population": 5000 }),
            json!({ "id": "N4", "name": "Zürich Nord", "population": 800 }),
        ]);
        assert_eq!(
            answer("How many people in zone Zürich?", &state),
            "Estimated evacuees in Zürich Nord: 800"
        );
    }

    #[test]
    fn zone_key_spans_map_back_to_raw_text() {
        assert_eq!(extract_zone_key("Zone \"Q9\""), Some("Q9".to_string()));
        assert_eq!(extract_zone_key("zone Zürich Nord!"), Some("Zürich Nord".to_string()));
        assert_eq!(extract_zone_key("zone_Z1"), Some("Z1".to_string()));
        assert_eq!(extract_zone_key("zone"), None);
    }

    #[test]
    fn ranks_priority_zones() {
        let state = demand(vec![
            json!({ "id": "A", "population": 100, "risk": 3 }),
            json!({ "id": "B", "population": 50, "risk": 5 }),
            json!({ "id": "C", "population": 200, "risk": 5 }),
            json!({ "id": "D", "population": 999, "risk": 1 }),
        ]);

        assert_eq!(
            answer("What are the top 3 priority zones?", &state),
            "Top priority zones:\n1. C (200, risk 5)\n2. B (50, risk 5)\n3. A (100, risk 3)"
        );
    }

    #[test]
    fn priority_lines_omit_missing_risk() {
        let state = demand(vec![json!({ "id": "A", "name": "Alpha", "population": 12000 })]);
        assert_eq!(
            answer("which zone first", &state),
            "Top priority zones:\n1. Alpha (12,000)"
        );
    }

    #[test]
    fn priority_without_zones_reports_missing_data() {
        assert_eq!(
            answer("priority zones?", &PlanningState::default()),
            "I don't have enough data to rank zones."
        );
    }

    #[test]
    fn reports_route_risk_margin() {
        let state = PlanningState {
            transport: Some(json!({ "riskMarginMin": 7.5 })),
            ..PlanningState::default()
        };
        let reply = answer("What is the minimum route risk margin?", &state);
        assert!(reply.contains("7.5"));
        assert_eq!(reply, "Minimum route risk margin: 7.5 minutes");

        assert_eq!(
            answer("risk margin", &PlanningState::default()),
            "No route risk margin available."
        );
    }

    #[test]
    fn reports_total_impact_rounded() {
        let state = PlanningState {
            hazard: Some(json!({ "impact_population_total": 15234.5 })),
            ..PlanningState::default()
        };
        assert_eq!(
            answer("What’s the estimated population in impact?", &state),
            "Estimated population in impact: 15,235"
        );
        assert_eq!(
            answer("total impact", &PlanningState::default()),
            "No impact population estimate available."
        );
    }

    #[test]
    fn sums_shelter_capacity() {
        let state: PlanningState = serde_json::from_value(json!({
            "shelter": { "geojson": { "features": [
                { "properties": { "capacity": 50 } },
                { "properties": { "capacity": 30 } },
                { "properties": { "capacity": "unknown" } },
                { "properties": {} }
            ]}}
        }))
        .unwrap();
        let reply = answer("What's total shelter capacity?", &state);
        assert!(reply.contains("80"));
        assert_eq!(reply, "Total shelter capacity: 80");
    }

    #[test]
    fn shelter_capacity_reads_cap_alias_and_bare_features() {
        let state = PlanningState {
            shelter: Some(json!({ "features": [
                { "properties": { "id": "S1", "cap": 1500 } },
                { "properties": { "id": "S2", "capacity": 200 } }
            ]})),
            ..PlanningState::default()
        };
        assert_eq!(answer("beds?", &state), "Total shelter capacity: 1,700");
        assert_eq!(
            answer("shelter capacity", &PlanningState::default()),
            "Shelter capacity data not found."
        );
    }

    #[test]
    fn help_and_fallback_are_fixed() {
        let state = PlanningState::default();
        assert_eq!(answer("help", &state), HELP_TEXT);
        assert!(HELP_TEXT.starts_with("Examples:\n• How many people"));
        assert_eq!(HELP_TEXT.lines().count(), 6);
        assert_eq!(answer("asdkjasd", &state), FALLBACK_TEXT);
        assert_eq!(answer("", &state), FALLBACK_TEXT);
    }

    #[test]
    fn detailed_answer_carries_intent() {
        let detailed = answer_detailed("examples", &PlanningState::default());
        assert_eq!(detailed.intent, Intent::Help);
        assert_eq!(detailed.text, HELP_TEXT);
    }
}
