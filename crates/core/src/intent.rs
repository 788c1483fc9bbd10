use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::Intent;

/// Ordered classification rules, evaluated first to last on the normalized
/// query. Help sits after the data intents so "examples of priority zones"
/// still ranks zones.
static INTENT_RULES: Lazy<Vec<(Regex, Intent)>> = Lazy::new(|| {
    [
        (r"how many .*people.*zone", Intent::ZonePopulation),
        (
            r"priority\s+zone|which\s+zone\s+first|evac.*priority",
            Intent::PriorityZones,
        ),
        (r"risk\s+margin|min.*risk.*route", Intent::RouteRiskMargin),
        (
            r"total\s+impact|population\s+in\s+impact|how many.*affected",
            Intent::TotalImpact,
        ),
        (
            r"shelter\s+capacity|beds|total\s+capacity",
            Intent::ShelterCapacity,
        ),
        (r"help|what can i ask|examples", Intent::Help),
    ]
    .into_iter()
    .map(|(pattern, intent)| (Regex::new(pattern).expect("valid intent pattern"), intent))
    .collect()
});

/// One token of the normalized query, with the byte range of the raw text it
/// was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryWord {
    pub text: String,
    pub span: Range<usize>,
}

/// Splits raw text into lowercase `[a-z0-9]` runs. Everything else separates
/// words, including letters outside ASCII.
pub fn query_words(input: &str) -> Vec<QueryWord> {
    let mut words = Vec::new();
    let mut current: Option<QueryWord> = None;

    for (offset, ch) in input.char_indices() {
        let end = offset + ch.len_utf8();
        for lower in ch.to_lowercase() {
            if lower.is_ascii_lowercase() || lower.is_ascii_digit() {
                let word = current.get_or_insert_with(|| QueryWord {
                    text: String::new(),
                    span: offset..end,
                });
                word.text.push(lower);
                word.span.end = end;
            } else if let Some(word) = current.take() {
                words.push(word);
            }
        }
    }

    words.extend(current);
    words
}

pub fn normalize_query(input: &str) -> String {
    query_words(input)
        .iter()
        .map(|word| word.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn classify_intent(normalized: &str) -> Intent {
    INTENT_RULES
        .iter()
        .find(|(pattern, _)| pattern.is_match(normalized))
        .map(|(_, intent)| *intent)
        .unwrap_or(Intent::Unrecognized)
}
