pub mod answer;
pub mod fields;
pub mod format;
pub mod intent;
pub mod models;
pub mod zones;

pub use answer::{answer, answer_detailed, extract_zone_key, format_answer};
pub use intent::{classify_intent, normalize_query, query_words, QueryWord};
pub use models::*;
pub use zones::{aggregate_zones, rank_zones};
