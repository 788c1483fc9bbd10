use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Snapshot of every upstream planning output.
///
/// Each stage payload is kept as raw JSON because the producing stages emit
/// loosely shaped feature collections; the engine reads them through the
/// accessors in [`crate::fields`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanningState {
    #[serde(default)]
    pub hazard: Option<Value>,
    #[serde(default)]
    pub demand: Option<Value>,
    #[serde(default)]
    pub transport: Option<Value>,
    #[serde(default)]
    pub shelter: Option<Value>,
    #[serde(default)]
    pub resources: Option<Value>,
    #[serde(default)]
    pub equity: Option<Value>,
    #[serde(default)]
    pub comms: Option<Value>,
    #[serde(default)]
    pub plan: Option<Value>,
    #[serde(default)]
    pub event: Option<Value>,
    #[serde(default)]
    pub version: u64,
    #[serde(default, rename = "updatedAt")]
    pub updated_at: Option<String>,
}

impl PlanningState {
    /// Wire names of the planning stages, in pipeline order.
    pub const STAGES: [&'static str; 9] = [
        "hazard",
        "demand",
        "transport",
        "shelter",
        "resources",
        "equity",
        "comms",
        "plan",
        "event",
    ];

    /// Looks up a stage payload by its wire name.
    pub fn stage(&self, name: &str) -> Option<&Value> {
        match name {
            "hazard" => self.hazard.as_ref(),
            "demand" => self.demand.as_ref(),
            "transport" => self.transport.as_ref(),
            "shelter" => self.shelter.as_ref(),
            "resources" => self.resources.as_ref(),
            "equity" => self.equity.as_ref(),
            "comms" => self.comms.as_ref(),
            "plan" => self.plan.as_ref(),
            "event" => self.event.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneAggregate {
    pub id: String,
    pub name: String,
    pub population: f64,
    pub risk: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    ZonePopulation,
    PriorityZones,
    RouteRiskMargin,
    TotalImpact,
    ShelterCapacity,
    Help,
    Unrecognized,
}

impl Intent {
    pub const ALL: [Intent; 7] = [
        Intent::ZonePopulation,
        Intent::PriorityZones,
        Intent::RouteRiskMargin,
        Intent::TotalImpact,
        Intent::ShelterCapacity,
        Intent::Help,
        Intent::Unrecognized,
    ];

    pub fn as_tag(self) -> &'static str {
        match self {
            Self::ZonePopulation => "zone_population",
            Self::PriorityZones => "priority_zones",
            Self::RouteRiskMargin => "route_risk_margin",
            Self::TotalImpact => "total_impact",
            Self::ShelterCapacity => "shelter_capacity",
            Self::Help => "help",
            Self::Unrecognized => "unrecognized",
        }
    }

    /// Planning stage the answer is computed from, if any.
    pub fn required_input(self) -> Option<&'static str> {
        match self {
            Self::ZonePopulation | Self::PriorityZones => Some("demand"),
            Self::RouteRiskMargin => Some("transport"),
            Self::TotalImpact => Some("hazard"),
            Self::ShelterCapacity => Some("shelter"),
            Self::Help | Self::Unrecognized => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub intent: Intent,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaRequest {
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaResponse {
    pub answer: String,
    pub intent: Intent,
    pub version: u64,
}
