use serde::{Deserialize, Serialize};

const CRITICAL_RECOMMENDATIONS: &[&str] = &[
    "Stop all entries immediately",
    "Activate emergency protocols",
    "Deploy security personnel",
    "Open emergency exits",
    "Alert emergency services",
];

const WARNING_RECOMMENDATIONS: &[&str] = &[
    "Reduce entry rate",
    "Increase monitoring",
    "Prepare dispersal plan",
    "Alert security team",
    "Monitor crowd flow",
];

const SAFE_RECOMMENDATIONS: &[&str] = &["Continue monitoring", "Maintain regular checks"];

/// Crowd alert level, ordered from least to most severe
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    #[default]
    Safe,
    Warning,
    Critical,
}

impl AlertStatus {
    pub const ALL: [AlertStatus; 3] = [
        AlertStatus::Safe,
        AlertStatus::Warning,
        AlertStatus::Critical,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            AlertStatus::Safe => "SAFE",
            AlertStatus::Warning => "WARNING",
            AlertStatus::Critical => "CRITICAL",
        }
    }

    /// Operator-facing headline
    pub const fn message(self) -> &'static str {
        match self {
            AlertStatus::Safe => "Normal Operations",
            AlertStatus::Warning => "Approaching Capacity",
            AlertStatus::Critical => "Overcrowding Detected",
        }
    }

    /// Recommended actions, most urgent first
    pub const fn recommendations(self) -> &'static [&'static str] {
        match self {
            AlertStatus::Safe => SAFE_RECOMMENDATIONS,
            AlertStatus::Warning => WARNING_RECOMMENDATIONS,
            AlertStatus::Critical => CRITICAL_RECOMMENDATIONS,
        }
    }

    pub fn requires_action(self) -> bool {
        self != AlertStatus::Safe
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SAFE" => Ok(AlertStatus::Safe),
            "WARNING" => Ok(AlertStatus::Warning),
            "CRITICAL" => Ok(AlertStatus::Critical),
            _ => Err(format!("Invalid alert status: {}", s)),
        }
    }
}

/// Venue capacity derived from the floor area
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapacityEstimate {
    /// Area in square metres actually used for the estimate
    pub area: f64,
    pub safe_capacity: u64,
    pub max_capacity: u64,
}

/// Classification of a people count against a venue's capacities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertResult {
    pub status: AlertStatus,

    /// Occupancy relative to max capacity, may exceed 100
    pub percentage: f64,

    pub message: String,
    pub recommendations: Vec<String>,
}

impl AlertResult {
    pub fn new(status: AlertStatus, percentage: f64) -> Self {
        Self {
            status,
            percentage,
            message: status.message().to_string(),
            recommendations: status
                .recommendations()
                .iter()
                .map(|r| r.to_string())
                .collect(),
        }
    }

    /// Leading recommendations shown to operators, empty while safe
    pub fn highlighted_actions(&self, limit: usize) -> &[String] {
        if !self.status.requires_action() {
            return &[];
        }
        &self.recommendations[..limit.min(self.recommendations.len())]
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapacityRequest {
    /// Venue area in square metres; missing or non-positive uses the default
    #[serde(default)]
    pub area: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateAlertRequest {
    pub count: u64,
    #[serde(default)]
    pub safe_capacity: Option<u64>,
    #[serde(default)]
    pub max_capacity: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeVideoRequest {
    /// Video file, relative to the video root
    pub path: String,
}
