//! Blood-pressure risk classification for prenatal checkups.
//!
//! Pure logic. The tier table is evaluated top-down and the first matching
//! row wins; either reading alone can escalate the tier. Range validation of
//! the raw fields lives in [`crate::validation`] and is independent of this
//! table.

use std::fmt;

use serde::{Deserialize, Serialize};

// Tier thresholds (mmHg). A row matches when systolic or diastolic reaches
// its bound.
const EMERGENCY_SYSTOLIC: i32 = 180;
const EMERGENCY_DIASTOLIC: i32 = 120;
const SEVERE_SYSTOLIC: i32 = 160;
const SEVERE_DIASTOLIC: i32 = 110;
const HIGH_SYSTOLIC: i32 = 140;
const HIGH_DIASTOLIC: i32 = 90;
const ELEVATED_SYSTOLIC: i32 = 130;
const ELEVATED_DIASTOLIC: i32 = 85;
// Low matches when either reading falls below its bound.
const LOW_SYSTOLIC: i32 = 90;
const LOW_DIASTOLIC: i32 = 60;

/// Severity tier, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BpSeverity {
    Success,
    Info,
    Warning,
    Danger,
}

impl BpSeverity {
    /// Whether a reading at this tier should be escalated to peers.
    pub fn is_alarming(self) -> bool {
        self >= BpSeverity::Warning
    }
}

/// The classification bucket a reading falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BpStatus {
    HypertensiveEmergency,
    SevereHypertension,
    High,
    Elevated,
    Low,
    Normal,
}

impl BpStatus {
    pub fn severity(self) -> BpSeverity {
        match self {
            BpStatus::HypertensiveEmergency | BpStatus::SevereHypertension => BpSeverity::Danger,
            BpStatus::High | BpStatus::Low => BpSeverity::Warning,
            BpStatus::Elevated => BpSeverity::Info,
            BpStatus::Normal => BpSeverity::Success,
        }
    }

    /// Advisory text shown next to the reading.
    pub fn message(self) -> &'static str {
        match self {
            BpStatus::HypertensiveEmergency => {
                "Hypertensive emergency. Immediate medical attention required."
            }
            BpStatus::SevereHypertension => "Severe hypertension. Refer to a physician urgently.",
            BpStatus::High => "High blood pressure. Monitor closely and consider referral.",
            BpStatus::Elevated => "Elevated blood pressure. Recheck at the next visit.",
            BpStatus::Low => "Low blood pressure. Check for dizziness or dehydration.",
            BpStatus::Normal => "Blood pressure is within the normal range.",
        }
    }
}

/// Result of classifying a complete reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BpClassification {
    pub status: BpStatus,
    pub severity: BpSeverity,
    pub message: &'static str,
}

impl From<BpStatus> for BpClassification {
    fn from(status: BpStatus) -> Self {
        Self {
            status,
            severity: status.severity(),
            message: status.message(),
        }
    }
}

/// A blood-pressure reading in mmHg. Either half may be missing when no
/// measurement was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BloodPressure {
    pub systolic: Option<i32>,
    pub diastolic: Option<i32>,
}

impl BloodPressure {
    pub fn new(systolic: i32, diastolic: i32) -> Self {
        Self {
            systolic: Some(systolic),
            diastolic: Some(diastolic),
        }
    }

    pub fn classify(&self) -> Option<BpClassification> {
        classify(self.systolic, self.diastolic)
    }
}

impl fmt::Display for BloodPressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.systolic, self.diastolic) {
            (Some(s), Some(d)) => write!(f, "{s}/{d}"),
            (Some(s), None) => write!(f, "{s}/-"),
            (None, Some(d)) => write!(f, "-/{d}"),
            (None, None) => f.write_str("-/-"),
        }
    }
}

/// Classify a reading. Returns `None` when either half is absent.
pub fn classify(systolic: Option<i32>, diastolic: Option<i32>) -> Option<BpClassification> {
    let (s, d) = (systolic?, diastolic?);

    let status = if s >= EMERGENCY_SYSTOLIC || d >= EMERGENCY_DIASTOLIC {
        BpStatus::HypertensiveEmergency
    } else if s >= SEVERE_SYSTOLIC || d >= SEVERE_DIASTOLIC {
        BpStatus::SevereHypertension
    } else if s >= HIGH_SYSTOLIC || d >= HIGH_DIASTOLIC {
        BpStatus::High
    } else if s >= ELEVATED_SYSTOLIC || d >= ELEVATED_DIASTOLIC {
        BpStatus::Elevated
    } else if s < LOW_SYSTOLIC || d < LOW_DIASTOLIC {
        BpStatus::Low
    } else {
        BpStatus::Normal
    };

    Some(status.into())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
