// Analysis boundary: the structured result the remote model returns, and the
// narrow backend trait the session talks to. Nothing here computes track data.

use std::collections::HashSet;

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::types::*;

/// Required brake input at a corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrakingZone {
    Heavy,
    Medium,
    Light,
    Lift,
    #[serde(rename = "Flat-out")]
    FlatOut,
}

impl BrakingZone {
    /// Bar count (out of 5) for the intensity meter. Flat-out fills the meter.
    pub fn intensity(&self) -> u8 {
        match self {
            BrakingZone::Heavy => 5,
            BrakingZone::Medium => 3,
            BrakingZone::Light => 2,
            BrakingZone::Lift => 1,
            BrakingZone::FlatOut => 5,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BrakingZone::Heavy => "Heavy braking",
            BrakingZone::Medium => "Medium braking",
            BrakingZone::Light => "Light braking",
            BrakingZone::Lift => "Lift",
            BrakingZone::FlatOut => "Flat-out",
        }
    }
}

/// Qualitative direction of a setup value, used for color coding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetupTrend {
    Soft,
    Medium,
    Stiff,
    Low,
    High,
    Balanced,
}

impl SetupTrend {
    /// Fill level of the setup gauge, in percent.
    pub fn level_percent(&self) -> u8 {
        match self {
            SetupTrend::Stiff | SetupTrend::High => 90,
            SetupTrend::Medium | SetupTrend::Balanced => 50,
            SetupTrend::Soft | SetupTrend::Low => 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CornerAnalysis {
    pub number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Geometry label, e.g. "Hairpin", "Chicane".
    #[serde(rename = "type")]
    pub corner_type: String,
    pub braking_zone: BrakingZone,
    pub difficulty: u8,
    pub advice: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gear: Option<u8>,
    /// Abstract SVG path for the racing line.
    #[serde(
        rename = "racingLineSVG",
        alias = "racingLine",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub racing_line: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupItem {
    pub component: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub trend: SetupTrend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Strategy {
    pub tire_wear: String,
    #[serde(default)]
    pub key_to_win: String,
    #[serde(default)]
    pub aero_strategy: String,
    /// Pit stops, or energy/regen strategy for electric classes.
    #[serde(default)]
    pub pit_strategy: String,
    pub overtaking_opportunities: String,
    #[serde(default)]
    pub setup_suggestion: String,
    #[serde(default)]
    pub detailed_setup: Vec<SetupItem>,
}

/// One timed sector. Models sometimes return a bare time string; that is accepted too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(from = "SectorDetailRepr")]
pub struct SectorDetail {
    pub time: String,
    pub description: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SectorDetailRepr {
    Time(String),
    Full {
        time: String,
        #[serde(default)]
        description: String,
    },
}

impl From<SectorDetailRepr> for SectorDetail {
    fn from(repr: SectorDetailRepr) -> Self {
        match repr {
            SectorDetailRepr::Time(time) => SectorDetail {
                time,
                description: String::new(),
            },
            SectorDetailRepr::Full { time, description } => SectorDetail { time, description },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectorStats {
    pub sector1: SectorDetail,
    pub sector2: SectorDetail,
    pub sector3: SectorDetail,
    pub estimated_lap_time: String,
}

impl SectorStats {
    /// Each sector's rounded share of the summed sector times, in percent.
    /// Times are read from their first numeric run ("32.5s" -> 32.5); unreadable
    /// times count as zero, and an all-zero total yields all-zero shares.
    pub fn shares(&self) -> [u8; 3] {
        let times = [&self.sector1, &self.sector2, &self.sector3].map(|s| parse_seconds(&s.time));
        let sum: f64 = times.iter().sum();
        let total = if sum > 0.0 { sum } else { 1.0 };
        times.map(|t| (t / total * 100.0).round().clamp(0.0, 100.0) as u8)
    }
}

fn parse_seconds(time: &str) -> f64 {
    let Some(start) = time.find(|c: char| c.is_ascii_digit() || c == '.') else {
        return 0.0;
    };
    let run: String = time[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    run.parse::<f64>().ok().filter(|t| t.is_finite()).unwrap_or(0.0)
}

/// Complete analysis returned by the remote model. Read-only for the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackAnalysis {
    pub circuit_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_guess: Option<String>,
    /// Injected locally from the request context, not produced by the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<Vehicle>,
    #[serde(default)]
    pub total_corners: u32,
    #[serde(default)]
    pub overall_character: String,
    pub corners: Vec<CornerAnalysis>,
    pub strategy: Strategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector_stats: Option<SectorStats>,
}

impl TrackAnalysis {
    /// Consistency issues worth flagging in the UI. Empty when the result looks sane.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        let mut seen = HashSet::new();
        for corner in &self.corners {
            if !(1..=10).contains(&corner.difficulty) {
                issues.push(format!(
                    "difficulty_out_of_range: corner {} has {}",
                    corner.number, corner.difficulty
                ));
            }
            if !seen.insert(corner.number) {
                issues.push(format!("duplicate_corner_number: {}", corner.number));
            }
        }

        let setup_count = self.strategy.detailed_setup.len();
        if !(4..=6).contains(&setup_count) {
            issues.push(format!("setup_item_count: expected 4-6, got {}", setup_count));
        }

        issues
    }
}

/// Media as sent to the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaPayload {
    /// Uploaded file bytes, unchanged.
    Raw { bytes: Vec<u8>, mime: String },
    /// Composited JPEG, already base64 (data-URI header stripped).
    Composited { base64: String },
}

impl MediaPayload {
    pub fn mime(&self) -> &str {
        match self {
            MediaPayload::Raw { mime, .. } => mime,
            MediaPayload::Composited { .. } => "image/jpeg",
        }
    }

    pub fn to_base64(&self) -> String {
        match self {
            MediaPayload::Raw { bytes, .. } => general_purpose::STANDARD.encode(bytes),
            MediaPayload::Composited { base64 } => base64.clone(),
        }
    }
}

/// Everything the remote model needs for one analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub media: MediaPayload,
    pub media_kind: MediaKind,
    pub context: AnalysisContext,
    /// Image uploads only; always empty for video.
    pub markers: Vec<Marker>,
}

/// The remote analysis collaborator. Implementations own the provider specifics.
#[allow(async_fn_in_trait)]
pub trait AnalysisBackend {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<TrackAnalysis, AnalysisError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "circuitName": "Suzuka",
        "locationGuess": "Japan",
        "totalCorners": 2,
        "overallCharacter": "Technical figure-eight",
        "corners": [
            {"number": 1, "type": "High-speed", "brakingZone": "Flat-out", "difficulty": 7,
             "advice": "Stay flat, small lift if unstable", "gear": 7},
            {"number": 2, "name": "Hairpin", "type": "Hairpin", "brakingZone": "Heavy",
             "difficulty": 5, "advice": "Brake in a straight line"}
        ],
        "strategy": {
            "tireWear": "High front-left",
            "overtakingOpportunities": "Into the chicane",
            "setupSuggestion": "Medium downforce",
            "detailedSetup": [
                {"component": "Front Wing", "value": "28", "unit": "deg", "trend": "High"},
                {"component": "Ride Height", "value": "5", "unit": "mm", "trend": "Low"},
                {"component": "Springs", "value": "220", "unit": "N/mm", "trend": "Stiff"},
                {"component": "ARB", "value": "Soft", "trend": "Soft"}
            ]
        },
        "sectorStats": {
            "sector1": "32.5s",
            "sector2": {"time": "40.1s", "description": "Degner and hairpin"},
            "sector3": {"time": "18.9s"},
            "estimatedLapTime": "1:31.5"
        }
    }"#;

    #[test]
    fn parses_model_output() {
        let analysis: TrackAnalysis = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(analysis.circuit_name, "Suzuka");
        assert_eq!(analysis.corners[0].braking_zone, BrakingZone::FlatOut);
        assert_eq!(analysis.corners[1].name.as_deref(), Some("Hairpin"));
        assert_eq!(analysis.strategy.detailed_setup.len(), 4);
        assert!(analysis.strategy.key_to_win.is_empty());

        let sectors = analysis.sector_stats.unwrap();
        assert_eq!(sectors.sector1.time, "32.5s");
        assert!(sectors.sector1.description.is_empty());
        assert_eq!(sectors.sector2.description, "Degner and hairpin");
        assert_eq!(sectors.sector3.time, "18.9s");
    }

    #[test]
    fn serializes_with_wire_names() {
        let analysis: TrackAnalysis = serde_json::from_str(SAMPLE).unwrap();
        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["corners"][0]["brakingZone"], "Flat-out");
        assert_eq!(json["corners"][0]["type"], "High-speed");
        assert_eq!(json["sectorStats"]["sector1"]["time"], "32.5s");
    }

    #[test]
    fn sample_is_consistent() {
        let analysis: TrackAnalysis = serde_json::from_str(SAMPLE).unwrap();
        assert!(analysis.validate().is_empty());
    }

    #[test]
    fn validate_flags_issues() {
        let mut analysis: TrackAnalysis = serde_json::from_str(SAMPLE).unwrap();
        analysis.corners[1].number = 1;
        analysis.corners[0].difficulty = 11;
        analysis.strategy.detailed_setup.truncate(2);

        let issues = analysis.validate();
        assert_eq!(issues.len(), 3);
        assert!(issues.iter().any(|i| i.starts_with("duplicate_corner_number")));
        assert!(issues.iter().any(|i| i.starts_with("difficulty_out_of_range")));
        assert!(issues.iter().any(|i| i.starts_with("setup_item_count")));
    }

    #[test]
    fn sector_shares_follow_times() {
        let analysis: TrackAnalysis = serde_json::from_str(SAMPLE).unwrap();
        let mut sectors = analysis.sector_stats.unwrap();
        sectors.sector2.time = "40.1".to_string();
        // 32.5 + 40.1 + 18.9 = 91.5
        assert_eq!(sectors.shares(), [36, 44, 21]);

        sectors.sector3.time = "n/a".to_string();
        assert_eq!(sectors.shares(), [45, 55, 0]);
    }

    #[test]
    fn sector_shares_with_zero_total() {
        let sectors = SectorStats {
            sector1: SectorDetail::default(),
            sector2: SectorDetail::default(),
            sector3: SectorDetail::default(),
            estimated_lap_time: String::new(),
        };
        assert_eq!(sectors.shares(), [0, 0, 0]);
        assert_eq!(parse_seconds("~28.4s"), 28.4);
        assert_eq!(parse_seconds("."), 0.0);
    }

    #[test]
    fn display_helpers() {
        assert_eq!(BrakingZone::Heavy.intensity(), 5);
        assert_eq!(BrakingZone::Lift.intensity(), 1);
        assert_eq!(SetupTrend::Balanced.level_percent(), 50);
        assert_eq!(SetupTrend::Stiff.level_percent(), 90);
        assert_eq!(SetupTrend::Low.level_percent(), 20);
    }

    #[test]
    fn payload_base64() {
        let raw = MediaPayload::Raw {
            bytes: b"abc".to_vec(),
            mime: "video/mp4".to_string(),
        };
        assert_eq!(raw.to_base64(), "YWJj");
        assert_eq!(raw.mime(), "video/mp4");

        let composited = MediaPayload::Composited {
            base64: "YWJj".to_string(),
        };
        assert_eq!(composited.mime(), "image/jpeg");
    }
}
