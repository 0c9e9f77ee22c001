//! Property report data model
//!
//! Mirrors the JSON the report model is forced to produce. Every field except
//! `deep_analysis` is required; a response missing any of them fails to
//! deserialize and is treated as a schema failure.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyReport {
    pub address: String,
    pub postcode: String,
    pub broadband: Broadband,
    pub shops: Vec<Amenity>,
    pub schools: Vec<School>,
    pub crime: Crime,
    pub transport: Vec<Amenity>,
    pub healthcare: Vec<Amenity>,
    pub gyms: Vec<Amenity>,
    pub flood_risk: FloodRisk,
    pub summary: String,
    /// Filled in locally by the deep-dive stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deep_analysis: Option<String>,
}

impl PropertyReport {
    /// Append one streamed deep-dive chunk
    pub fn append_deep_analysis(&mut self, chunk: &str) {
        self.deep_analysis
            .get_or_insert_with(String::new)
            .push_str(chunk);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Broadband {
    pub providers: Vec<String>,
    pub max_speed: String,
    pub upload_speed: String,
    pub latency: String,
    pub fiber_available: bool,
    pub description: String,
}

/// A nearby place (shop, station, surgery, gym)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Amenity {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub distance: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct School {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub ofsted_rating: String,
    pub distance: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Crime {
    pub level: String,
    pub recent_stats: String,
    pub common_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloodRisk {
    /// Raw label as produced by the model
    pub risk_level: String,
    pub details: String,
}

impl FloodRisk {
    pub fn level(&self) -> FloodRiskLevel {
        FloodRiskLevel::from_label(&self.risk_level)
    }
}

/// Flood risk severity. The label set is open; unknown labels are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FloodRiskLevel {
    VeryLow,
    Low,
    Medium,
    High,
    Other(String),
}

impl FloodRiskLevel {
    pub fn from_label(label: &str) -> Self {
        let normalized: String = label
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match normalized.as_str() {
            "verylow" => FloodRiskLevel::VeryLow,
            "low" => FloodRiskLevel::Low,
            "medium" => FloodRiskLevel::Medium,
            "high" => FloodRiskLevel::High,
            _ => FloodRiskLevel::Other(label.trim().to_string()),
        }
    }

    /// Whether the dashboard should highlight this level
    pub fn is_elevated(&self) -> bool {
        matches!(self, FloodRiskLevel::Medium | FloodRiskLevel::High)
    }
}

impl fmt::Display for FloodRiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FloodRiskLevel::VeryLow => write!(f, "Very Low"),
            FloodRiskLevel::Low => write!(f, "Low"),
            FloodRiskLevel::Medium => write!(f, "Medium"),
            FloodRiskLevel::High => write!(f, "High"),
            FloodRiskLevel::Other(label) => write!(f, "{}", label),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn sample_report() -> PropertyReport {
        PropertyReport {
            address: "10 Downing Street, London".to_string(),
            postcode: "SW1A 2AA".to_string(),
            broadband: Broadband {
                providers: vec!["BT".to_string(), "Sky".to_string()],
                max_speed: "900 Mbps".to_string(),
                upload_speed: "110 Mbps".to_string(),
                latency: "8ms".to_string(),
                fiber_available: true,
                description: "Full fibre available".to_string(),
            },
            shops: vec![Amenity {
                name: "Tesco Express".to_string(),
                kind: "Supermarket".to_string(),
                distance: "0.3 miles".to_string(),
            }],
            schools: vec![School {
                name: "St Mary's".to_string(),
                kind: "Primary".to_string(),
                ofsted_rating: "Outstanding".to_string(),
                distance: "0.5 miles".to_string(),
            }],
            crime: Crime {
                level: "Medium".to_string(),
                recent_stats: "Below the London average".to_string(),
                common_types: vec!["Theft".to_string()],
            },
            transport: vec![Amenity {
                name: "Westminster".to_string(),
                kind: "Underground".to_string(),
                distance: "0.2 miles".to_string(),
            }],
            healthcare: vec![],
            gyms: vec![],
            flood_risk: FloodRisk {
                risk_level: "Low".to_string(),
                details: "Outside flood zones".to_string(),
            },
            summary: "A central, well-connected location.".to_string(),
            deep_analysis: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::sample_report;
    use super::*;

    #[test]
    fn test_serializes_camel_case_and_type() {
        let json = serde_json::to_value(sample_report()).unwrap();
        assert_eq!(json["floodRisk"]["riskLevel"], "Low");
        assert_eq!(json["broadband"]["fiberAvailable"], true);
        assert_eq!(json["schools"][0]["ofstedRating"], "Outstanding");
        assert_eq!(json["shops"][0]["type"], "Supermarket");
        assert!(json.get("deepAnalysis").is_none());
    }

    #[test]
    fn test_flood_risk_levels() {
        assert_eq!(FloodRiskLevel::from_label("Very Low"), FloodRiskLevel::VeryLow);
        assert_eq!(FloodRiskLevel::from_label("very-low"), FloodRiskLevel::VeryLow);
        assert_eq!(FloodRiskLevel::from_label("LOW"), FloodRiskLevel::Low);
        assert_eq!(FloodRiskLevel::from_label("Medium"), FloodRiskLevel::Medium);
        assert_eq!(FloodRiskLevel::from_label("High"), FloodRiskLevel::High);
        assert_eq!(
            FloodRiskLevel::from_label(" Moderate "),
            FloodRiskLevel::Other("Moderate".to_string())
        );
    }

    #[test]
    fn test_flood_risk_display_keeps_unknown_label() {
        assert_eq!(FloodRiskLevel::VeryLow.to_string(), "Very Low");
        assert_eq!(FloodRiskLevel::Other("Significant".into()).to_string(), "Significant");
        assert!(FloodRiskLevel::High.is_elevated());
        assert!(!FloodRiskLevel::Low.is_elevated());
    }

    #[test]
    fn test_append_deep_analysis() {
        let mut report = sample_report();
        report.append_deep_analysis("## Gentrification");
        report.append_deep_analysis(" potential");
        assert_eq!(report.deep_analysis.as_deref(), Some("## Gentrification potential"));
    }
}
