//! Response schema sent with every report request
//!
//! Kept in sync with [`super::model::PropertyReport`] by the tests below.

use serde_json::{json, Value};

fn string() -> Value {
    json!({ "type": "STRING" })
}

fn string_list() -> Value {
    json!({ "type": "ARRAY", "items": string() })
}

fn amenity_list() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "name": string(),
                "type": string(),
                "distance": string()
            },
            "required": ["name", "type", "distance"]
        }
    })
}

/// Schema forcing the model to return a complete report
pub fn report_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "address": string(),
            "postcode": string(),
            "broadband": {
                "type": "OBJECT",
                "properties": {
                    "providers": string_list(),
                    "maxSpeed": string(),
                    "uploadSpeed": string(),
                    "latency": string(),
                    "fiberAvailable": { "type": "BOOLEAN" },
                    "description": string()
                },
                "required": ["providers", "maxSpeed", "uploadSpeed", "latency", "fiberAvailable", "description"]
            },
            "shops": amenity_list(),
            "schools": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "name": string(),
                        "type": string(),
                        "ofstedRating": string(),
                        "distance": string()
                    },
                    "required": ["name", "type", "ofstedRating", "distance"]
                }
            },
            "crime": {
                "type": "OBJECT",
                "properties": {
                    "level": string(),
                    "recentStats": string(),
                    "commonTypes": string_list()
                },
                "required": ["level", "recentStats", "commonTypes"]
            },
            "transport": amenity_list(),
            "healthcare": amenity_list(),
            "gyms": amenity_list(),
            "floodRisk": {
                "type": "OBJECT",
                "properties": {
                    "riskLevel": string(),
                    "details": string()
                },
                "required": ["riskLevel", "details"]
            },
            "summary": string()
        },
        "required": [
            "address", "postcode", "broadband", "shops", "schools", "crime",
            "transport", "healthcare", "gyms", "floodRisk", "summary"
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::model::fixtures::sample_report;

    #[test]
    fn test_every_property_is_required() {
        let schema = report_schema();
        let properties = schema["properties"].as_object().unwrap();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();

        assert_eq!(properties.len(), required.len());
        for key in properties.keys() {
            assert!(required.contains(&key.as_str()), "{} not required", key);
        }
    }

    #[test]
    fn test_schema_matches_model_fields() {
        let json = serde_json::to_value(sample_report()).unwrap();
        let schema = report_schema();
        let mut model_keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        let mut schema_keys: Vec<&String> = schema["properties"].as_object().unwrap().keys().collect();
        model_keys.sort();
        schema_keys.sort();
        assert_eq!(model_keys, schema_keys);
    }
}
