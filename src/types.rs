use serde::Serialize;
use serde_json::{Map, Value};

// ============================================================================
// FEATURES
// ============================================================================

/// Column order the classifier was trained against.
pub const FEATURE_ORDER: [&str; 5] = ["age", "systolicBP", "diastolicBP", "bs", "bodyTemp"];

pub const FEATURE_COUNT: usize = FEATURE_ORDER.len();

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.0.get(index).copied()
    }
}

/// Label as stored in the model artifact; the service never interprets it.
pub type Label = Value;

// ============================================================================
// REQUEST
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRequest {
    pub age: f64,
    pub systolic_bp: f64,
    pub diastolic_bp: f64,
    pub bs: f64,
    pub body_temp: f64,
}

impl PredictionRequest {
    pub fn from_json(body: &Value) -> Result<Self, String> {
        let object = body
            .as_object()
            .ok_or_else(|| "Request body must be a JSON object".to_string())?;

        Ok(PredictionRequest {
            age: numeric_field(object, "age")?,
            systolic_bp: numeric_field(object, "systolicBP")?,
            diastolic_bp: numeric_field(object, "diastolicBP")?,
            bs: numeric_field(object, "bs")?,
            body_temp: numeric_field(object, "bodyTemp")?,
        })
    }

    pub fn features(&self) -> FeatureVector {
        FeatureVector([
            self.age,
            self.systolic_bp,
            self.diastolic_bp,
            self.bs,
            self.body_temp,
        ])
    }
}

fn numeric_field(object: &Map<String, Value>, name: &str) -> Result<f64, String> {
    let value = object
        .get(name)
        .ok_or_else(|| format!("Missing required field: '{}'", name))?;

    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };

    match number {
        Some(number) if number.is_finite() => Ok(number),
        _ => Err(format!("Field '{}' must be numeric", name)),
    }
}

// ============================================================================
// RESPONSES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResponse {
    pub risk_level: Label,
    pub probabilities: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_loaded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn features_follow_training_order() {
        let body = json!({
            "bodyTemp": 98,
            "bs": 7.0,
            "diastolicBP": 80,
            "systolicBP": 120,
            "age": 25
        });
        let request = PredictionRequest::from_json(&body).unwrap();
        assert_eq!(request.features(), FeatureVector([25.0, 120.0, 80.0, 7.0, 98.0]));
    }

    #[test]
    fn reports_first_missing_field() {
        let body = json!({"age": 25, "systolicBP": 120});
        let error = PredictionRequest::from_json(&body).unwrap_err();
        assert_eq!(error, "Missing required field: 'diastolicBP'");
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let body = json!({
            "age": "25",
            "systolicBP": " 120 ",
            "diastolicBP": 80,
            "bs": "7.5",
            "bodyTemp": 98.6
        });
        let request = PredictionRequest::from_json(&body).unwrap();
        assert_eq!(request.systolic_bp, 120.0);
        assert_eq!(request.bs, 7.5);
    }

    #[test]
    fn rejects_non_numeric_values() {
        for bad in [json!(null), json!(true), json!("abc"), json!([1]), json!({"v": 1}), json!("NaN")] {
            let body = json!({
                "age": bad,
                "systolicBP": 120,
                "diastolicBP": 80,
                "bs": 7.0,
                "bodyTemp": 98
            });
            let error = PredictionRequest::from_json(&body).unwrap_err();
            assert_eq!(error, "Field 'age' must be numeric");
        }
    }

    #[test]
    fn rejects_non_object_bodies() {
        assert!(PredictionRequest::from_json(&json!([25, 120, 80, 7.0, 98])).is_err());
        assert!(PredictionRequest::from_json(&json!("age")).is_err());
    }

    #[test]
    fn field_names_are_case_sensitive() {
        let body = json!({
            "age": 25,
            "systolicbp": 120,
            "diastolicBP": 80,
            "bs": 7.0,
            "bodyTemp": 98
        });
        let error = PredictionRequest::from_json(&body).unwrap_err();
        assert!(error.contains("systolicBP"));
    }
}
