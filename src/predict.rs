use std::sync::Arc;

use serde_json::Value;

use crate::model::{Classifier, ModelError};
use crate::types::{FeatureVector, PredictionRequest, PredictionResponse};

/// Returned when the classifier cannot estimate probabilities.
pub const FALLBACK_PROBABILITIES: [f64; 3] = [0.33, 0.33, 0.34];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PredictError {
    #[error("{0}")]
    Validation(String),
    #[error("Model not loaded properly")]
    ModelUnavailable,
    #[error("{0}")]
    Internal(String),
}

impl From<ModelError> for PredictError {
    fn from(error: ModelError) -> Self {
        PredictError::Internal(error.to_string())
    }
}

pub struct PredictionService {
    model: Option<Arc<dyn Classifier>>,
}

impl PredictionService {
    pub fn new(model: Option<Arc<dyn Classifier>>) -> Self {
        Self { model }
    }

    pub fn model_loaded(&self) -> bool {
        self.model.is_some()
    }

    pub fn predict(&self, body: &Value) -> Result<PredictionResponse, PredictError> {
        // Fields are checked before the model so a malformed request reports
        // what is wrong with it even when no model is available.
        let request = PredictionRequest::from_json(body).map_err(PredictError::Validation)?;
        let features = request.features();

        let model = self.model.as_ref().ok_or(PredictError::ModelUnavailable)?;
        let risk_level = model.predict(&features)?;
        let probabilities = estimate_probabilities(model.as_ref(), &features);

        Ok(PredictionResponse {
            risk_level,
            probabilities,
        })
    }
}

fn estimate_probabilities(model: &dyn Classifier, features: &FeatureVector) -> Vec<f64> {
    if !model.supports_proba() {
        return FALLBACK_PROBABILITIES.to_vec();
    }

    match model.predict_proba(features) {
        Ok(probabilities) if probabilities.iter().all(|value| value.is_finite()) => probabilities,
        Ok(_) => {
            log::warn!("[PREDICT] Non-finite probabilities, using fallback distribution");
            FALLBACK_PROBABILITIES.to_vec()
        }
        Err(error) => {
            log::warn!("[PREDICT] Probability estimation failed: {}", error);
            FALLBACK_PROBABILITIES.to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::Label;

    struct FixedClassifier {
        label: Label,
        proba: Option<Result<Vec<f64>, String>>,
    }

    impl Classifier for FixedClassifier {
        fn predict(&self, _features: &FeatureVector) -> Result<Label, ModelError> {
            Ok(self.label.clone())
        }

        fn supports_proba(&self) -> bool {
            self.proba.is_some()
        }

        fn predict_proba(&self, _features: &FeatureVector) -> Result<Vec<f64>, ModelError> {
            match &self.proba {
                Some(Ok(values)) => Ok(values.clone()),
                Some(Err(message)) => Err(ModelError::Inference(message.clone())),
                None => Err(ModelError::ProbaUnsupported),
            }
        }
    }

    struct BrokenClassifier;

    impl Classifier for BrokenClassifier {
        fn predict(&self, _features: &FeatureVector) -> Result<Label, ModelError> {
            Err(ModelError::Inference("tree node 4 missing".to_string()))
        }
    }

    struct RecordingClassifier;

    impl Classifier for RecordingClassifier {
        fn predict(&self, features: &FeatureVector) -> Result<Label, ModelError> {
            Ok(json!(features.as_slice()))
        }
    }

    fn service(classifier: impl Classifier + 'static) -> PredictionService {
        PredictionService::new(Some(Arc::new(classifier)))
    }

    fn valid_body() -> Value {
        json!({"age": 25, "systolicBP": 120, "diastolicBP": 80, "bs": 7.0, "bodyTemp": 98})
    }

    #[test]
    fn returns_label_and_model_probabilities() {
        let service = service(FixedClassifier {
            label: json!("low risk"),
            proba: Some(Ok(vec![0.7, 0.2, 0.1])),
        });

        let response = service.predict(&valid_body()).unwrap();
        assert_eq!(response.risk_level, json!("low risk"));
        assert_eq!(response.probabilities, vec![0.7, 0.2, 0.1]);
    }

    #[test]
    fn passes_features_in_training_order() {
        let response = service(RecordingClassifier).predict(&valid_body()).unwrap();
        assert_eq!(response.risk_level, json!([25.0, 120.0, 80.0, 7.0, 98.0]));
    }

    #[test]
    fn falls_back_when_probabilities_are_unsupported() {
        let service = service(FixedClassifier {
            label: json!(2),
            proba: None,
        });
        let response = service.predict(&valid_body()).unwrap();
        assert_eq!(response.probabilities, vec![0.33, 0.33, 0.34]);
    }

    #[test]
    fn falls_back_when_probability_estimation_fails() {
        let failing = service(FixedClassifier {
            label: json!("mid risk"),
            proba: Some(Err("boom".to_string())),
        });
        assert_eq!(
            failing.predict(&valid_body()).unwrap().probabilities,
            vec![0.33, 0.33, 0.34]
        );

        let non_finite = service(FixedClassifier {
            label: json!("mid risk"),
            proba: Some(Ok(vec![f64::NAN, 0.5, 0.5])),
        });
        assert_eq!(
            non_finite.predict(&valid_body()).unwrap().probabilities,
            vec![0.33, 0.33, 0.34]
        );
    }

    #[test]
    fn missing_model_is_reported_after_validation() {
        let service = PredictionService::new(None);
        assert!(!service.model_loaded());
        assert_eq!(
            service.predict(&valid_body()),
            Err(PredictError::ModelUnavailable)
        );
        assert!(matches!(
            service.predict(&json!({"age": 25, "systolicBP": 120})),
            Err(PredictError::Validation(_))
        ));
    }

    #[test]
    fn inference_failures_become_internal_errors() {
        let error = service(BrokenClassifier).predict(&valid_body()).unwrap_err();
        assert_eq!(
            error,
            PredictError::Internal("inference failed: tree node 4 missing".to_string())
        );
    }

    #[test]
    fn repeated_requests_are_identical() {
        let service = service(FixedClassifier {
            label: json!("high risk"),
            proba: Some(Ok(vec![0.1, 0.1, 0.8])),
        });
        let first = service.predict(&valid_body()).unwrap();
        let second = service.predict(&valid_body()).unwrap();
        assert_eq!(first, second);
    }
}
