use async_trait::async_trait;
use std::collections::HashMap;
use tonic::transport::Endpoint;

use super::proto::prediction_service_client::PredictionServiceClient;
use super::proto::{ModelSpec, PredictRequest, PredictResponse, TensorProto};
use crate::config::InferenceConfig;

pub const IMAGE_INPUT: &str = "image_bytes";
pub const CLASSES_OUTPUT: &str = "classes";

#[derive(Debug, thiserror::Error)]
pub enum PredictionError {
    #[error("Invalid inference endpoint {endpoint}: {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: tonic::transport::Error,
    },
    #[error("Cannot connect to inference server at {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: tonic::transport::Error,
    },
    #[error("Predict call failed: {0}")]
    Rpc(#[from] tonic::Status),
    #[error("Prediction response has no '{0}' output")]
    MissingOutput(&'static str),
    #[error("Prediction output '{0}' is empty")]
    EmptyOutput(&'static str),
}

/// Anything that can turn image bytes into a predicted class id.
#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict_class(&self, image: Vec<u8>) -> Result<i64, PredictionError>;
}

/// Model spec sent with every request.
#[derive(Debug, Clone)]
pub struct ModelTarget {
    pub name: String,
    pub signature_name: String,
    pub version: Option<i64>,
}

pub fn build_predict_request(target: &ModelTarget, image: Vec<u8>) -> PredictRequest {
    let mut inputs = HashMap::new();
    inputs.insert(IMAGE_INPUT.to_string(), TensorProto::strings(vec![image]));
    PredictRequest {
        model_spec: Some(ModelSpec {
            name: target.name.clone(),
            version: target.version,
            signature_name: target.signature_name.clone(),
        }),
        inputs,
        output_filter: Vec::new(),
    }
}

/// First value of the `classes` output.
pub fn top_class(response: &PredictResponse) -> Result<i64, PredictionError> {
    let classes = response
        .outputs
        .get(CLASSES_OUTPUT)
        .ok_or(PredictionError::MissingOutput(CLASSES_OUTPUT))?;
    classes
        .int64_val
        .first()
        .copied()
        .ok_or(PredictionError::EmptyOutput(CLASSES_OUTPUT))
}

/// TensorFlow Serving over gRPC. Opens a fresh connection per call.
#[derive(Clone)]
pub struct TfServingPredictor {
    endpoint: Endpoint,
    target: ModelTarget,
}

impl TfServingPredictor {
    pub fn new(config: &InferenceConfig) -> Result<Self, PredictionError> {
        let uri = config.endpoint_uri();
        let endpoint = Endpoint::from_shared(uri.clone())
            .map_err(|source| PredictionError::InvalidEndpoint {
                endpoint: uri,
                source,
            })?
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout);

        Ok(Self {
            endpoint,
            target: ModelTarget {
                name: config.model_name.clone(),
                signature_name: config.signature_name.clone(),
                version: config.model_version,
            },
        })
    }

    pub fn endpoint_uri(&self) -> String {
        self.endpoint.uri().to_string()
    }
}

#[async_trait]
impl Predictor for TfServingPredictor {
    async fn predict_class(&self, image: Vec<u8>) -> Result<i64, PredictionError> {
        log::debug!("Connecting to inference server at {}", self.endpoint.uri());
        let channel = self
            .endpoint
            .connect()
            .await
            .map_err(|source| PredictionError::Connect {
                endpoint: self.endpoint.uri().to_string(),
                source,
            })?;

        let mut client = PredictionServiceClient::new(channel);
        let request = build_predict_request(&self.target, image);
        let response = client.predict(request).await?.into_inner();

        top_class(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serving::proto::DataType;
    use std::time::Duration;

    fn target() -> ModelTarget {
        ModelTarget {
            name: "resnet".into(),
            signature_name: "serving_default".into(),
            version: None,
        }
    }

    fn response_with(outputs: Vec<(&str, TensorProto)>) -> PredictResponse {
        PredictResponse {
            outputs: outputs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            model_spec: None,
        }
    }

    #[test]
    fn request_carries_one_string_tensor_of_shape_one() {
        let request = build_predict_request(&target(), vec![0xff, 0xd8, 0xff]);

        let spec = request.model_spec.as_ref().unwrap();
        assert_eq!(spec.name, "resnet");
        assert_eq!(spec.signature_name, "serving_default");
        assert_eq!(spec.version, None);

        assert_eq!(request.inputs.len(), 1);
        let input = &request.inputs["image_bytes"];
        assert_eq!(input.dtype(), DataType::DtString);
        let shape = input.tensor_shape.as_ref().unwrap();
        assert_eq!(shape.dim.len(), 1);
        assert_eq!(shape.dim[0].size, 1);
        assert_eq!(input.string_val, vec![vec![0xff, 0xd8, 0xff]]);
    }

    #[test]
    fn pinned_version_is_sent() {
        let mut target = target();
        target.version = Some(4);
        let request = build_predict_request(&target, Vec::new());
        assert_eq!(request.model_spec.unwrap().version, Some(4));
    }

    #[test]
    fn top_class_takes_first_value() {
        let response = response_with(vec![("classes", TensorProto::int64s(vec![286, 3]))]);
        assert_eq!(top_class(&response).unwrap(), 286);
    }

    #[test]
    fn top_class_without_classes_output_fails_cleanly() {
        let response = response_with(vec![("probabilities", TensorProto::default())]);
        assert!(matches!(
            top_class(&response),
            Err(PredictionError::MissingOutput("classes"))
        ));
    }

    #[test]
    fn top_class_with_empty_output_fails_cleanly() {
        let response = response_with(vec![("classes", TensorProto::int64s(Vec::new()))]);
        assert!(matches!(
            top_class(&response),
            Err(PredictionError::EmptyOutput("classes"))
        ));
    }

    fn unreachable_config() -> InferenceConfig {
        InferenceConfig {
            host: "127.0.0.1".into(),
            port: "1".into(),
            model_name: "resnet".into(),
            signature_name: "serving_default".into(),
            model_version: None,
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(2),
        }
    }

    #[actix_web::test]
    async fn unreachable_server_is_a_connect_error() {
        let predictor = TfServingPredictor::new(&unreachable_config()).unwrap();
        assert!(predictor.endpoint_uri().starts_with("http://127.0.0.1:1"));
        let err = predictor.predict_class(b"img".to_vec()).await.unwrap_err();
        assert!(matches!(err, PredictionError::Connect { .. }), "{err:?}");
    }

    #[test]
    fn garbage_host_is_rejected_up_front() {
        let mut config = unreachable_config();
        config.host = "bad host".into();
        assert!(matches!(
            TfServingPredictor::new(&config),
            Err(PredictionError::InvalidEndpoint { .. })
        ));
    }
}
