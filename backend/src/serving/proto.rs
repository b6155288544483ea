//! Subset of the TensorFlow Serving predict API, tag-compatible with
//! `tensorflow_serving/apis/predict.proto` and the tensorflow framework
//! protos it imports. Only the fields the gateway touches are declared;
//! unknown fields in responses are skipped by the decoder.

use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum DataType {
    DtInvalid = 0,
    DtFloat = 1,
    DtInt32 = 3,
    DtString = 7,
    DtInt64 = 9,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TensorShapeProto {
    #[prost(message, repeated, tag = "2")]
    pub dim: Vec<tensor_shape_proto::Dim>,
}

pub mod tensor_shape_proto {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Dim {
        #[prost(int64, tag = "1")]
        pub size: i64,
        #[prost(string, tag = "2")]
        pub name: String,
    }
}

impl TensorShapeProto {
    pub fn from_sizes(sizes: &[i64]) -> Self {
        Self {
            dim: sizes
                .iter()
                .map(|&size| tensor_shape_proto::Dim {
                    size,
                    name: String::new(),
                })
                .collect(),
        }
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TensorProto {
    #[prost(enumeration = "DataType", tag = "1")]
    pub dtype: i32,
    #[prost(message, optional, tag = "2")]
    pub tensor_shape: Option<TensorShapeProto>,
    #[prost(int32, tag = "3")]
    pub version_number: i32,
    #[prost(bytes = "vec", tag = "4")]
    pub tensor_content: Vec<u8>,
    #[prost(float, repeated, tag = "5")]
    pub float_val: Vec<f32>,
    #[prost(int32, repeated, tag = "7")]
    pub int_val: Vec<i32>,
    #[prost(bytes = "vec", repeated, tag = "8")]
    pub string_val: Vec<Vec<u8>>,
    #[prost(int64, repeated, tag = "10")]
    pub int64_val: Vec<i64>,
}

impl TensorProto {
    /// A `DT_STRING` tensor of shape `[n]` holding the given byte strings.
    pub fn strings(values: Vec<Vec<u8>>) -> Self {
        Self {
            dtype: DataType::DtString as i32,
            tensor_shape: Some(TensorShapeProto::from_sizes(&[values.len() as i64])),
            string_val: values,
            ..Default::default()
        }
    }

    #[cfg(test)]
    pub fn int64s(values: Vec<i64>) -> Self {
        Self {
            dtype: DataType::DtInt64 as i32,
            tensor_shape: Some(TensorShapeProto::from_sizes(&[values.len() as i64])),
            int64_val: values,
            ..Default::default()
        }
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ModelSpec {
    #[prost(string, tag = "1")]
    pub name: String,
    /// `google.protobuf.Int64Value`
    #[prost(message, optional, tag = "2")]
    pub version: Option<i64>,
    #[prost(string, tag = "3")]
    pub signature_name: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PredictRequest {
    #[prost(message, optional, tag = "1")]
    pub model_spec: Option<ModelSpec>,
    #[prost(map = "string, message", tag = "2")]
    pub inputs: HashMap<String, TensorProto>,
    #[prost(string, repeated, tag = "3")]
    pub output_filter: Vec<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PredictResponse {
    #[prost(map = "string, message", tag = "1")]
    pub outputs: HashMap<String, TensorProto>,
    #[prost(message, optional, tag = "2")]
    pub model_spec: Option<ModelSpec>,
}

pub mod prediction_service_client {
    use super::{PredictRequest, PredictResponse};
    use tonic::codegen::http::uri::PathAndQuery;
    use tonic::transport::Channel;

    const PREDICT_PATH: &str = "/tensorflow.serving.PredictionService/Predict";

    /// Unary client for `tensorflow.serving.PredictionService`.
    #[derive(Debug, Clone)]
    pub struct PredictionServiceClient {
        inner: tonic::client::Grpc<Channel>,
    }

    impl PredictionServiceClient {
        pub fn new(channel: Channel) -> Self {
            Self {
                inner: tonic::client::Grpc::new(channel),
            }
        }

        pub async fn predict(
            &mut self,
            request: impl tonic::IntoRequest<PredictRequest>,
        ) -> Result<tonic::Response<PredictResponse>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = PathAndQuery::from_static(PREDICT_PATH);
            self.inner
                .unary(request.into_request(), path, codec)
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn string_tensor_has_shape_of_value_count() {
        let tensor = TensorProto::strings(vec![b"abc".to_vec()]);
        assert_eq!(tensor.dtype(), DataType::DtString);
        let dims: Vec<i64> = tensor
            .tensor_shape
            .as_ref()
            .unwrap()
            .dim
            .iter()
            .map(|d| d.size)
            .collect();
        assert_eq!(dims, vec![1]);
        assert_eq!(tensor.string_val, vec![b"abc".to_vec()]);
    }

    #[test]
    fn response_decoder_skips_fields_it_does_not_model() {
        // outputs{"classes": TensorProto{dtype=DT_INT64, int64_val=[7], half_val(13)=[1]}}
        let mut tensor = Vec::new();
        TensorProto::int64s(vec![7]).encode(&mut tensor).unwrap();
        // field 13, varint: half_val
        tensor.extend_from_slice(&[13 << 3, 1]);

        let mut entry = Vec::new();
        prost::encoding::string::encode(1, &"classes".to_string(), &mut entry);
        prost::encoding::bytes::encode(2, &tensor, &mut entry);

        let mut wire = Vec::new();
        prost::encoding::bytes::encode(1, &entry, &mut wire);

        let response = PredictResponse::decode(wire.as_slice()).unwrap();
        assert_eq!(response.outputs["classes"].int64_val, vec![7]);
    }
}
