pub mod client;
pub mod proto;

pub use client::{PredictionError, Predictor, TfServingPredictor};
