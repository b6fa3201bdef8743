//! HTTP service that classifies uploaded images with a frozen, pre-trained
//! network and answers with the predicted label as JSON or an HTML page.

pub mod config;
pub mod error;
pub mod inference;
pub mod labels;
pub mod model;
pub mod preprocess;
pub mod routes;
pub mod upload;
pub mod utils;

pub use config::Settings;
pub use error::{AppError, ConfigError, ModelError};
pub use inference::{InferenceService, OutputPolicy, Prediction};
pub use routes::{router, AppState};
