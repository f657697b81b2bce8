//! Client for the VecPic image-processing backend.
//!
//! An [`uploader::UploadSession`] holds the picked photo and the chosen preset,
//! sends them to the server as one multipart/form-data request and keeps the
//! returned raster image or SVG markup for the caller to display or save.

pub mod config;
pub mod errors;
pub mod export;
pub mod image_processor;
pub mod multipart;
pub mod photo_source;
pub mod security;
pub mod uploader;

pub use config::{ClientConfig, Preset, ResponseMode};
pub use errors::{AppError, AppResult};
pub use uploader::{ResultPayload, SessionSnapshot, SessionStatus, SubmitOutcome, UploadSession};
