use image::ImageFormat;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use crate::config::{ClientConfig, Preset, ResponseMode};
use crate::errors::{AppError, AppResult};
use crate::image_processor;
use crate::multipart::MultipartBody;

use super::backend_client::{describe_transport_error, BackendResponse, UploadBackend};
use super::state_tracker::{RestorePoint, SessionSnapshot, SessionState, StateTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    Idle,
    ImageLoaded,
    Submitting,
    Succeeded,
    Failed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::ImageLoaded => "image loaded",
            SessionStatus::Submitting => "submitting",
            SessionStatus::Succeeded => "succeeded",
            SessionStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Server result, kept exactly as received.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultPayload {
    Raster { bytes: Vec<u8>, format: ImageFormat },
    Vector(String),
}

impl ResultPayload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ResultPayload::Raster { bytes, .. } => bytes,
            ResultPayload::Vector(markup) => markup.as_bytes(),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ResultPayload::Raster { format, .. } => image_processor::extension_for(*format),
            ResultPayload::Vector(_) => "svg",
        }
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, ResultPayload::Vector(_))
    }
}

/// How a submission ended, from the caller's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Succeeded,
    Failed { category: &'static str },
    /// The session was cancelled or reset while the request was in flight
    Discarded,
}

/// Everything a submission needs, captured when it starts.
struct SubmissionTicket {
    generation: u64,
    image: Arc<Vec<u8>>,
    filename: String,
    preset: Preset,
}

struct SessionInner {
    config: Arc<ClientConfig>,
    backend: Arc<dyn UploadBackend>,
    tracker: StateTracker,
    cancelled: Notify,
}

/// One pick → configure → submit → result cycle.
///
/// Cloning yields another handle to the same session, which is how a submission
/// is moved onto a background task while the presentation layer keeps reading
/// snapshots.
#[derive(Clone)]
pub struct UploadSession {
    inner: Arc<SessionInner>,
}

impl UploadSession {
    pub fn new(config: Arc<ClientConfig>, backend: Arc<dyn UploadBackend>) -> AppResult<Self> {
        let preset = config.default_preset()?;

        Ok(Self {
            inner: Arc::new(SessionInner {
                config,
                backend,
                tracker: StateTracker::new(SessionState::new(preset)),
                cancelled: Notify::new(),
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.tracker.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.tracker.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.tracker.read("status", |state| state.status)
    }

    /// Store a picked image. The bytes are not decoded here; displaying them is
    /// the presentation layer's business.
    pub fn set_image(&self, bytes: Vec<u8>, filename: Option<&str>) -> AppResult<()> {
        if bytes.is_empty() {
            return Err(AppError::validation("image", "Image data cannot be empty"));
        }

        let upload_name = image_processor::upload_filename(filename, &bytes);
        let size = bytes.len();

        self.inner.tracker.update("set image", |state| {
            if state.status == SessionStatus::Submitting {
                return Err(AppError::invalid_state("replace the image", state.status));
            }

            state.source_image = Some(Arc::new(bytes));
            state.filename = Some(upload_name.clone());
            state.result = None;
            state.error_message = None;
            state.restore_point = None;
            state.status = SessionStatus::ImageLoaded;
            Ok(())
        })?;

        log::info!("Loaded image {} ({} bytes)", upload_name, size);
        Ok(())
    }

    pub fn set_preset(&self, preset: Preset) -> AppResult<()> {
        let preset = self.inner.config.preset(preset.as_str())?;

        self.inner.tracker.update("set preset", |state| {
            if state.status == SessionStatus::Submitting {
                return Err(AppError::invalid_state("change preset", state.status));
            }
            state.preset = preset.clone();
            Ok(())
        })?;

        log::debug!("Preset set to {}", preset);
        Ok(())
    }

    /// Convenience for callers holding a preset name.
    pub fn select_preset(&self, name: &str) -> AppResult<()> {
        let preset = self.inner.config.preset(name)?;
        self.set_preset(preset)
    }

    /// Upload the image and wait for the outcome.
    ///
    /// Fails with `InvalidState` without touching the session when no image is
    /// loaded or another submission is in flight. Backend problems are not
    /// errors here: they end in `SessionStatus::Failed`.
    pub async fn submit(&self) -> AppResult<SubmitOutcome> {
        let ticket = self.begin_submission()?;
        Ok(self.run_submission(ticket).await)
    }

    /// Start a submission on the tokio runtime and return immediately.
    pub fn spawn_submit(&self) -> AppResult<JoinHandle<SubmitOutcome>> {
        let ticket = self.begin_submission()?;
        let session = self.clone();
        Ok(tokio::spawn(async move { session.run_submission(ticket).await }))
    }

    /// Abandon the in-flight submission and go back to the state held before it.
    /// Returns whether anything was cancelled.
    pub fn cancel(&self) -> bool {
        let cancelled = self
            .inner
            .tracker
            .update("cancel", |state| {
                if state.status != SessionStatus::Submitting {
                    return Ok(false);
                }

                let restore = state.restore_point.take().unwrap_or(RestorePoint {
                    status: SessionStatus::ImageLoaded,
                    result: None,
                    error_message: None,
                });
                state.status = restore.status;
                state.result = restore.result;
                state.error_message = restore.error_message;
                state.generation += 1;
                Ok(true)
            })
            .unwrap_or(false);

        if cancelled {
            self.inner.cancelled.notify_waiters();
            log::info!("Submission cancelled");
        }
        cancelled
    }

    /// Forget the image and any outcome. Works from every state; a response that
    /// is still in flight is ignored when it arrives.
    pub fn reset(&self) {
        let was_submitting = self
            .inner
            .tracker
            .update("reset", |state| {
                let was_submitting = state.status == SessionStatus::Submitting;
                state.source_image = None;
                state.filename = None;
                state.result = None;
                state.error_message = None;
                state.restore_point = None;
                state.status = SessionStatus::Idle;
                state.generation += 1;
                Ok(was_submitting)
            })
            .unwrap_or(false);

        if was_submitting {
            self.inner.cancelled.notify_waiters();
        }
        log::debug!("Session reset");
    }

    fn begin_submission(&self) -> AppResult<SubmissionTicket> {
        self.inner.tracker.update("submit", |state| {
            if state.status == SessionStatus::Submitting {
                log::warn!("Ignoring submit: a submission is already in flight");
                return Err(AppError::invalid_state("submit", state.status));
            }

            let image = match &state.source_image {
                Some(image) => Arc::clone(image),
                None => return Err(AppError::invalid_state("submit", state.status)),
            };

            state.restore_point = Some(RestorePoint {
                status: state.status,
                result: state.result.take(),
                error_message: state.error_message.take(),
            });
            state.status = SessionStatus::Submitting;
            state.generation += 1;

            Ok(SubmissionTicket {
                generation: state.generation,
                image,
                filename: state.filename.clone().unwrap_or_default(),
                preset: state.preset.clone(),
            })
        })
    }

    async fn run_submission(&self, ticket: SubmissionTicket) -> SubmitOutcome {
        let config = &self.inner.config;

        let body = match build_upload_body(config, &ticket) {
            Ok(body) => body,
            Err(e) => return self.finish(ticket.generation, Err(e)),
        };
        let content_type = body.content_type();
        let encoded = match body.encode() {
            Ok(encoded) => encoded,
            Err(e) => return self.finish(ticket.generation, Err(e)),
        };

        let cancelled = self.inner.cancelled.notified();
        tokio::pin!(cancelled);
        cancelled.as_mut().enable();

        if !self.is_current(ticket.generation) {
            log::debug!("Submission {} abandoned before sending", ticket.generation);
            return SubmitOutcome::Discarded;
        }

        log::info!(
            "Uploading {} ({} bytes) with preset {} to {}",
            ticket.filename,
            ticket.image.len(),
            ticket.preset,
            config.endpoint
        );

        let request = self
            .inner
            .backend
            .post_multipart(&config.endpoint, &content_type, encoded);
        let response = tokio::select! {
            response = request => response,
            _ = &mut cancelled => {
                log::debug!("Submission {} dropped in flight", ticket.generation);
                return SubmitOutcome::Discarded;
            }
        };

        let result =
            response.and_then(|response| interpret_response(response, config.response_mode));
        self.finish(ticket.generation, result)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.tracker.read("generation check", |state| {
            state.generation == generation && state.status == SessionStatus::Submitting
        })
    }

    fn finish(&self, generation: u64, result: AppResult<ResultPayload>) -> SubmitOutcome {
        let outcome = self.inner.tracker.update("finish submission", |state| {
            if state.generation != generation || state.status != SessionStatus::Submitting {
                return Ok(SubmitOutcome::Discarded);
            }

            state.restore_point = None;
            match &result {
                Ok(payload) => {
                    state.result = Some(Arc::new(payload.clone()));
                    state.error_message = None;
                    state.status = SessionStatus::Succeeded;
                    Ok(SubmitOutcome::Succeeded)
                }
                Err(e) => {
                    let category = e.category();
                    state.result = None;
                    state.error_message = Some(category.to_string());
                    state.status = SessionStatus::Failed;
                    Ok(SubmitOutcome::Failed { category })
                }
            }
        });

        let outcome = outcome.unwrap_or(SubmitOutcome::Discarded);
        match (&outcome, &result) {
            (SubmitOutcome::Succeeded, Ok(payload)) => log::info!(
                "Upload succeeded: {} result, {} bytes",
                if payload.is_vector() { "vector" } else { "raster" },
                payload.as_bytes().len()
            ),
            (SubmitOutcome::Failed { category }, Err(e)) => {
                log::warn!("Upload failed ({}): {}", category, describe_transport_error(e))
            }
            _ => log::debug!("Late response for submission {} ignored", generation),
        }
        outcome
    }
}

fn build_upload_body(
    config: &ClientConfig,
    ticket: &SubmissionTicket,
) -> AppResult<MultipartBody> {
    let mut body = MultipartBody::new()
        .file(
            config.file_field.as_str(),
            ticket.filename.as_str(),
            image_processor::mime_type_for(&ticket.image),
            ticket.image.as_ref().clone(),
        )
        .text(config.preset_field.as_str(), ticket.preset.as_str());

    if let Some(field) = &config.filename_field {
        body = body.text(field.as_str(), ticket.filename.as_str());
    }

    Ok(body)
}

/// Turn a backend answer into a result according to the configured mode.
pub fn interpret_response(
    response: BackendResponse,
    mode: ResponseMode,
) -> AppResult<ResultPayload> {
    if response.status != 200 {
        return Err(AppError::Server {
            status: response.status,
        });
    }

    let mode = match mode {
        ResponseMode::Auto => mode_from_content_type(response.content_type.as_deref()),
        other => other,
    };

    if response.body.is_empty() {
        return Err(AppError::response_parse("empty body"));
    }

    match mode {
        ResponseMode::Vector => {
            let markup = String::from_utf8(response.body)
                .map_err(|_| AppError::response_parse("body is not valid UTF-8"))?;
            if markup.trim().is_empty() {
                return Err(AppError::response_parse("body is blank"));
            }
            Ok(ResultPayload::Vector(markup))
        }
        _ => {
            let format = image_processor::sniff_format(&response.body)
                .ok_or_else(|| AppError::response_parse("body is not a recognized image"))?;
            Ok(ResultPayload::Raster {
                bytes: response.body,
                format,
            })
        }
    }
}

fn mode_from_content_type(content_type: Option<&str>) -> ResponseMode {
    let content_type = content_type.unwrap_or_default().to_ascii_lowercase();
    if content_type.starts_with("image/svg")
        || content_type.starts_with("text/")
        || content_type.contains("xml")
    {
        ResponseMode::Vector
    } else {
        ResponseMode::Raster
    }
}
