// Uploader module - owns the upload session and its HTTP seam
//
// A session drives one pick → submit → result cycle against the processing backend

pub mod backend_client;
pub mod session;
pub mod state_tracker;

pub use backend_client::{BackendResponse, HttpBackend, UploadBackend};
pub use session::{ResultPayload, SessionStatus, SubmitOutcome, UploadSession};
pub use state_tracker::SessionSnapshot;
