use std::path::PathBuf;
use thiserror::Error;

use crate::zoom::ZoomError;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Download(ZoomError),

    #[error("Failed to upload {file:?}: {message}")]
    Upload { file: PathBuf, message: String },
}

impl DeliveryError {
    /// Text shown to the requester. Every failure is worth retrying later.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Download(ZoomError::Auth { .. }) => {
                "Couldn't sign in to Zoom to download the recording. Please try again later."
            }
            Self::Download(_) => "Couldn't download the recording. Please try again later.",
            Self::Upload { .. } => "Couldn't send the recording. Please try again later.",
        }
    }
}
