use reqwest::StatusCode;
use thiserror::Error;

/// Failures talking to the Zoom API, split by pipeline stage.
#[derive(Debug, Error)]
pub enum ZoomError {
    #[error("Zoom authentication failed for {project}: {message}")]
    Auth {
        project: String,
        status: Option<StatusCode>,
        message: String,
    },

    #[error("Zoom recordings listing failed for {project}: {message}")]
    Listing {
        project: String,
        status: Option<StatusCode>,
        message: String,
    },

    #[error("Recording download failed: {message}")]
    Download {
        status: Option<StatusCode>,
        message: String,
    },

    #[error("Recording download timed out after {0} seconds")]
    DownloadTimeout(u64),

    #[error("Failed to write recording to disk: {0}")]
    Io(#[from] std::io::Error),
}

impl ZoomError {
    pub(crate) fn auth(project: &str, err: reqwest::Error) -> Self {
        Self::Auth {
            project: project.to_string(),
            status: err.status(),
            message: describe(&err),
        }
    }

    pub(crate) fn listing(project: &str, err: reqwest::Error) -> Self {
        Self::Listing {
            project: project.to_string(),
            status: err.status(),
            message: describe(&err),
        }
    }

    pub(crate) fn download(err: reqwest::Error) -> Self {
        Self::Download {
            status: err.status(),
            message: describe(&err),
        }
    }

    /// HTTP status returned by Zoom, when the failure was a rejected request.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Auth { status, .. } | Self::Listing { status, .. } | Self::Download { status, .. } => {
                *status
            }
            Self::DownloadTimeout(_) | Self::Io(_) => None,
        }
    }
}

fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out ({})", err)
    } else if err.is_connect() {
        format!("connection failed ({})", err)
    } else {
        err.to_string()
    }
}
