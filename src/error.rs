use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Cascade or localizer bytes could not be parsed.
    #[error("Malformed {model} model: {reason}")]
    ModelFormat { model: &'static str, reason: String },

    /// Camera or other frame source could not be opened.
    #[error("Frame acquisition error: {0}")]
    Acquisition(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Frame buffer holds {actual} bytes, expected {expected}")]
    FrameSize { expected: usize, actual: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "camera")]
    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),

    #[cfg(feature = "camera")]
    #[error("Zenoh error {0:?}")]
    Zenoh(zenoh::Error),
}

impl Error {
    pub(crate) fn model_format(model: &'static str, reason: impl Into<String>) -> Self {
        Self::ModelFormat {
            model,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
