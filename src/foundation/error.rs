pub type ToonsyncResult<T> = Result<T, ToonsyncError>;

#[derive(thiserror::Error, Debug)]
pub enum ToonsyncError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("input error: {0}")]
    Input(String),

    #[error("no face detected")]
    NoFace,

    #[error("speech error: {0}")]
    Speech(String),

    #[error("encoder error: {0}")]
    Encoder(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("evaluation error: {0}")]
    Evaluation(String),

    #[error("interrupted")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ToonsyncError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn speech(msg: impl Into<String>) -> Self {
        Self::Speech(msg.into())
    }

    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }
}
