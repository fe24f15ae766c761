pub type StageResult<T> = Result<T, StageError>;

#[derive(thiserror::Error, Debug)]
pub enum StageError {
    #[error("unknown property: {0}")]
    UnknownProperty(String),

    #[error("index out of bounds: {index} (children: {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    #[error("texture error: {0}")]
    Texture(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StageError {
    pub fn unknown_property(name: impl Into<String>) -> Self {
        Self::UnknownProperty(name.into())
    }

    pub fn invalid_setting(msg: impl Into<String>) -> Self {
        Self::InvalidSetting(msg.into())
    }

    pub fn texture(msg: impl Into<String>) -> Self {
        Self::Texture(msg.into())
    }
}
