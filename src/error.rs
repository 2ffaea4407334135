use thiserror::Error;

pub type SnowResult<T> = Result<T, SnowError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SnowError {
    /// Parameters or grid geometry the pipeline cannot run with.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("point cloud is empty")]
    EmptyCloud,
}

impl SnowError {
    pub fn config(message: impl Into<String>) -> Self {
        SnowError::Configuration {
            message: message.into(),
        }
    }
}
