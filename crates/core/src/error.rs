use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No qualifying touchpoints for conversion {conversion_id}")]
    NoQualifyingTouchpoints { conversion_id: String },

    #[error("Coalition has no players")]
    EmptyCoalition,

    #[error("Characteristic function failed: {0}")]
    CharacteristicFunction(#[source] anyhow::Error),

    #[error("Insufficient history: {available} weekly points, at least {required} required")]
    InsufficientHistory { available: usize, required: usize },

    #[error("No campaigns supplied for budget allocation")]
    NoCampaigns,

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
