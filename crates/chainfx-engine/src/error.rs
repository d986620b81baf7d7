use thiserror::Error;

use crate::order::OrderError;
use crate::params::ParamError;
use crate::state::StateError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("parameter `{0}` is not in the parameter store")]
    MissingParameter(&'static str),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("unsupported sample rate {0} Hz (need a finite rate of at least 8000 Hz)")]
    UnsupportedSampleRate(f64),
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error(transparent)]
    Param(#[from] ParamError),
    #[error(transparent)]
    State(#[from] StateError),
}
