use thiserror::Error;

use crate::helpers::Int3;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActorError {
    #[error("Hidden size must be positive in every dimension, got {0:?}")]
    InvalidHiddenSize(Int3),
    #[error("At least one visible layer is required")]
    NoVisibleLayers,
    #[error("Visible layer {index} is invalid: size {size:?}, radius {radius}")]
    InvalidVisibleLayer { index: usize, size: Int3, radius: i32 },
    #[error("History capacity must be at least 1")]
    ZeroHistoryCapacity,
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
}
