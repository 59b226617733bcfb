//! Policy/value unit of a sparse, column-organized reinforcement learner.
//!
//! An [`Actor`] turns discretized input layers into one sampled action per
//! hidden column and improves its value and policy weights by replaying a
//! bounded window of past steps.

pub mod actor;
pub mod error;
pub mod helpers;
pub mod history;
pub mod sparse_matrix;

pub use actor::{Actor, Params, VisibleLayer, VisibleLayerDesc};
pub use error::ActorError;
pub use helpers::Int3;
pub use history::{HistoryBuffer, HistorySample};
pub use sparse_matrix::SparseMatrix;
