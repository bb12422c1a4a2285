//! Error type for the trait layer itself (construction/config failures);
//! implementors of [`crate::resource_store::ResourceStore`] and friends
//! define their own richer errors and convert into their crate's enum.

use dsched_common::CommonError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreTraitsError {
    #[error("scorer provider not configured: {0}")]
    ScorerNotAvailable(String),

    #[error("dynamic scheduler-cluster config unavailable: {0}")]
    DynamicConfigUnavailable(String),

    #[error(transparent)]
    Common(#[from] CommonError),
}

impl CoreTraitsError {
    pub fn scorer_not_available<S: Into<String>>(msg: S) -> Self {
        Self::ScorerNotAvailable(msg.into())
    }

    pub fn dynamic_config_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::DynamicConfigUnavailable(msg.into())
    }
}
