use dsched_common::CommonError;
use dsched_core_traits::CoreTraitsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("illegal state transition: {0}")]
    IllegalTransition(String),

    #[error(transparent)]
    Common(#[from] CommonError),

    #[error(transparent)]
    CoreTraits(#[from] CoreTraitsError),
}

#[derive(Debug, Error)]
pub enum ReplicaPlannerError {
    #[error(transparent)]
    Common(#[from] CommonError),
}
