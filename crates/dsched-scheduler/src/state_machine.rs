//! Explicit `(State, Event) -> Result<State, TransitionError>` functions for
//! the task, peer and persistent-cache-task state machines (§4.4, §9).
//! Illegal transitions return an error rather than clamping or panicking;
//! callers invoke a post-commit callback only after a transition succeeds.

use crate::error::SchedulerError;
use dsched_common::SizeScope;
use dsched_core_traits::{PeerEvent, PeerState, PersistentTaskState, TaskState};

fn illegal<S: std::fmt::Debug, E: std::fmt::Debug>(state: S, event: E) -> SchedulerError {
    SchedulerError::IllegalTransition(format!("{state:?} does not accept {event:?}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEvent {
    Start,
    Succeed,
    Fail,
    Redownload,
}

pub fn transition_task(state: TaskState, event: TaskEvent) -> Result<TaskState, SchedulerError> {
    use TaskEvent::*;
    use TaskState::*;
    match (state, event) {
        (Pending, Start) => Ok(Running),
        (Running, Succeed) => Ok(Succeeded),
        (Running, Fail) => Ok(Failed),
        (Failed, Redownload) => Ok(Running),
        (s, e) => Err(illegal(s, e)),
    }
}

/// Applies an event with size-scope awareness: a `Download` event from
/// `Pending` on trivially small content enters the matching `Received*`
/// fast-path state instead of `Running` (§4.4).
pub fn transition_peer(
    state: PeerState,
    event: PeerEvent,
    size_scope: SizeScope,
) -> Result<PeerState, SchedulerError> {
    use PeerEvent::*;
    use PeerState::*;
    match (state, event) {
        (Pending, Download) => Ok(match size_scope {
            SizeScope::Empty => ReceivedEmpty,
            SizeScope::Tiny => ReceivedTiny,
            SizeScope::Small => ReceivedSmall,
            SizeScope::Normal | SizeScope::Unknown => Running,
        }),
        (Pending, DownloadBackToSource) | (Pending, DownloadFromSource) => Ok(BackToSource),
        (Running, DownloadBackToSource) | (Running, DownloadFromSource) => Ok(BackToSource),
        (Running, DownloadSucceeded)
        | (BackToSource, DownloadSucceeded)
        | (ReceivedTiny, DownloadSucceeded)
        | (ReceivedSmall, DownloadSucceeded)
        | (ReceivedNormal, DownloadSucceeded)
        | (ReceivedEmpty, DownloadSucceeded) => Ok(Succeeded),
        (Running, DownloadFailed) | (BackToSource, DownloadFailed) => Ok(Failed),
        (Failed, Download) => Ok(Running),
        (_, Leave) if !matches!(state, Succeeded | Failed | Leave) => Ok(Leave),
        (s, e) => Err(illegal(s, e)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistentTaskEvent {
    Start,
    Succeed,
    Fail,
    Retry,
}

pub fn transition_persistent_task(
    state: PersistentTaskState,
    event: PersistentTaskEvent,
) -> Result<PersistentTaskState, SchedulerError> {
    use PersistentTaskEvent::*;
    use PersistentTaskState::*;
    match (state, event) {
        (Pending, Start) => Ok(Uploading),
        (Uploading, Succeed) => Ok(Succeeded),
        (Uploading, Fail) => Ok(Failed),
        (Failed, Retry) => Ok(Uploading),
        (s, e) => Err(illegal(s, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_reenters_running_from_failed() {
        assert_eq!(
            transition_task(TaskState::Failed, TaskEvent::Redownload).unwrap(),
            TaskState::Running
        );
    }

    #[test]
    fn task_rejects_illegal_transition() {
        assert!(transition_task(TaskState::Pending, TaskEvent::Succeed).is_err());
    }

    #[test]
    fn peer_download_on_tiny_task_takes_fast_path() {
        let next = transition_peer(PeerState::Pending, PeerEvent::Download, SizeScope::Tiny).unwrap();
        assert_eq!(next, PeerState::ReceivedTiny);
    }

    #[test]
    fn peer_download_on_normal_task_runs_normally() {
        let next = transition_peer(PeerState::Pending, PeerEvent::Download, SizeScope::Normal).unwrap();
        assert_eq!(next, PeerState::Running);
    }

    #[test]
    fn peer_cannot_leave_twice() {
        assert!(transition_peer(PeerState::Leave, PeerEvent::Leave, SizeScope::Normal).is_err());
    }

    #[test]
    fn persistent_task_retries_from_failed() {
        assert_eq!(
            transition_persistent_task(PersistentTaskState::Failed, PersistentTaskEvent::Retry).unwrap(),
            PersistentTaskState::Uploading
        );
    }
}
