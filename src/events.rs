//! Request and response values exchanged with the driver, and progress reporting.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::commands::NKey;
use crate::reply::CommandKind;
use crate::{Error, Result};

/// Progress checkpoints, in percent. Every request reports all four, in this order.
pub const PROGRESS_START: u8 = 0;
pub const PROGRESS_CONNECTED: u8 = 25;
pub const PROGRESS_RECEIVED: u8 = 75;
pub const PROGRESS_DONE: u8 = 100;

const CHECKPOINTS: [u8; 4] = [
    PROGRESS_START,
    PROGRESS_CONNECTED,
    PROGRESS_RECEIVED,
    PROGRESS_DONE,
];

#[derive(Debug, Clone, PartialEq)]
pub struct Request<P> {
    pub initiator: Uuid,
    pub params: P,
}

impl<P> Request<P> {
    pub fn new(params: P) -> Self {
        Self {
            initiator: Uuid::new_v4(),
            params,
        }
    }

    pub fn with_initiator(initiator: Uuid, params: P) -> Self {
        Self { initiator, params }
    }
}

/// Outcome of one request. A failed request may still carry the partial value gathered before
/// the failure.
#[derive(Debug)]
pub struct Response<R> {
    pub initiator: Uuid,
    pub value: Option<R>,
    pub error: Option<Error>,
    pub elapsed: Duration,
}

impl<R> Response<R> {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<R> {
        match (self.value, self.error) {
            (_, Some(err)) => Err(err),
            (Some(value), None) => Ok(value),
            (None, None) => Err(Error::Protocol("response without a value".to_string())),
        }
    }
}

/// Receives the progress of running requests.
pub trait ProgressSink: Send + Sync {
    fn progress(&self, initiator: Uuid, percent: u8);
}

/// Discards progress.
impl ProgressSink for () {
    fn progress(&self, _initiator: Uuid, _percent: u8) {}
}

impl<F> ProgressSink for F
where
    F: Fn(Uuid, u8) + Send + Sync,
{
    fn progress(&self, initiator: Uuid, percent: u8) {
        self(initiator, percent)
    }
}

/// Progress of a single request. Reports [`PROGRESS_START`] on creation and makes sure every
/// later checkpoint is reported exactly once, even when the request fails early.
pub(crate) struct Progress<'a> {
    initiator: Uuid,
    sink: &'a dyn ProgressSink,
    started: Instant,
    // Index into `CHECKPOINTS` of the next checkpoint to report.
    next: AtomicUsize,
}

impl<'a> Progress<'a> {
    pub(crate) fn start(initiator: Uuid, sink: &'a dyn ProgressSink) -> Self {
        let progress = Self {
            initiator,
            sink,
            started: Instant::now(),
            next: AtomicUsize::new(0),
        };
        progress.reach(PROGRESS_START);
        progress
    }

    /// Reports every checkpoint up to and including `percent` that was not reported yet.
    pub(crate) fn reach(&self, percent: u8) {
        while let Some(&checkpoint) = CHECKPOINTS.get(self.next.load(Ordering::Relaxed)) {
            if checkpoint > percent {
                break;
            }
            self.sink.progress(self.initiator, checkpoint);
            self.next.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn connected(&self) {
        self.reach(PROGRESS_CONNECTED);
    }

    pub(crate) fn received(&self) {
        self.reach(PROGRESS_RECEIVED);
    }

    pub(crate) fn finish<R>(self, result: Result<R>) -> Response<R> {
        match result {
            Ok(value) => self.respond(Some(value), None),
            Err(err) => self.respond(None, Some(err)),
        }
    }

    /// Finishes a request whose value is meaningful even when `result` failed.
    pub(crate) fn finish_partial<R>(self, value: R, result: Result<()>) -> Response<R> {
        self.respond(Some(value), result.err())
    }

    fn respond<R>(self, value: Option<R>, error: Option<Error>) -> Response<R> {
        self.reach(PROGRESS_DONE);
        Response {
            initiator: self.initiator,
            value,
            error,
            elapsed: self.started.elapsed(),
        }
    }
}

/// A command line typed by the user, possibly several commands separated by newlines.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteParams {
    pub text: String,
    pub kind: CommandKind,
}

impl ExecuteParams {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: CommandKind::User,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    pub name: String,
    /// Number of keys. Only known for the selected database, 0 for the others.
    pub size: u64,
    pub is_default: bool,
}

impl DatabaseInfo {
    pub fn index(&self) -> Option<i64> {
        self.name.parse().ok()
    }
}

impl fmt::Display for DatabaseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "db{} ({} keys)", self.name, self.size)
    }
}

/// One page of database content.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadContentParams {
    pub pattern: String,
    /// `COUNT` hint of the underlying `SCAN`.
    pub count: u64,
    pub cursor: u64,
}

impl Default for LoadContentParams {
    fn default() -> Self {
        Self {
            pattern: "*".to_string(),
            count: 100,
            cursor: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentPage {
    pub keys: Vec<NKey>,
    /// Cursor of the next page, 0 once the keyspace is exhausted.
    pub cursor: u64,
    /// Total number of keys of the selected database.
    pub db_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerProperty {
    pub name: String,
    pub value: String,
}

impl ServerProperty {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn four_checkpoints_on_success() {
        let seen = Mutex::new(Vec::new());
        let sink = |_: Uuid, percent: u8| seen.lock().unwrap().push(percent);

        let progress = Progress::start(Uuid::new_v4(), &sink);
        progress.connected();
        progress.received();
        let response = progress.finish(Ok(7));

        assert_eq!(*seen.lock().unwrap(), vec![0, 25, 75, 100]);
        assert_eq!(response.into_result().unwrap(), 7);
    }

    #[test]
    fn four_checkpoints_on_early_failure() {
        let seen = Mutex::new(Vec::new());
        let sink = |_: Uuid, percent: u8| seen.lock().unwrap().push(percent);

        let progress = Progress::start(Uuid::new_v4(), &sink);
        let response: Response<()> = progress.finish(Err(Error::NotConnected));

        assert_eq!(*seen.lock().unwrap(), vec![0, 25, 75, 100]);
        assert!(!response.is_ok());
    }

    #[test]
    fn partial_value_survives_an_error() {
        let progress = Progress::start(Uuid::new_v4(), &());
        let response = progress.finish_partial(vec![1, 2], Err(Error::Interrupted));

        assert_eq!(response.value, Some(vec![1, 2]));
        assert!(response.error.unwrap().is_interrupted());
    }
}
