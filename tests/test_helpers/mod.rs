//! Shared fixtures for integration tests.

use chrono::{DateTime, Local, Utc};
use mockable::Clock;
use snapenv::preview::domain::{
    CommitSha, PullRequestDetails, PullRequestNumber, RepositoryFullName,
};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Clock whose time only moves when a test moves it.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock frozen at the current wall-clock time.
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Creates a clock frozen at `now`.
    pub const fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Moves the clock forward by `step`.
    pub fn advance(&self, step: Duration) {
        let delta = chrono::Duration::from_std(step).unwrap_or(chrono::Duration::MAX);
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC);
    }

    /// Moves the clock to `at` unless that would move it backwards.
    pub fn advance_to(&self, at: DateTime<Utc>) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        if at > *now {
            *now = at;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Returns pull request metadata for `acme/shop` number `number`.
///
/// # Panics
///
/// Panics if `number` is zero.
pub fn pull_request_details(number: u64) -> PullRequestDetails {
    PullRequestDetails {
        repository: RepositoryFullName::new("acme/shop").expect("valid repository"),
        number: PullRequestNumber::new(number).expect("valid pull request number"),
        title: format!("Preview change {number}"),
        author: "octocat".to_owned(),
        head_branch: format!("feature-{number}"),
        base_branch: "main".to_owned(),
        commit_sha: Some(CommitSha::new("a1b2c3d4e5f60718").expect("valid sha")),
        github_url: format!("https://github.com/acme/shop/pull/{number}"),
    }
}
