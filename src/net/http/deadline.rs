#![cfg(feature = "net")]

use crate::net::{HttpError, NetError};
use std::time::{Duration, Instant};

/// Absolute budget for one admin request, started when the connection is
/// accepted.
///
/// It is enforced once, before dispatch. A request that has started mutating
/// state is never abandoned on deadline.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RequestDeadline {
    expires_at: Instant,
}

impl RequestDeadline {
    pub(crate) fn starting_at(start: Instant, budget: Duration) -> Self {
        Self {
            expires_at: start + budget.max(Duration::from_millis(1)),
        }
    }

    pub(crate) fn enforce(&self) -> Result<(), NetError> {
        if Instant::now() >= self.expires_at {
            Err(NetError::from(HttpError::RequestTimeout))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RequestDeadline;
    use crate::net::{HttpError, NetError};
    use std::time::{Duration, Instant};

    #[test]
    fn spent_budget_is_a_timeout() {
        let started = Instant::now() - Duration::from_secs(2);
        let deadline = RequestDeadline::starting_at(started, Duration::from_secs(1));
        assert!(matches!(
            deadline.enforce(),
            Err(NetError::Http(HttpError::RequestTimeout))
        ));
    }

    #[test]
    fn fresh_budget_passes() {
        let deadline = RequestDeadline::starting_at(Instant::now(), Duration::from_secs(30));
        assert!(deadline.enforce().is_ok());
    }
}
