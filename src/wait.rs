//! # Wait Policies and Deadline Timers
//!
//! Governs whether a pipe request may keep waiting once it cannot make
//! immediate progress. Timers are tick-based: the kernel tick handler
//! fires every armed timer whose deadline has passed.
//!
//! ```text
//!   ┌────────┐  deadline passed  ┌───────┐
//!   │ Armed  │ ────────────────► │ Fired │
//!   └────────┘                   └───────┘
//!        │
//!        │  request terminated
//!        ▼
//!   ┌───────────┐
//!   │ Cancelled │
//!   └───────────┘
//! ```

/// How long a request may wait for the rest of its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Take what is available now, never wait.
    NonBlocking,
    /// Wait until the request can be completed.
    Forever,
    /// Wait until the kernel tick count reaches `deadline`.
    Timed { deadline: u64 },
}

/// Relative timeout accepted by the kernel API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    NoWait,
    Forever,
    Ticks(u32),
}

impl Timeout {
    /// Convert to an absolute wait policy given the current tick count.
    pub const fn into_policy(self, now: u64) -> WaitPolicy {
        match self {
            Timeout::NoWait => WaitPolicy::NonBlocking,
            Timeout::Forever => WaitPolicy::Forever,
            Timeout::Ticks(ticks) => WaitPolicy::Timed {
                deadline: now + ticks as u64,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// No timer (non-blocking or forever).
    Disarmed,
    Armed,
    Fired,
    Cancelled,
}

/// Wait policy of one request together with its deadline timer.
#[derive(Debug, Clone, Copy)]
pub struct WaitState {
    pub policy: WaitPolicy,
    pub timer: TimerState,
}

impl WaitState {
    pub const fn new(policy: WaitPolicy) -> Self {
        let timer = match policy {
            WaitPolicy::Timed { .. } => TimerState::Armed,
            _ => TimerState::Disarmed,
        };
        Self { policy, timer }
    }

    #[inline]
    pub fn is_non_blocking(&self) -> bool {
        self.policy == WaitPolicy::NonBlocking
    }

    #[inline]
    pub fn is_forever(&self) -> bool {
        self.policy == WaitPolicy::Forever
    }

    #[inline]
    pub fn is_deadline_expired(&self) -> bool {
        self.timer == TimerState::Fired
    }

    /// Whether the owner may still be left waiting in a FIFO.
    pub fn may_wait(&self) -> bool {
        match self.policy {
            WaitPolicy::NonBlocking => false,
            WaitPolicy::Forever => true,
            WaitPolicy::Timed { .. } => self.timer == TimerState::Armed,
        }
    }

    /// Fire the timer if it is armed and its deadline is at or before `now`.
    /// Returns true if the timer fired on this call.
    pub fn fire_if_due(&mut self, now: u64) -> bool {
        match self.policy {
            WaitPolicy::Timed { deadline } if self.timer == TimerState::Armed && deadline <= now => {
                self.timer = TimerState::Fired;
                true
            }
            _ => false,
        }
    }

    /// Stop an armed timer. A fired timer stays fired.
    pub fn cancel_timer(&mut self) {
        if self.timer == TimerState::Armed {
            self.timer = TimerState::Cancelled;
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_conversion() {
        assert_eq!(Timeout::NoWait.into_policy(7), WaitPolicy::NonBlocking);
        assert_eq!(Timeout::Forever.into_policy(7), WaitPolicy::Forever);
        assert_eq!(Timeout::Ticks(5).into_policy(7), WaitPolicy::Timed { deadline: 12 });
    }

    #[test]
    fn test_timer_fires_once_at_deadline() {
        let mut wait = WaitState::new(WaitPolicy::Timed { deadline: 10 });
        assert_eq!(wait.timer, TimerState::Armed);
        assert!(wait.may_wait());

        assert!(!wait.fire_if_due(9));
        assert!(wait.fire_if_due(10));
        assert!(!wait.fire_if_due(11), "A fired timer must not fire again");
        assert!(wait.is_deadline_expired());
        assert!(!wait.may_wait());
    }

    #[test]
    fn test_cancel_keeps_fired_state() {
        let mut wait = WaitState::new(WaitPolicy::Timed { deadline: 3 });
        wait.cancel_timer();
        assert_eq!(wait.timer, TimerState::Cancelled);
        assert!(!wait.fire_if_due(100));

        let mut fired = WaitState::new(WaitPolicy::Timed { deadline: 3 });
        fired.fire_if_due(3);
        fired.cancel_timer();
        assert!(fired.is_deadline_expired());
    }

    #[test]
    fn test_untimed_policies() {
        let nb = WaitState::new(WaitPolicy::NonBlocking);
        assert!(nb.is_non_blocking());
        assert!(!nb.may_wait());
        assert_eq!(nb.timer, TimerState::Disarmed);

        let forever = WaitState::new(WaitPolicy::Forever);
        assert!(forever.is_forever());
        assert!(forever.may_wait());
        assert!(!forever.is_deadline_expired());
    }
}
