//! Link state machine for the real-time connection.
//!
//! This module provides a pure, side-effect-free state machine for the
//! lifecycle of the transport link that carries topic subscriptions. It takes
//! events as input and produces a new state plus a list of actions to
//! execute.
//!
//! The actual I/O (connecting, resubscribing, reconciliation fetches) is
//! performed by the subscription manager in `hyperchat-client`.

use std::time::Duration;

/// Reconnect timing: jittered exponential backoff with a bounded interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Base delay; attempt `n` waits `base * 2^n` before jitter.
    pub base: Duration,
    /// Upper bound on the delay before jitter.
    pub max: Duration,
    /// Upper bound on the random jitter added to each delay.
    pub max_jitter: Duration,
    /// Give up after this many failed reconnect attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl BackoffPolicy {
    /// A policy that never waits. Useful for tests and manual stepping.
    pub fn immediate() -> Self {
        Self {
            base: Duration::ZERO,
            max: Duration::ZERO,
            max_jitter: Duration::ZERO,
            max_attempts: None,
        }
    }

    /// Set the attempt limit.
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay before the given (1-based) attempt.
    ///
    /// Formula: min(max, base * 2^attempt) + random(0..=max_jitter)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        let base = self.base.saturating_mul(factor).min(self.max);
        base + random_jitter(self.max_jitter)
    }

    /// True when `attempt` failures exhaust the policy.
    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempt >= max)
    }
}

impl Default for BackoffPolicy {
    /// min(30s, 2^attempt seconds) + random(0..5000ms), retrying forever.
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(30),
            max_jitter: Duration::from_millis(5000),
            max_attempts: None,
        }
    }
}

/// Link state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    /// No link.
    Disconnected,
    /// Initial connection attempt in progress.
    Connecting,
    /// Link is up; topics are live.
    Connected,
    /// Link was lost, waiting for the reconnect timer.
    Reconnecting {
        /// Number of reconnection attempts so far.
        attempt: u32,
    },
    /// Reconnect attempt in progress.
    Resuming {
        /// Which attempt this is.
        attempt: u32,
    },
    /// Reconnect attempts exhausted.
    Failed {
        /// Attempts made before giving up.
        attempts: u32,
    },
}

impl LinkState {
    /// Create a new state machine in the Disconnected state.
    pub fn new() -> Self {
        Self::Disconnected
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function apart from jitter generation. The caller is
    /// responsible for executing the returned actions.
    pub fn on_event(self, event: LinkEvent, policy: &BackoffPolicy) -> (Self, Vec<LinkAction>) {
        match (self, event) {
            // From Disconnected / Failed
            (Self::Disconnected | Self::Failed { .. }, LinkEvent::ConnectRequested) => {
                (Self::Connecting, vec![LinkAction::Connect])
            }

            // From Connecting
            (Self::Connecting, LinkEvent::ConnectSucceeded) => {
                (Self::Connected, vec![LinkAction::Emit(LinkNotice::Connected)])
            }
            // Initial failures are reported, not retried
            (Self::Connecting, LinkEvent::ConnectFailed { error }) => (
                Self::Disconnected,
                vec![LinkAction::Emit(LinkNotice::ConnectionFailed { error })],
            ),

            // From Connected
            (Self::Connected, LinkEvent::TransportLost { reason }) => (
                Self::Reconnecting { attempt: 1 },
                vec![
                    LinkAction::Emit(LinkNotice::Disconnected { reason }),
                    LinkAction::StartReconnectTimer {
                        delay: policy.delay(1),
                    },
                ],
            ),
            (Self::Connected, LinkEvent::DisconnectRequested) => {
                (Self::Disconnected, vec![LinkAction::Disconnect])
            }

            // From Reconnecting
            (Self::Reconnecting { attempt }, LinkEvent::ReconnectTimer) => {
                (Self::Resuming { attempt }, vec![LinkAction::Connect])
            }

            // Transport came back (our attempt, or its own socket-level retry)
            (
                Self::Reconnecting { attempt } | Self::Resuming { attempt },
                LinkEvent::ConnectSucceeded,
            ) => (
                Self::Connected,
                vec![
                    LinkAction::ResubscribeAll,
                    LinkAction::Emit(LinkNotice::Reconnected { attempts: attempt }),
                ],
            ),

            (Self::Resuming { attempt }, LinkEvent::ConnectFailed { error }) => {
                if policy.exhausted(attempt) {
                    return (
                        Self::Failed { attempts: attempt },
                        vec![
                            LinkAction::Emit(LinkNotice::ReconnectFailed { attempt, error }),
                            LinkAction::GiveUp,
                        ],
                    );
                }
                let next_attempt = attempt.saturating_add(1);
                (
                    Self::Reconnecting {
                        attempt: next_attempt,
                    },
                    vec![
                        LinkAction::Emit(LinkNotice::ReconnectFailed { attempt, error }),
                        LinkAction::StartReconnectTimer {
                            delay: policy.delay(next_attempt),
                        },
                    ],
                )
            }
            (
                Self::Reconnecting { .. } | Self::Resuming { .. },
                LinkEvent::DisconnectRequested,
            ) => (Self::Disconnected, vec![LinkAction::CancelReconnect]),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Check if the link is up.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if a (re)connection is in progress.
    pub fn is_recovering(&self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Reconnecting { .. } | Self::Resuming { .. }
        )
    }
}

impl Default for LinkState {
    fn default() -> Self {
        Self::new()
    }
}

/// Events that can occur in the link lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Caller asked to connect.
    ConnectRequested,
    /// Transport connection succeeded.
    ConnectSucceeded,
    /// Transport connection failed.
    ConnectFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// Transport reported the link dropped.
    TransportLost {
        /// Reason for disconnection.
        reason: String,
    },
    /// Caller asked to disconnect.
    DisconnectRequested,
    /// Reconnect timer fired.
    ReconnectTimer,
}

/// Actions to be executed by the subscription manager.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAction {
    /// Call the transport's connect.
    Connect,
    /// Close the transport.
    Disconnect,
    /// Wait, then feed [`LinkEvent::ReconnectTimer`].
    StartReconnectTimer {
        /// Delay before attempting reconnection.
        delay: Duration,
    },
    /// Cancel any pending reconnect timer.
    CancelReconnect,
    /// Reopen every active topic and reconcile message topics.
    ResubscribeAll,
    /// Reconnect budget exhausted: every subscription is lost.
    GiveUp,
    /// Report to the application.
    Emit(LinkNotice),
}

/// Link notices emitted to the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkNotice {
    /// Link established.
    Connected,
    /// Initial connection failed.
    ConnectionFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// Link dropped.
    Disconnected {
        /// Reason for disconnection.
        reason: String,
    },
    /// Link re-established.
    Reconnected {
        /// Attempts it took.
        attempts: u32,
    },
    /// A reconnection attempt failed.
    ReconnectFailed {
        /// Which reconnection attempt this was.
        attempt: u32,
        /// Error message describing the failure.
        error: String,
    },
}

/// Random jitter in `0..=max`, with millisecond resolution.
fn random_jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    let mut bytes = [0u8; 8];
    // Without entropy the delay is still bounded, just not spread.
    if getrandom::getrandom(&mut bytes).is_err() {
        return Duration::ZERO;
    }
    Duration::from_millis(u64::from_le_bytes(bytes) % (max_ms + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy::default()
    }

    #[test]
    fn starts_disconnected() {
        let state = LinkState::new();
        assert!(matches!(state, LinkState::Disconnected));
    }

    #[test]
    fn connect_request_transitions_to_connecting() {
        let (state, actions) = LinkState::Disconnected.on_event(LinkEvent::ConnectRequested, &policy());

        assert!(matches!(state, LinkState::Connecting));
        assert!(actions.iter().any(|a| matches!(a, LinkAction::Connect)));
    }

    #[test]
    fn connect_success_transitions_to_connected() {
        let (state, actions) = LinkState::Connecting.on_event(LinkEvent::ConnectSucceeded, &policy());

        assert!(state.is_connected());
        assert!(actions
            .iter()
            .any(|a| matches!(a, LinkAction::Emit(LinkNotice::Connected))));
        assert!(!actions.iter().any(|a| matches!(a, LinkAction::ResubscribeAll)));
    }

    #[test]
    fn initial_connect_failure_returns_to_disconnected() {
        let (state, actions) = LinkState::Connecting.on_event(
            LinkEvent::ConnectFailed {
                error: "timeout".into(),
            },
            &policy(),
        );

        assert!(matches!(state, LinkState::Disconnected));
        assert!(actions.iter().any(|a| matches!(
            a,
            LinkAction::Emit(LinkNotice::ConnectionFailed { error }) if error == "timeout"
        )));
        assert!(!actions
            .iter()
            .any(|a| matches!(a, LinkAction::StartReconnectTimer { .. })));
    }

    #[test]
    fn transport_lost_starts_reconnect_timer() {
        let (state, actions) = LinkState::Connected.on_event(
            LinkEvent::TransportLost {
                reason: "socket closed".into(),
            },
            &policy(),
        );

        assert!(matches!(state, LinkState::Reconnecting { attempt: 1 }));
        assert!(actions.iter().any(|a| matches!(
            a,
            LinkAction::Emit(LinkNotice::Disconnected { reason }) if reason == "socket closed"
        )));
        assert!(actions
            .iter()
            .any(|a| matches!(a, LinkAction::StartReconnectTimer { .. })));
    }

    #[test]
    fn full_reconnect_flow_resubscribes() {
        let policy = policy();
        let state = LinkState::Reconnecting { attempt: 3 };

        // Timer fires -> Resuming
        let (state, actions) = state.on_event(LinkEvent::ReconnectTimer, &policy);
        assert!(matches!(state, LinkState::Resuming { attempt: 3 }));
        assert!(actions.iter().any(|a| matches!(a, LinkAction::Connect)));

        // Connect succeeds -> Connected + resubscribe
        let (state, actions) = state.on_event(LinkEvent::ConnectSucceeded, &policy);
        assert!(state.is_connected());
        assert!(actions.iter().any(|a| matches!(a, LinkAction::ResubscribeAll)));
        assert!(actions.iter().any(|a| matches!(
            a,
            LinkAction::Emit(LinkNotice::Reconnected { attempts: 3 })
        )));
    }

    #[test]
    fn transport_reconnect_while_waiting_resubscribes() {
        let (state, actions) =
            LinkState::Reconnecting { attempt: 1 }.on_event(LinkEvent::ConnectSucceeded, &policy());
        assert!(state.is_connected());
        assert!(actions.iter().any(|a| matches!(a, LinkAction::ResubscribeAll)));
    }

    #[test]
    fn reconnect_failure_increments_attempt() {
        let (state, actions) = LinkState::Resuming { attempt: 2 }.on_event(
            LinkEvent::ConnectFailed {
                error: "timeout".into(),
            },
            &policy(),
        );

        assert!(matches!(state, LinkState::Reconnecting { attempt: 3 }));
        assert!(actions
            .iter()
            .any(|a| matches!(a, LinkAction::StartReconnectTimer { .. })));
    }

    #[test]
    fn reconnect_gives_up_when_budget_exhausted() {
        let policy = BackoffPolicy::immediate().with_max_attempts(Some(2));
        let (state, actions) = LinkState::Resuming { attempt: 2 }.on_event(
            LinkEvent::ConnectFailed {
                error: "refused".into(),
            },
            &policy,
        );

        assert!(matches!(state, LinkState::Failed { attempts: 2 }));
        assert!(actions.iter().any(|a| matches!(a, LinkAction::GiveUp)));
        assert!(!actions
            .iter()
            .any(|a| matches!(a, LinkAction::StartReconnectTimer { .. })));
    }

    #[test]
    fn failed_link_can_be_restarted() {
        let (state, actions) =
            LinkState::Failed { attempts: 4 }.on_event(LinkEvent::ConnectRequested, &policy());
        assert!(matches!(state, LinkState::Connecting));
        assert!(actions.iter().any(|a| matches!(a, LinkAction::Connect)));
    }

    #[test]
    fn disconnect_request_from_connected() {
        let (state, actions) = LinkState::Connected.on_event(LinkEvent::DisconnectRequested, &policy());

        assert!(matches!(state, LinkState::Disconnected));
        assert!(actions.iter().any(|a| matches!(a, LinkAction::Disconnect)));
    }

    #[test]
    fn disconnect_request_from_reconnecting_cancels() {
        let (state, actions) =
            LinkState::Reconnecting { attempt: 2 }.on_event(LinkEvent::DisconnectRequested, &policy());

        assert!(matches!(state, LinkState::Disconnected));
        assert!(actions.iter().any(|a| matches!(a, LinkAction::CancelReconnect)));
    }

    #[test]
    fn invalid_transition_is_ignored() {
        let (state, actions) = LinkState::Disconnected.on_event(LinkEvent::ReconnectTimer, &policy());
        assert!(matches!(state, LinkState::Disconnected));
        assert!(actions.is_empty());
    }

    #[test]
    fn helpers() {
        assert!(!LinkState::Disconnected.is_connected());
        assert!(LinkState::Connected.is_connected());
        assert!(LinkState::Connecting.is_recovering());
        assert!(LinkState::Resuming { attempt: 1 }.is_recovering());
        assert!(!LinkState::Failed { attempts: 1 }.is_recovering());
    }

    // ===========================================
    // Backoff Tests
    // ===========================================

    #[test]
    fn reconnect_backoff_increases_with_attempt() {
        // Attempt 1: base = 2s, attempt 3: base = 8s
        assert!(policy().delay(1) >= Duration::from_secs(2));
        assert!(policy().delay(3) >= Duration::from_secs(8));
    }

    #[test]
    fn reconnect_jitter_creates_variance() {
        let delays: Vec<Duration> = (0..20).map(|_| policy().delay(3)).collect();

        let min = delays.iter().min().unwrap();
        let max = delays.iter().max().unwrap();

        // Probabilistic: 20 samples over 5001 jitter values
        assert!(
            max.as_millis() - min.as_millis() >= 100,
            "Expected jitter variance, got min={:?} max={:?}",
            min,
            max
        );
    }

    #[test]
    fn reconnect_delay_capped_at_max_plus_jitter() {
        let delay = policy().delay(40);
        assert!(
            delay <= Duration::from_secs(35),
            "Reconnect delay must be capped at ~35s (30s base + 5s jitter), got {:?}",
            delay
        );
    }

    #[test]
    fn immediate_policy_never_waits() {
        let policy = BackoffPolicy::immediate();
        for attempt in 1..10 {
            assert_eq!(policy.delay(attempt), Duration::ZERO);
        }
        assert!(!policy.exhausted(1_000));
    }
}
