use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;
use tracing::debug;

use crate::errors::AutomationError;

/// A bounded poll: at most `attempts` checks with `interval_ms` between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollConfig {
    pub attempts: u32,
    pub interval_ms: u64,
}

impl PollConfig {
    pub const fn new(attempts: u32, interval_ms: u64) -> Self {
        Self {
            attempts,
            interval_ms,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Worst-case time spent sleeping by [`PollConfig::poll`].
    pub fn budget(&self) -> Duration {
        self.interval() * self.attempts.saturating_sub(1)
    }

    /// Run `check` until it reports `true` or the attempts run out.
    ///
    /// Exhausting the bound is an ordinary outcome and yields `Ok(false)`. Soft errors such as
    /// a node vanishing mid-redraw count as "not yet"; hard failures end the poll immediately.
    pub fn poll<F>(&self, what: &str, mut check: F) -> Result<bool, AutomationError>
    where
        F: FnMut() -> Result<bool, AutomationError>,
    {
        let attempts = self.attempts.max(1);
        for attempt in 1..=attempts {
            match check() {
                Ok(true) => {
                    debug!(what, attempt, "poll condition reached");
                    return Ok(true);
                }
                Ok(false) => {}
                Err(e) if e.is_hard_failure() => return Err(e),
                Err(e) => debug!(what, attempt, error = %e, "poll check failed, retrying"),
            }
            if attempt < attempts {
                thread::sleep(self.interval());
            }
        }
        debug!(what, attempts, "poll bound exhausted");
        Ok(false)
    }
}

/// Retry and timing constants of the automation engine.
///
/// The defaults were tuned against the desktop client on an idle machine. They are plain data
/// so the agent can load them from a config file or the command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutomationConfig {
    /// Waiting for a chat filter toggle to report itself selected.
    pub filter: PollConfig,
    /// Waiting for the conversation header to show the chat that was clicked.
    pub open_chat: PollConfig,
    /// Waiting for the search panel to appear after typing a query.
    pub search_populate: PollConfig,
    /// Waiting for the client to leave search mode.
    pub search_clear: PollConfig,
    /// Waiting for a sent message to show up in the conversation.
    pub send_verify: PollConfig,
    /// Waiting for a tab to report itself selected.
    pub tab_navigation: PollConfig,
    /// Pause after synthetic input before reading the tree again.
    pub settle_delay_ms: u64,
    /// Depth bound for element lookups below the main window.
    pub max_search_depth: usize,
    /// How many of the newest messages are inspected when verifying a send.
    pub send_verify_window: usize,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            filter: PollConfig::new(10, 100),
            open_chat: PollConfig::new(15, 200),
            search_populate: PollConfig::new(20, 150),
            search_clear: PollConfig::new(10, 100),
            send_verify: PollConfig::new(20, 250),
            tab_navigation: PollConfig::new(10, 100),
            settle_delay_ms: 150,
            max_search_depth: 12,
            send_verify_window: 5,
        }
    }
}

impl AutomationConfig {
    /// Tight bounds with no real waiting, for driving the in-memory simulator.
    pub fn immediate() -> Self {
        let fast = PollConfig::new(8, 1);
        Self {
            filter: fast,
            open_chat: fast,
            search_populate: fast,
            search_clear: fast,
            send_verify: fast,
            tab_navigation: fast,
            settle_delay_ms: 0,
            ..Self::default()
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Reject values that would turn every poll into a no-op.
    pub fn validate(&self) -> Result<(), AutomationError> {
        let polls = [
            ("filter", &self.filter),
            ("openChat", &self.open_chat),
            ("searchPopulate", &self.search_populate),
            ("searchClear", &self.search_clear),
            ("sendVerify", &self.send_verify),
            ("tabNavigation", &self.tab_navigation),
        ];
        for (name, poll) in polls {
            if poll.attempts == 0 {
                return Err(AutomationError::InvalidArgument(format!(
                    "{name}.attempts must be at least 1"
                )));
            }
        }
        if self.max_search_depth == 0 {
            return Err(AutomationError::InvalidArgument(
                "maxSearchDepth must be at least 1".to_string(),
            ));
        }
        if self.send_verify_window == 0 {
            return Err(AutomationError::InvalidArgument(
                "sendVerifyWindow must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_poll_stops_at_first_success() {
        let calls = Cell::new(0);
        let reached = PollConfig::new(5, 0)
            .poll("third try", || {
                calls.set(calls.get() + 1);
                Ok(calls.get() == 3)
            })
            .unwrap();
        assert!(reached);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_poll_exhaustion_is_not_an_error() {
        let calls = Cell::new(0);
        let reached = PollConfig::new(4, 0)
            .poll("never", || {
                calls.set(calls.get() + 1);
                Err(AutomationError::ElementNotFound("row".to_string()))
            })
            .unwrap();
        assert!(!reached);
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn test_poll_propagates_hard_failures() {
        let calls = Cell::new(0);
        let err = PollConfig::new(4, 0)
            .poll("gone", || {
                calls.set(calls.get() + 1);
                Err(AutomationError::AccessibilityUnavailable("gone".to_string()))
            })
            .unwrap_err();
        assert!(err.is_hard_failure());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_partial_config_file_keeps_defaults() {
        let config: AutomationConfig = serde_json::from_str(
            r#"{"sendVerify": {"attempts": 3, "intervalMs": 50}, "sendVerifyWindow": 2}"#,
        )
        .unwrap();
        assert_eq!(config.send_verify, PollConfig::new(3, 50));
        assert_eq!(config.send_verify_window, 2);
        assert_eq!(config.filter, AutomationConfig::default().filter);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let config = AutomationConfig {
            open_chat: PollConfig::new(0, 10),
            ..AutomationConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
