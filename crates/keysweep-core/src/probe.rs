//! Per-position candidate test

use std::sync::Arc;

use keysweep_filter::TwoTierFilter;
use keysweep_keys::CandidateSource;
use tracing::{debug, warn};

use crate::error::ScanError;
use crate::online::ActivityCheck;
use crate::results::{MatchReason, MatchResult};

/// How a candidate is confirmed
#[derive(Clone)]
pub enum Verifier {
    /// Two-tier lookup against the target set
    Membership(Arc<TwoTierFilter>),
    /// External activity check
    Online(Arc<dyn ActivityCheck>),
}

/// How a position becomes a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMode {
    /// The key whose scalar is the position
    Positional,
    /// A fresh random key; the position is only a counter
    Random,
}

/// Turns one position into a candidate and verifies it
#[derive(Clone)]
pub struct Probe {
    source: Arc<dyn CandidateSource>,
    verifier: Verifier,
    mode: ProbeMode,
}

impl Probe {
    pub fn new(source: Arc<dyn CandidateSource>, verifier: Verifier, mode: ProbeMode) -> Self {
        Self {
            source,
            verifier,
            mode,
        }
    }

    /// `Ok(None)` for no match. Only store failures are errors; invalid
    /// positions and network failures count as no match.
    pub fn check(&self, position: u128) -> Result<Option<MatchResult>, ScanError> {
        let candidate = match self.mode {
            ProbeMode::Positional => match self.source.from_position(position) {
                Ok(candidate) => candidate,
                Err(e) => {
                    debug!(position = %position, error = %e, "skipping position");
                    return Ok(None);
                }
            },
            ProbeMode::Random => self.source.generate(),
        };

        let reason = match &self.verifier {
            Verifier::Membership(filter) => filter
                .test(&candidate.identifier)?
                .is_confirmed()
                .then_some(MatchReason::TargetConfirmed),
            Verifier::Online(checker) => match checker.check_activity(&candidate.identifier) {
                Ok(active) => active.then_some(MatchReason::ActiveOnline),
                Err(e) => {
                    warn!(identifier = %candidate.identifier, error = %e, "activity check failed");
                    None
                }
            },
        };

        Ok(reason.map(|reason| MatchResult {
            secret: candidate.export_secret().to_string(),
            identifier: candidate.identifier,
            reason,
            position: (self.mode == ProbeMode::Positional).then_some(position),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::online::NetworkError;
    use keysweep_filter::{BloomConfig, MemoryStore};
    use keysweep_keys::{Bitcoin, CandidateSource};

    const KEY_ONE: &str = "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH";

    fn membership(identifiers: &[&str]) -> Verifier {
        let store = Arc::new(MemoryStore::with_identifiers(identifiers.iter().copied()));
        let config = BloomConfig {
            capacity: 1_000,
            false_positive_rate: 0.01,
        };
        Verifier::Membership(Arc::new(TwoTierFilter::new(store, config).unwrap()))
    }

    struct FixedAnswer(Result<bool, u16>);

    impl ActivityCheck for FixedAnswer {
        fn check_activity(&self, _identifier: &str) -> Result<bool, NetworkError> {
            self.0.map_err(NetworkError::Status)
        }
    }

    #[test]
    fn test_positional_match() {
        let probe = Probe::new(Arc::new(Bitcoin::default()), membership(&[KEY_ONE]), ProbeMode::Positional);

        let result = probe.check(1).unwrap().unwrap();
        assert_eq!(result.identifier, KEY_ONE);
        assert_eq!(result.secret, "KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU73sVHnoWn");
        assert_eq!(result.position, Some(1));
        assert!(probe.check(2).unwrap().is_none());
    }

    #[test]
    fn test_invalid_position_is_skipped() {
        let probe = Probe::new(Arc::new(Bitcoin::default()), membership(&[KEY_ONE]), ProbeMode::Positional);
        assert!(probe.check(0).unwrap().is_none());
    }

    #[test]
    fn test_online_errors_are_no_match() {
        let source: Arc<dyn CandidateSource> = Arc::new(Bitcoin::default());

        let failing = Probe::new(source.clone(), Verifier::Online(Arc::new(FixedAnswer(Err(429)))), ProbeMode::Random);
        assert!(failing.check(0).unwrap().is_none());

        let active = Probe::new(source, Verifier::Online(Arc::new(FixedAnswer(Ok(true)))), ProbeMode::Random);
        let result = active.check(7).unwrap().unwrap();
        assert_eq!(result.reason, MatchReason::ActiveOnline);
        assert_eq!(result.position, None);
    }
}
