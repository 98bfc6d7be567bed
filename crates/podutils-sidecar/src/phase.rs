use std::fmt;

/// Where a sidecar run is. Runs only move forward, one step at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Waiting,
    Collecting,
    Reporting,
    Done,
}

impl Phase {
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Waiting => Some(Phase::Collecting),
            Phase::Collecting => Some(Phase::Reporting),
            Phase::Reporting => Some(Phase::Done),
            Phase::Done => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Waiting => "waiting",
            Phase::Collecting => "collecting",
            Phase::Reporting => "reporting",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid phase transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: Phase,
    pub to: Phase,
}

#[derive(Debug)]
pub struct PhaseTracker {
    current: Phase,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            current: Phase::Waiting,
        }
    }

    pub fn current(&self) -> Phase {
        self.current
    }

    pub fn advance(&mut self, to: Phase) -> Result<(), InvalidTransition> {
        if self.current.next() != Some(to) {
            return Err(InvalidTransition {
                from: self.current,
                to,
            });
        }
        self.current = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_forward() {
        let mut tracker = PhaseTracker::new();
        for phase in [Phase::Collecting, Phase::Reporting, Phase::Done] {
            tracker.advance(phase).unwrap();
            assert_eq!(tracker.current(), phase);
        }
        assert_eq!(tracker.current().next(), None);
    }

    #[test]
    fn rejects_backward_and_skipped_transitions() {
        let mut tracker = PhaseTracker::new();
        assert_eq!(
            tracker.advance(Phase::Reporting),
            Err(InvalidTransition {
                from: Phase::Waiting,
                to: Phase::Reporting
            })
        );

        tracker.advance(Phase::Collecting).unwrap();
        assert!(tracker.advance(Phase::Waiting).is_err());
        assert!(tracker.advance(Phase::Collecting).is_err());
        assert_eq!(tracker.current(), Phase::Collecting);
    }

    #[test]
    fn display_names() {
        assert_eq!(Phase::Waiting.to_string(), "waiting");
        assert_eq!(
            InvalidTransition {
                from: Phase::Done,
                to: Phase::Waiting
            }
            .to_string(),
            "invalid phase transition from done to waiting"
        );
    }
}
