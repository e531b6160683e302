//! Ordered-retry combinator
//!
//! Runs strategies in order until one produces a value. Empty results and
//! failures both move on to the next strategy; failures are kept so the
//! caller can log them.

/// Result of [`try_in_order`]
#[derive(Debug)]
pub struct SequenceOutcome<S, T, E> {
    /// Winning strategy and its value
    pub winner: Option<(S, T)>,
    /// Strategies that failed, in the order they ran
    pub failures: Vec<(S, E)>,
    /// Number of strategies that ran
    pub tried: usize,
}

impl<S, T, E> SequenceOutcome<S, T, E> {
    pub fn found(&self) -> bool {
        self.winner.is_some()
    }

    pub fn into_value(self) -> Option<T> {
        self.winner.map(|(_, value)| value)
    }
}

/// Try `strategies` in order; the first `Ok(Some(_))` wins
pub fn try_in_order<S, T, E, I, F>(strategies: I, mut attempt: F) -> SequenceOutcome<S, T, E>
where
    I: IntoIterator<Item = S>,
    F: FnMut(&S) -> Result<Option<T>, E>,
{
    let mut failures = Vec::new();
    let mut tried = 0;

    for strategy in strategies {
        tried += 1;
        match attempt(&strategy) {
            Ok(Some(value)) => {
                return SequenceOutcome {
                    winner: Some((strategy, value)),
                    failures,
                    tried,
                }
            }
            Ok(None) => {}
            Err(e) => failures.push((strategy, e)),
        }
    }

    SequenceOutcome {
        winner: None,
        failures,
        tried,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_success_wins() {
        let mut seen = Vec::new();
        let outcome = try_in_order([1, 2, 3, 4], |n| -> Result<Option<i32>, ()> {
            seen.push(*n);
            Ok((*n >= 2).then_some(n * 10))
        });
        assert_eq!(outcome.winner, Some((2, 20)));
        assert_eq!(outcome.tried, 2);
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn test_failures_do_not_abort() {
        let outcome = try_in_order(["a", "b", "c"], |s| match *s {
            "a" => Err("engine"),
            "b" => Ok(None),
            _ => Ok(Some(s.len())),
        });
        assert_eq!(outcome.failures, vec![("a", "engine")]);
        assert_eq!(outcome.into_value(), Some(1));
    }

    #[test]
    fn test_exhausted() {
        let outcome = try_in_order(0..3, |_| -> Result<Option<()>, &str> { Err("nope") });
        assert!(!outcome.found());
        assert_eq!(outcome.tried, 3);
        assert_eq!(outcome.failures.len(), 3);
    }
}
