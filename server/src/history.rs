//! Results of recently finished rounds, served to GET_HISTORY.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct RoundSummary {
    pub lobby: String,
    pub round: u32,
    pub winner: Option<String>,
    pub winner_gold: u32,
    pub duration_secs: u64,
    pub players: usize,
}

impl fmt::Display for RoundSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} round {}: ", self.lobby, self.round)?;
        match &self.winner {
            Some(winner) => write!(f, "{} won with {} gold", winner, self.winner_gold)?,
            None => write!(f, "no winner")?,
        }
        write!(f, " after {}s ({} players)", self.duration_secs, self.players)
    }
}

/// Bounded, newest last.
pub struct RoundHistory {
    rounds: Mutex<VecDeque<RoundSummary>>,
    capacity: usize,
}

impl RoundHistory {
    pub const SEPARATOR: &'static str = " | ";

    pub fn new(capacity: usize) -> Self {
        Self {
            rounds: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn record(&self, summary: RoundSummary) {
        if self.capacity == 0 {
            return;
        }
        let mut rounds = self.rounds.lock();
        while rounds.len() >= self.capacity {
            rounds.pop_front();
        }
        rounds.push_back(summary);
    }

    pub fn recent(&self) -> Vec<RoundSummary> {
        self.rounds.lock().iter().cloned().collect()
    }

    /// One line of text listing every kept round. Empty when nothing was played.
    pub fn summary(&self) -> String {
        self.rounds
            .lock()
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(Self::SEPARATOR)
    }

    pub fn len(&self) -> usize {
        self.rounds.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round(lobby: &str, round: u32, winner: Option<&str>) -> RoundSummary {
        RoundSummary {
            lobby: lobby.to_string(),
            round,
            winner: winner.map(str::to_string),
            winner_gold: 3100,
            duration_secs: 95,
            players: 3,
        }
    }

    #[test]
    fn test_summary_text() {
        assert_eq!(
            round("Deep", 2, Some("Alice")).to_string(),
            "Deep round 2: Alice won with 3100 gold after 95s (3 players)"
        );
        assert_eq!(
            round("Deep", 1, None).to_string(),
            "Deep round 1: no winner after 95s (3 players)"
        );
    }

    #[test]
    fn test_history_is_bounded() {
        let history = RoundHistory::new(2);
        history.record(round("A", 1, None));
        history.record(round("B", 1, None));
        history.record(round("C", 1, None));

        let lobbies: Vec<String> = history.recent().into_iter().map(|r| r.lobby).collect();
        assert_eq!(lobbies, vec!["B", "C"]);
    }

    #[test]
    fn test_empty_summary() {
        let history = RoundHistory::new(5);
        assert!(history.is_empty());
        assert_eq!(history.summary(), "");
    }

    #[test]
    fn test_summary_joins_rounds() {
        let history = RoundHistory::new(5);
        history.record(round("A", 1, Some("Alice")));
        history.record(round("B", 3, None));
        let text = history.summary();
        assert_eq!(text.matches(RoundHistory::SEPARATOR).count(), 1);
        assert!(text.starts_with("A round 1"));
        assert!(!text.contains('\n'));
    }
}
