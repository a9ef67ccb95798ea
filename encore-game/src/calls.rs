//! Score-gated calls (cheers a band member can fire at the stage)

use crate::error::{GameError, Result};
use crate::scoring::ScoreState;
use encore_common::events::CallPayload;
use std::collections::HashSet;

/// One call preset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallDef {
    pub id: String,
    pub text: String,
    pub emoji: String,
    /// Score needed before the call unlocks
    pub required_score: u64,
    /// Points deducted on use (clamped at zero)
    pub cost: u64,
}

impl CallDef {
    fn new(id: &str, text: &str, emoji: &str, required_score: u64) -> Self {
        Self {
            id: id.to_string(),
            text: text.to_string(),
            emoji: emoji.to_string(),
            required_score,
            cost: 0,
        }
    }

    pub fn payload(&self) -> CallPayload {
        CallPayload {
            text: self.text.clone(),
            emoji: self.emoji.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CallCatalog {
    calls: Vec<CallDef>,
}

impl Default for CallCatalog {
    fn default() -> Self {
        Self {
            calls: vec![
                CallDef::new("yeah", "イェーイ！", "🎉", 500),
                CallDef::new("fuu", "フゥー！", "🔥", 1_500),
                CallDef::new("saikou", "サイコー！", "⭐", 3_000),
                CallDef::new("encore", "アンコール！", "👏", 5_000),
            ],
        }
    }
}

impl CallCatalog {
    pub fn new(calls: Vec<CallDef>) -> Self {
        Self { calls }
    }

    pub fn get(&self, id: &str) -> Option<&CallDef> {
        self.calls.iter().find(|c| c.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CallDef> {
        self.calls.iter()
    }
}

/// Per-session call usage; each call fires at most once
#[derive(Debug, Clone, Default)]
pub struct CallTracker {
    catalog: CallCatalog,
    used: HashSet<String>,
}

impl CallTracker {
    pub fn new(catalog: CallCatalog) -> Self {
        Self {
            catalog,
            used: HashSet::new(),
        }
    }

    pub fn catalog(&self) -> &CallCatalog {
        &self.catalog
    }

    pub fn is_used(&self, id: &str) -> bool {
        self.used.contains(id)
    }

    /// Calls unlocked at `score` and not yet used
    pub fn available(&self, score: u64) -> Vec<&CallDef> {
        self.catalog
            .iter()
            .filter(|c| score >= c.required_score && !self.used.contains(&c.id))
            .collect()
    }

    /// Fire a call, spending its cost from `score`
    pub fn use_call(&mut self, id: &str, score: &mut ScoreState) -> Result<CallPayload> {
        let call = self
            .catalog
            .get(id)
            .ok_or_else(|| GameError::UnknownCall(id.to_string()))?;

        if self.used.contains(id) {
            return Err(GameError::CallAlreadyUsed(id.to_string()));
        }
        if score.score < call.required_score {
            return Err(GameError::CallLocked {
                id: id.to_string(),
                required: call.required_score,
                score: score.score,
            });
        }

        score.spend(call.cost);
        let payload = call.payload();
        self.used.insert(id.to_string());
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(points: u64) -> ScoreState {
        ScoreState {
            score: points,
            ..Default::default()
        }
    }

    #[test]
    fn test_locked_until_threshold() {
        let mut tracker = CallTracker::default();
        let mut s = score(499);
        assert!(matches!(
            tracker.use_call("yeah", &mut s),
            Err(GameError::CallLocked { required: 500, .. })
        ));

        s.score = 500;
        let payload = tracker.use_call("yeah", &mut s).unwrap();
        assert_eq!(payload.emoji, "🎉");
    }

    #[test]
    fn test_each_call_fires_once() {
        let mut tracker = CallTracker::default();
        let mut s = score(10_000);
        tracker.use_call("encore", &mut s).unwrap();
        assert_eq!(
            tracker.use_call("encore", &mut s),
            Err(GameError::CallAlreadyUsed("encore".into()))
        );
        assert_eq!(tracker.available(10_000).len(), 3);
    }

    #[test]
    fn test_cost_is_clamped() {
        let mut tracker = CallTracker::new(CallCatalog::new(vec![CallDef {
            cost: 100,
            ..CallDef::new("pricey", "!", "💸", 0)
        }]));
        let mut s = score(40);
        tracker.use_call("pricey", &mut s).unwrap();
        assert_eq!(s.score, 0);
    }

    #[test]
    fn test_unknown_call() {
        let mut tracker = CallTracker::default();
        assert!(matches!(
            tracker.use_call("nope", &mut score(0)),
            Err(GameError::UnknownCall(_))
        ));
    }
}
