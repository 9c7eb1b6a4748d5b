//! Participant roster for group sessions
//!
//! Kept apart from the device registry: a participant may reference a
//! device, but losing that device's connection leaves the roster alone.

use coherence_shared::metrics;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Someone taking part in the current session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
    /// Informational only; never used to look anything up
    pub device_id: Option<String>,
    pub hrv: f64,
    pub heart_rate: f64,
    pub coherence: f64,
}

impl Participant {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            device_id: None,
            hrv: 0.0,
            heart_rate: 0.0,
            coherence: 0.0,
        }
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_telemetry(mut self, hrv: f64, heart_rate: f64, coherence: f64) -> Self {
        self.hrv = hrv;
        self.heart_rate = heart_rate;
        self.coherence = coherence;
        self
    }
}

/// Ordered list of participants
#[derive(Debug, Default, Clone)]
pub struct ParticipantRoster {
    participants: Vec<Participant>,
}

impl ParticipantRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a participant
    ///
    /// Duplicate ids are accepted; callers that need uniqueness dedupe first.
    pub fn add(&mut self, participant: Participant) {
        if self.participants.iter().any(|p| p.id == participant.id) {
            warn!(participant = %participant.id, "Adding participant with duplicate id");
        }
        self.participants.push(participant);
    }

    /// Remove every entry with this id, returning how many were removed
    pub fn remove(&mut self, id: &str) -> usize {
        let before = self.participants.len();
        self.participants.retain(|p| p.id != id);
        before - self.participants.len()
    }

    /// Overwrite the telemetry of the first entry with this id
    pub fn update(&mut self, id: &str, hrv: f64, heart_rate: f64, coherence: f64) -> bool {
        match self.participants.iter_mut().find(|p| p.id == id) {
            Some(p) => {
                p.hrv = hrv;
                p.heart_rate = heart_rate;
                p.coherence = coherence;
                true
            }
            None => false,
        }
    }

    pub fn to_vec(&self) -> Vec<Participant> {
        self.participants.clone()
    }

    /// Mean coherence across all entries, 0 when empty
    pub fn average_coherence(&self) -> f64 {
        metrics::mean(self.participants.iter().map(|p| p.coherence))
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_coherence() {
        let mut roster = ParticipantRoster::new();
        assert_eq!(roster.average_coherence(), 0.0);

        roster.add(Participant::new("a", "Ann").with_telemetry(50.0, 60.0, 80.0));
        roster.add(Participant::new("b", "Ben").with_telemetry(40.0, 70.0, 60.0));
        assert_eq!(roster.average_coherence(), 70.0);
    }

    #[test]
    fn test_duplicates_are_kept_and_removed_together() {
        let mut roster = ParticipantRoster::new();
        roster.add(Participant::new("a", "Ann"));
        roster.add(Participant::new("a", "Ann again"));
        roster.add(Participant::new("b", "Ben"));
        assert_eq!(roster.len(), 3);

        assert_eq!(roster.remove("a"), 2);
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.remove("a"), 0);
    }

    #[test]
    fn test_update_first_match_only() {
        let mut roster = ParticipantRoster::new();
        roster.add(Participant::new("a", "first"));
        roster.add(Participant::new("a", "second"));

        assert!(roster.update("a", 55.0, 65.0, 75.0));
        let entries = roster.to_vec();
        assert_eq!(entries[0].coherence, 75.0);
        assert_eq!(entries[1].coherence, 0.0);

        assert!(!roster.update("missing", 1.0, 1.0, 1.0));
    }

    #[test]
    fn test_order_is_preserved() {
        let mut roster = ParticipantRoster::new();
        for id in ["c", "a", "b"] {
            roster.add(Participant::new(id, id).with_device(format!("dev-{}", id)));
        }
        let entries = roster.to_vec();
        let ids: Vec<&str> = entries.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["c", "a", "b"]);
        assert_eq!(entries[1].device_id.as_deref(), Some("dev-a"));
    }
}
