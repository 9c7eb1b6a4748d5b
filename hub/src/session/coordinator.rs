//! Session coordinator
//!
//! Owns the session state machine, the duration timer and the participant
//! roster. Accrued duration is always recomputed from an anchor instant
//! rather than counted tick by tick, so scheduling jitter never adds up.
//!
//! Every method must be called from the hub actor; ticks arrive there too.

use super::roster::{Participant, ParticipantRoster};
use super::timer::{SessionTick, SessionTimer, MIN_TICK_PERIOD};
use crate::notify::{HubNotification, Notifier};
use coherence_shared::{
    metrics, SessionEvent, SessionKind, SessionState, SessionStateMachine, TransitionResult,
};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Read-only view of the session for external consumers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub kind: SessionKind,
    pub accrued: Duration,
    pub target: Duration,
    pub progress: f64,
    pub average_coherence: f64,
    pub participant_count: usize,
}

pub struct SessionCoordinator {
    fsm: SessionStateMachine,
    /// Instant the accrued duration is measured from; re-based on resume
    anchor: Option<Instant>,
    accrued: Duration,
    target: Duration,
    tick_interval: Duration,
    timer: Option<SessionTimer>,
    generation: u64,
    ticks: mpsc::Sender<SessionTick>,
    roster: ParticipantRoster,
    notifier: Notifier,
}

impl SessionCoordinator {
    pub fn new(
        target: Duration,
        tick_interval: Duration,
        ticks: mpsc::Sender<SessionTick>,
        notifier: Notifier,
    ) -> Self {
        if tick_interval < MIN_TICK_PERIOD {
            warn!("Tick interval {:?} raised to {:?}", tick_interval, MIN_TICK_PERIOD);
        }

        Self {
            fsm: SessionStateMachine::new(),
            anchor: None,
            accrued: Duration::ZERO,
            target,
            tick_interval: tick_interval.max(MIN_TICK_PERIOD),
            timer: None,
            generation: 0,
            ticks,
            roster: ParticipantRoster::new(),
            notifier,
        }
    }

    pub fn state(&self) -> SessionState {
        self.fsm.state()
    }

    pub fn kind(&self) -> SessionKind {
        self.fsm.kind()
    }

    pub fn accrued(&self) -> Duration {
        self.accrued
    }

    pub fn target_duration(&self) -> Duration {
        self.target
    }

    /// Change the target; evaluated on the next tick, never retroactively
    pub fn set_target_duration(&mut self, target: Duration) {
        debug!("Session target set to {:?}", target);
        self.target = target;
    }

    pub fn is_timer_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Start a session, replacing any session in progress
    pub fn start_session(&mut self, kind: SessionKind) {
        let result = self.fsm.process_event(SessionEvent::Start(kind));

        self.accrued = Duration::ZERO;
        self.anchor = Some(Instant::now());
        self.restart_timer();

        info!("Session started: {} (target {:?})", kind, self.target);
        self.notify_transition(result);
    }

    /// Pause an active session; no-op otherwise
    pub fn pause_session(&mut self) -> bool {
        if self.fsm.state() != SessionState::Active {
            debug!("Pause ignored in state {}", self.fsm.state());
            return false;
        }

        self.update_accrued(Instant::now());
        let result = self.fsm.process_event(SessionEvent::Pause);
        self.stop_timer();

        info!("Session paused at {:?}", self.accrued);
        self.notify_transition(result);
        true
    }

    /// Resume a paused session from its frozen duration; no-op otherwise
    pub fn resume_session(&mut self) -> bool {
        if self.fsm.state() != SessionState::Paused {
            debug!("Resume ignored in state {}", self.fsm.state());
            return false;
        }

        let now = Instant::now();
        self.anchor = Some(now.checked_sub(self.accrued).unwrap_or(now));
        let result = self.fsm.process_event(SessionEvent::Resume);
        self.restart_timer();

        info!("Session resumed at {:?}", self.accrued);
        self.notify_transition(result);
        true
    }

    /// End the session from any state, returning its final duration
    pub fn end_session(&mut self) -> Duration {
        self.end_at(Instant::now())
    }

    /// Handle a timer tick
    ///
    /// Returns true if this tick reached the target and ended the session.
    pub fn on_tick(&mut self, tick: SessionTick) -> bool {
        match &self.timer {
            Some(timer) if timer.generation() == tick.generation => self.tick_at(Instant::now()),
            _ => {
                debug!("Ignoring stale tick (generation {})", tick.generation);
                false
            }
        }
    }

    fn tick_at(&mut self, now: Instant) -> bool {
        if self.fsm.state() != SessionState::Active {
            return false;
        }

        self.update_accrued(now);
        self.notifier.notify(HubNotification::SessionTick {
            accrued: self.accrued,
            progress: self.session_progress(),
        });

        if self.accrued < self.target {
            return false;
        }

        let kind = self.fsm.kind();
        info!("Session target {:?} reached", self.target);
        let duration = self.end_at(now);
        self.notifier
            .notify(HubNotification::SessionCompleted { kind, duration });
        true
    }

    fn end_at(&mut self, now: Instant) -> Duration {
        if self.fsm.state() == SessionState::Active {
            self.update_accrued(now);
        }
        let final_duration = self.accrued;
        let kind = self.fsm.kind();

        let result = self.fsm.process_event(SessionEvent::End);
        self.stop_timer();

        if matches!(result, TransitionResult::Success { from, .. } if from != SessionState::Idle) {
            info!("Session ended: {} after {:?}", kind, final_duration);
        }

        self.accrued = Duration::ZERO;
        self.anchor = None;
        self.notify_transition(result);
        final_duration
    }

    /// Recompute from the anchor; never moves backwards
    fn update_accrued(&mut self, now: Instant) {
        if let Some(anchor) = self.anchor {
            self.accrued = self.accrued.max(now.saturating_duration_since(anchor));
        }
    }

    fn restart_timer(&mut self) {
        self.generation += 1;
        self.timer = Some(SessionTimer::start(
            self.generation,
            self.tick_interval,
            self.ticks.clone(),
        ));
    }

    fn stop_timer(&mut self) {
        self.timer = None;
    }

    fn notify_transition(&self, result: TransitionResult) {
        if let TransitionResult::Success { from, to } = result {
            if from == SessionState::Idle && to == SessionState::Idle {
                return;
            }
            self.notifier.notify(HubNotification::SessionStateChanged {
                from,
                to,
                kind: self.fsm.kind(),
            });
        }
    }

    /// Fraction of the target completed, capped at 1
    pub fn session_progress(&self) -> f64 {
        metrics::session_progress(self.accrued, self.target)
    }

    /// Mean participant coherence, 0 with no participants
    pub fn average_coherence(&self) -> f64 {
        self.roster.average_coherence()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state(),
            kind: self.kind(),
            accrued: self.accrued,
            target: self.target,
            progress: self.session_progress(),
            average_coherence: self.average_coherence(),
            participant_count: self.roster.len(),
        }
    }

    pub fn roster(&self) -> &ParticipantRoster {
        &self.roster
    }

    pub fn add_participant(&mut self, participant: Participant) {
        info!(participant = %participant.id, "Participant added: {}", participant.name);
        self.roster.add(participant);
        self.notify_participants();
    }

    pub fn remove_participant(&mut self, id: &str) -> usize {
        let removed = self.roster.remove(id);
        if removed > 0 {
            info!(participant = %id, "Participant removed");
            self.notify_participants();
        }
        removed
    }

    pub fn update_participant(&mut self, id: &str, hrv: f64, heart_rate: f64, coherence: f64) -> bool {
        let updated = self.roster.update(id, hrv, heart_rate, coherence);
        if updated {
            self.notify_participants();
        }
        updated
    }

    fn notify_participants(&self) {
        self.notifier.notify(HubNotification::ParticipantsChanged {
            count: self.roster.len(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast;
    use tokio::time::advance;

    fn coordinator() -> (SessionCoordinator, broadcast::Receiver<HubNotification>) {
        // Ticks are delivered by hand; the timer's own ticks go nowhere
        let (tx, _) = mpsc::channel(64);
        let notifier = Notifier::new(64);
        let notifications = notifier.subscribe();
        let c = SessionCoordinator::new(Duration::from_secs(600), Duration::from_secs(1), tx, notifier);
        (c, notifications)
    }

    /// Deliver a tick from the currently running timer
    fn tick(c: &mut SessionCoordinator) -> bool {
        let generation = c.timer.as_ref().map(SessionTimer::generation).unwrap_or(0);
        c.on_tick(SessionTick { generation })
    }

    fn drain(rx: &mut broadcast::Receiver<HubNotification>) -> Vec<HubNotification> {
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_resets_duration_from_any_state() {
        let (mut c, _rx) = coordinator();

        c.start_session(SessionKind::Solo);
        advance(Duration::from_secs(30)).await;
        tick(&mut c);
        assert_eq!(c.accrued(), Duration::from_secs(30));

        c.pause_session();
        c.start_session(SessionKind::Group);
        assert_eq!(c.state(), SessionState::Active);
        assert_eq!(c.kind(), SessionKind::Group);
        assert_eq!(c.accrued(), Duration::ZERO);
        assert!(c.is_timer_running());

        c.start_session(SessionKind::Ambient);
        assert_eq!(c.state(), SessionState::Active);
        assert_eq!(c.accrued(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_resume_are_noops_in_wrong_state() {
        let (mut c, _rx) = coordinator();

        assert!(!c.pause_session());
        assert!(!c.resume_session());
        assert_eq!(c.state(), SessionState::Idle);

        c.start_session(SessionKind::Solo);
        advance(Duration::from_secs(5)).await;
        tick(&mut c);

        assert!(!c.resume_session());
        assert_eq!(c.state(), SessionState::Active);
        assert_eq!(c.accrued(), Duration::from_secs(5));

        assert!(c.pause_session());
        let frozen = c.accrued();
        assert!(!c.pause_session());
        assert_eq!(c.state(), SessionState::Paused);
        assert_eq!(c.accrued(), frozen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_frozen_while_paused() {
        let (mut c, _rx) = coordinator();
        c.start_session(SessionKind::Solo);

        advance(Duration::from_secs(100)).await;
        tick(&mut c);
        assert_eq!(c.accrued(), Duration::from_secs(100));

        c.pause_session();
        assert!(!c.is_timer_running());
        advance(Duration::from_secs(50)).await;
        tick(&mut c);
        c.on_tick(SessionTick { generation: 1 });
        assert_eq!(c.accrued(), Duration::from_secs(100));

        c.resume_session();
        advance(Duration::from_secs(10)).await;
        tick(&mut c);
        assert_eq!(c.accrued(), Duration::from_secs(110));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_non_decreasing_while_active() {
        let (mut c, _rx) = coordinator();
        c.start_session(SessionKind::Solo);

        let mut last = Duration::ZERO;
        for step in [1, 3, 0, 2, 1] {
            advance(Duration::from_millis(step * 700)).await;
            tick(&mut c);
            assert!(c.accrued() >= last);
            last = c.accrued();
        }
        assert_eq!(last, Duration::from_millis(7 * 700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_target_reached_ends_on_same_tick() {
        let (mut c, mut rx) = coordinator();
        c.start_session(SessionKind::Solo);
        drain(&mut rx);

        advance(Duration::from_secs(599)).await;
        assert!(!tick(&mut c));
        assert_eq!(c.state(), SessionState::Active);

        advance(Duration::from_secs(1)).await;
        assert!(tick(&mut c));
        assert_eq!(c.state(), SessionState::Idle);
        assert_eq!(c.accrued(), Duration::ZERO);
        assert!(!c.is_timer_running());

        let notifications = drain(&mut rx);
        assert!(matches!(
            notifications.last(),
            Some(HubNotification::SessionCompleted { kind: SessionKind::Solo, duration })
                if *duration == Duration::from_secs(600)
        ));
        assert!(notifications.iter().any(|n| matches!(
            n,
            HubNotification::SessionStateChanged { from: SessionState::Active, to: SessionState::Idle, .. }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_target_change_applies_on_next_tick() {
        let (mut c, _rx) = coordinator();
        c.start_session(SessionKind::Solo);

        advance(Duration::from_secs(300)).await;
        tick(&mut c);
        assert_eq!(c.session_progress(), 0.5);

        c.set_target_duration(Duration::from_secs(200));
        assert_eq!(c.state(), SessionState::Active);

        advance(Duration::from_secs(1)).await;
        assert!(tick(&mut c));
        assert_eq!(c.state(), SessionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_resets_and_reports_final_duration() {
        let (mut c, _rx) = coordinator();
        c.start_session(SessionKind::Group);
        advance(Duration::from_secs(42)).await;

        assert_eq!(c.end_session(), Duration::from_secs(42));
        assert_eq!(c.state(), SessionState::Idle);
        assert_eq!(c.accrued(), Duration::ZERO);
        assert_eq!(c.session_progress(), 0.0);

        // Ending again is harmless
        assert_eq!(c.end_session(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_ticks_are_ignored() {
        let (mut c, _rx) = coordinator();
        c.start_session(SessionKind::Solo);
        let old_generation = c.timer.as_ref().unwrap().generation();

        c.start_session(SessionKind::Solo);
        advance(Duration::from_secs(10)).await;
        c.on_tick(SessionTick { generation: old_generation });
        assert_eq!(c.accrued(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_zero_target_progress() {
        let (mut c, _rx) = coordinator();
        c.set_target_duration(Duration::ZERO);
        assert_eq!(c.session_progress(), 0.0);
    }

    #[tokio::test]
    async fn test_participant_metrics() {
        let (mut c, mut rx) = coordinator();
        assert_eq!(c.average_coherence(), 0.0);

        c.add_participant(Participant::new("p1", "Ann").with_telemetry(50.0, 60.0, 80.0));
        c.add_participant(Participant::new("p2", "Ben").with_telemetry(45.0, 65.0, 60.0));
        assert_eq!(c.average_coherence(), 70.0);

        assert!(c.update_participant("p2", 45.0, 65.0, 90.0));
        assert_eq!(c.average_coherence(), 85.0);

        assert_eq!(c.remove_participant("p1"), 1);
        assert_eq!(c.snapshot().participant_count, 1);

        let counts: Vec<usize> = drain(&mut rx)
            .into_iter()
            .filter_map(|n| match n {
                HubNotification::ParticipantsChanged { count } => Some(count),
                _ => None,
            })
            .collect();
        assert_eq!(counts, vec![1, 2, 2, 1]);
    }
}
