//! Appends steps to a session and proves they were never changed.
//!
//! Each recorded step is hashed (SHA-256 over its canonical JSON form) at
//! the moment it is appended. [`StepRecorder::verify`] re-hashes the
//! session's history and reports the first step whose contents differ.

use agentloop_core::action::canonical_json;
use agentloop_core::error::{Error, HistoryError};
use agentloop_core::event::{DomainEvent, EventBus};
use agentloop_core::session::{Session, Step};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

/// SHA-256 of the canonical JSON encoding of `step`, hex-encoded.
pub fn step_digest(step: &Step) -> Result<String, Error> {
    let value = serde_json::to_value(step)?;
    Ok(hex::encode(Sha256::digest(canonical_json(&value).as_bytes())))
}

/// The append-only writer for one session's step history.
#[derive(Default)]
pub struct StepRecorder {
    digests: Vec<String>,
    event_bus: Option<Arc<EventBus>>,
}

impl StepRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder for a session that may already hold steps.
    pub fn for_session(session: &Session) -> Result<Self, Error> {
        let digests = session
            .steps()
            .iter()
            .map(step_digest)
            .collect::<Result<_, _>>()?;
        Ok(Self {
            digests,
            event_bus: None,
        })
    }

    /// Publish a `StepRecorded` event for every appended step.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Append `step` to `session`. Returns the step's digest.
    ///
    /// Fails with `ImmutableHistoryViolation` if a step with this index is
    /// already recorded, or if the existing history no longer matches what
    /// this recorder appended.
    pub fn record(&mut self, session: &mut Session, step: Step) -> Result<String, Error> {
        if session.steps().len() != self.digests.len() {
            return Err(HistoryError::ImmutableHistoryViolation {
                index: step.index,
                detail: format!(
                    "session holds {} steps but {} were recorded",
                    session.steps().len(),
                    self.digests.len()
                ),
            }
            .into());
        }

        let digest = step_digest(&step)?;
        let index = step.index;
        let level = step.permission_level;
        let actions = step.actions.len();
        let timestamp = step.recorded_at;

        session.append_step(step)?;
        self.digests.push(digest.clone());
        debug!(
            session_id = %session.id(),
            step = index,
            digest = &digest[..12],
            "Recorded step"
        );

        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::StepRecorded {
                session_id: session.id().to_string(),
                step_index: index,
                permission_level: level,
                actions,
                digest: digest.clone(),
                timestamp,
            });
        }
        Ok(digest)
    }

    /// The session's steps in order. Borrowing again restarts the sequence.
    pub fn history(session: &Session) -> impl Iterator<Item = &Step> + Clone {
        session.steps().iter()
    }

    /// Digests of every recorded step, in order.
    pub fn digests(&self) -> &[String] {
        &self.digests
    }

    /// Re-hash `session`'s steps and compare them with the recorded digests.
    pub fn verify(&self, session: &Session) -> Result<(), Error> {
        for (index, (step, expected)) in session.steps().iter().zip(&self.digests).enumerate() {
            if &step_digest(step)? != expected {
                return Err(HistoryError::ImmutableHistoryViolation {
                    index,
                    detail: "step contents changed after recording".into(),
                }
                .into());
            }
        }
        if session.steps().len() != self.digests.len() {
            return Err(HistoryError::ImmutableHistoryViolation {
                index: self.digests.len().min(session.steps().len()),
                detail: "step count differs from recorded history".into(),
            }
            .into());
        }
        Ok(())
    }
}

impl std::fmt::Debug for StepRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRecorder")
            .field("recorded", &self.digests.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentloop_core::permission::PermissionLevel;
    use agentloop_core::session::Budget;
    use chrono::{DateTime, Utc};

    fn step(index: usize, narration: &str) -> Step {
        Step {
            index,
            permission_level: PermissionLevel::Chatty,
            model_response_text: narration.into(),
            narration: narration.into(),
            actions: vec![],
            parse_errors: vec![],
            terminated_session: false,
            recorded_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    fn session() -> Session {
        Session::new(PermissionLevel::Chatty, Budget::default())
    }

    #[test]
    fn record_appends_and_hashes() {
        let mut session = session();
        let mut recorder = StepRecorder::new();
        let d0 = recorder.record(&mut session, step(0, "a")).unwrap();
        let d1 = recorder.record(&mut session, step(1, "b")).unwrap();
        assert_ne!(d0, d1);
        assert_eq!(d0.len(), 64);
        assert_eq!(recorder.digests(), [d0, d1]);
        assert!(recorder.verify(&session).is_ok());
    }

    #[test]
    fn existing_index_rejected() {
        let mut session = session();
        let mut recorder = StepRecorder::new();
        recorder.record(&mut session, step(0, "a")).unwrap();
        let err = recorder.record(&mut session, step(0, "again")).unwrap_err();
        assert!(matches!(
            err,
            Error::History(HistoryError::ImmutableHistoryViolation { index: 0, .. })
        ));
        assert_eq!(session.steps().len(), 1);
        assert_eq!(recorder.digests().len(), 1);
    }

    #[test]
    fn digest_is_stable() {
        assert_eq!(
            step_digest(&step(3, "same")).unwrap(),
            step_digest(&step(3, "same")).unwrap()
        );
        assert_ne!(
            step_digest(&step(3, "same")).unwrap(),
            step_digest(&step(3, "different")).unwrap()
        );
    }

    #[test]
    fn verify_detects_mutation() {
        let mut session = session();
        let mut recorder = StepRecorder::new();
        recorder.record(&mut session, step(0, "original")).unwrap();
        recorder.record(&mut session, step(1, "next")).unwrap();

        // Session history can only be replaced wholesale through serde.
        let mut json = serde_json::to_value(&session).unwrap();
        json["steps"][0]["narration"] = "tampered".into();
        let tampered: Session = serde_json::from_value(json).unwrap();

        let err = recorder.verify(&tampered).unwrap_err();
        assert!(matches!(
            err,
            Error::History(HistoryError::ImmutableHistoryViolation { index: 0, .. })
        ));
    }

    #[test]
    fn history_is_restartable() {
        let mut session = session();
        let mut recorder = StepRecorder::new();
        for i in 0..3 {
            recorder.record(&mut session, step(i, "s")).unwrap();
        }
        let history = StepRecorder::history(&session);
        let first: Vec<_> = history.clone().map(|s| s.index).collect();
        let second: Vec<_> = history.map(|s| s.index).collect();
        assert_eq!(first, [0, 1, 2]);
        assert_eq!(first, second);
    }

    #[test]
    fn for_session_adopts_existing_history() {
        let mut session = session();
        StepRecorder::new().record(&mut session, step(0, "a")).unwrap();
        let mut recorder = StepRecorder::for_session(&session).unwrap();
        assert!(recorder.verify(&session).is_ok());
        recorder.record(&mut session, step(1, "b")).unwrap();
        assert_eq!(recorder.digests().len(), 2);
    }

    #[tokio::test]
    async fn publishes_step_recorded() {
        let bus = Arc::new(EventBus::new(8));
        let mut rx = bus.subscribe();
        let mut session = session();
        let mut recorder = StepRecorder::new().with_event_bus(bus);
        let digest = recorder.record(&mut session, step(0, "a")).unwrap();

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::StepRecorded {
                step_index,
                digest: d,
                ..
            } => {
                assert_eq!(*step_index, 0);
                assert_eq!(d, &digest);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
