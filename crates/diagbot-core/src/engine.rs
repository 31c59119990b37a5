//! Diagnosis engine: the typed operations behind every chat command.
//!
//! Each operation on a conversation runs inside one
//! [`SessionRegistry::update`] call, so resolving an answer, recording it,
//! issuing the next question and dropping a finished session commit
//! together or not at all.

use std::sync::Arc;
use std::time::Duration;

use crate::catalog::Catalog;
use crate::error::EngineError;
use crate::model::{ConversationId, Diagnosis, QuestionView};
use crate::registry::SessionRegistry;
use crate::session::DiagnosisSession;

/// What the user should see after a successful operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// The next question to answer.
    Question(QuestionView),
    /// The test is finished and the session has been dropped.
    Completed(Diagnosis),
}

/// Runs diagnostic tests for many conversations at once.
pub struct DiagnosisEngine {
    catalog: Arc<Catalog>,
    registry: SessionRegistry,
}

impl DiagnosisEngine {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self::with_registry(catalog, SessionRegistry::new())
    }

    pub fn with_registry(catalog: Arc<Catalog>, registry: SessionRegistry) -> Self {
        Self { catalog, registry }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Start the test matching `query` and return its first question.
    ///
    /// An active session for the conversation is replaced.
    pub fn start_session(
        &self,
        conversation: &ConversationId,
        query: &str,
    ) -> Result<Step, EngineError> {
        let Some(test) = self.catalog.find(query).cloned() else {
            tracing::warn!(%conversation, "requested test '{}' not found", query);
            return Err(EngineError::TestNotFound(query.to_string()));
        };

        self.registry.update(conversation, |slot| {
            if let Some(previous) = slot.take() {
                tracing::info!(
                    %conversation,
                    session = %previous.id(),
                    "replacing unfinished '{}' session at question {}",
                    previous.test().id(),
                    previous.cursor()
                );
            }

            let session = DiagnosisSession::start(test);
            tracing::info!(
                %conversation,
                session = %session.id(),
                "starting test '{}'",
                session.test().id()
            );
            *slot = Some(session);
            advance(conversation, slot)
        })
    }

    /// Answer the current question with the user's raw text.
    ///
    /// Invalid or out-of-range input leaves the session untouched so the
    /// user can retry.
    pub fn submit_answer(
        &self,
        conversation: &ConversationId,
        raw: &str,
    ) -> Result<Step, EngineError> {
        self.registry.update(conversation, |slot| {
            let Some(session) = slot.as_mut() else {
                tracing::warn!(%conversation, "answer without an active session");
                return Err(EngineError::NoActiveSession(conversation.clone()));
            };
            let Some(question) = session.current_question() else {
                tracing::error!(%conversation, "session has no current question");
                return Err(EngineError::NoCurrentQuestion(conversation.clone()));
            };

            let answer = question.resolve(raw).inspect_err(|e| {
                tracing::warn!(%conversation, "rejected answer: {e}");
            })?;
            let parameter = question.parameter().to_string();
            let (label, value) = (answer.label.clone(), answer.value);

            session.record_answer(&parameter, value);
            tracing::debug!(%conversation, "recorded {parameter} = {value} ('{label}')");

            advance(conversation, slot)
        })
    }

    /// Drop the conversation's session.
    pub fn cancel_session(&self, conversation: &ConversationId) -> Result<(), EngineError> {
        match self.registry.remove(conversation) {
            Some(session) => {
                tracing::info!(
                    %conversation,
                    session = %session.id(),
                    "cancelled test '{}'",
                    session.test().id()
                );
                Ok(())
            }
            None => {
                tracing::warn!(%conversation, "cancel without an active session");
                Err(EngineError::NoActiveSession(conversation.clone()))
            }
        }
    }

    pub fn has_session(&self, conversation: &ConversationId) -> bool {
        self.registry.contains(conversation)
    }

    pub fn active_sessions(&self) -> usize {
        self.registry.len()
    }

    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        self.registry.evict_idle(max_idle)
    }
}

/// Issue the next question, or finish the session when none is left.
fn advance(
    conversation: &ConversationId,
    slot: &mut Option<DiagnosisSession>,
) -> Result<Step, EngineError> {
    let Some(session) = slot.as_mut() else {
        return Err(EngineError::NoActiveSession(conversation.clone()));
    };

    match session.next_view() {
        Some(view) => {
            tracing::debug!(
                %conversation,
                "issued question {} of {}",
                view.ordinal,
                view.total
            );
            Ok(Step::Question(view))
        }
        None => {
            let result = session.result();
            let session_id = session.id();
            *slot = None;
            let diagnosis = result?;
            tracing::info!(
                %conversation,
                session = %session_id,
                "test '{}' complete: score {} -> {}",
                diagnosis.test_id,
                diagnosis.total_score,
                diagnosis.diagnosis
            );
            Ok(Step::Completed(diagnosis))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnswerError;
    use crate::model::fixtures::glasgow;
    use crate::model::DiagnosticTest;
    use crate::scoring::{EvaluationRule, ScoreBand};

    fn engine() -> DiagnosisEngine {
        let empty = DiagnosticTest::new(
            "empty",
            "Empty check",
            vec![],
            EvaluationRule::new(vec![ScoreBand::new(0, 0, "nothing to assess")]),
        )
        .unwrap();
        let catalog = Catalog::new(vec![glasgow(), empty]).unwrap();
        DiagnosisEngine::new(Arc::new(catalog))
    }

    fn question(step: Step) -> QuestionView {
        match step {
            Step::Question(view) => view,
            Step::Completed(d) => panic!("expected a question, got {d:?}"),
        }
    }

    fn completed(step: Step) -> Diagnosis {
        match step {
            Step::Completed(d) => d,
            Step::Question(q) => panic!("expected a diagnosis, got {q:?}"),
        }
    }

    #[test]
    fn best_answers_give_mild() {
        let engine = engine();
        let id = ConversationId::from("alice");

        let first = question(engine.start_session(&id, "glasgow").unwrap());
        assert_eq!((first.ordinal, first.total), (1, 3));

        let second = question(engine.submit_answer(&id, "1").unwrap());
        assert_eq!(second.ordinal, 2);
        let third = question(engine.submit_answer(&id, "1").unwrap());
        assert_eq!(third.ordinal, 3);

        let diagnosis = completed(engine.submit_answer(&id, "1").unwrap());
        assert_eq!(diagnosis.total_score, 15);
        assert_eq!(diagnosis.diagnosis, "mild");
        assert!(!engine.has_session(&id));
    }

    #[test]
    fn worst_answers_give_severe() {
        let engine = engine();
        let id = ConversationId::from("bob");
        engine.start_session(&id, "glasgow").unwrap();
        engine.submit_answer(&id, "4").unwrap();
        engine.submit_answer(&id, "5").unwrap();
        let diagnosis = completed(engine.submit_answer(&id, "6").unwrap());
        assert_eq!(diagnosis.total_score, 3);
        assert_eq!(diagnosis.diagnosis, "severe");
    }

    #[test]
    fn bad_input_does_not_consume_the_question() {
        let engine = engine();
        let id = ConversationId::from("carol");
        engine.start_session(&id, "glasgow").unwrap();

        let err = engine.submit_answer(&id, "yes").unwrap_err();
        assert!(matches!(err, EngineError::Answer(AnswerError::InvalidInput(_))));
        let err = engine.submit_answer(&id, "9").unwrap_err();
        assert!(matches!(
            err,
            EngineError::Answer(AnswerError::OutOfRange { choice: 9, count: 4 })
        ));
        assert!(err.is_recoverable());

        let session = engine.registry().get(&id).unwrap();
        assert_eq!(session.cursor(), 1);
        assert!(session.answers().is_empty());

        let next = question(engine.submit_answer(&id, "2").unwrap());
        assert_eq!(next.ordinal, 2);
    }

    #[test]
    fn cancel_then_answer_has_no_session() {
        let engine = engine();
        let id = ConversationId::from("dave");
        engine.start_session(&id, "glasgow").unwrap();
        engine.submit_answer(&id, "1").unwrap();

        engine.cancel_session(&id).unwrap();
        assert!(matches!(
            engine.submit_answer(&id, "1"),
            Err(EngineError::NoActiveSession(_))
        ));
        assert!(matches!(
            engine.cancel_session(&id),
            Err(EngineError::NoActiveSession(_))
        ));
    }

    #[test]
    fn restarting_replaces_the_session() {
        let engine = engine();
        let id = ConversationId::from("erin");
        engine.start_session(&id, "glasgow").unwrap();
        engine.submit_answer(&id, "1").unwrap();
        engine.submit_answer(&id, "1").unwrap();

        let first = question(engine.start_session(&id, "coma").unwrap());
        assert_eq!(first.ordinal, 1);
        let session = engine.registry().get(&id).unwrap();
        assert_eq!(session.cursor(), 1);
        assert!(session.answers().is_empty());
        assert_eq!(engine.active_sessions(), 1);
    }

    #[test]
    fn unknown_test_creates_nothing() {
        let engine = engine();
        let id = ConversationId::from("frank");
        assert!(matches!(
            engine.start_session(&id, "apgar"),
            Err(EngineError::TestNotFound(ref q)) if q == "apgar"
        ));
        assert!(!engine.has_session(&id));
    }

    #[test]
    fn zero_question_test_completes_on_start() {
        let engine = engine();
        let id = ConversationId::from("gina");
        let diagnosis = completed(engine.start_session(&id, "empty").unwrap());
        assert_eq!(diagnosis.total_score, 0);
        assert_eq!(diagnosis.diagnosis, "nothing to assess");
        assert!(!engine.has_session(&id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_conversations_stay_isolated() {
        let engine = Arc::new(engine());
        let mut handles = Vec::new();

        for n in 0..64_i64 {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                let id = ConversationId::from(n);
                // Even conversations always pick the first answer, odd the last.
                let (eye, verbal, motor) = if n % 2 == 0 {
                    ("1", "1", "1")
                } else {
                    ("4", "5", "6")
                };
                engine.start_session(&id, "glasgow").unwrap();
                engine.submit_answer(&id, eye).unwrap();
                tokio::task::yield_now().await;
                engine.submit_answer(&id, verbal).unwrap();
                tokio::task::yield_now().await;
                match engine.submit_answer(&id, motor).unwrap() {
                    Step::Completed(d) => (n, d.total_score),
                    Step::Question(q) => panic!("unexpected question {q:?}"),
                }
            }));
        }

        for handle in handles {
            let (n, total) = handle.await.unwrap();
            let expected = if n % 2 == 0 { 15 } else { 3 };
            assert_eq!(total, expected, "conversation {n}");
        }
        assert_eq!(engine.active_sessions(), 0);
    }
}
