//! Per-conversation progress through one diagnostic test.
//!
//! A session hands out questions one at a time. Fetching the next question
//! also makes it the current one, so the answer typed afterwards is always
//! resolved against the prompt the user actually saw.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::SessionError;
use crate::model::{Diagnosis, DiagnosticQuestion, DiagnosticTest, QuestionView};

/// Where a session stands. A conversation without a session is not started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// `cursor` questions have been issued so far.
    InProgress { cursor: usize },
    /// Every question has been issued.
    Complete,
}

/// Mutable progress through one [`DiagnosticTest`].
#[derive(Debug, Clone)]
pub struct DiagnosisSession {
    id: Uuid,
    test: Arc<DiagnosticTest>,
    cursor: usize,
    answers: HashMap<String, i64>,
    started_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

impl DiagnosisSession {
    /// Start a fresh session at the first question.
    pub fn start(test: Arc<DiagnosticTest>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            test,
            cursor: 0,
            answers: HashMap::new(),
            started_at: now,
            last_activity: now,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn test(&self) -> &Arc<DiagnosticTest> {
        &self.test
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    /// Number of questions issued so far.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn total_questions(&self) -> usize {
        self.test.question_count()
    }

    pub fn answers(&self) -> &HashMap<String, i64> {
        &self.answers
    }

    pub fn state(&self) -> SessionState {
        if self.is_complete() {
            SessionState::Complete
        } else {
            SessionState::InProgress {
                cursor: self.cursor,
            }
        }
    }

    /// Issue the question at the cursor and advance past it.
    ///
    /// Returns `None` once every question has been issued.
    pub fn next_question(&mut self) -> Option<&DiagnosticQuestion> {
        let question = self.test.questions().get(self.cursor)?;
        self.cursor += 1;
        self.last_activity = Utc::now();
        Some(question)
    }

    /// Like [`next_question`](Self::next_question), rendered for display.
    pub fn next_view(&mut self) -> Option<QuestionView> {
        self.next_question()?;
        let question = self.current_question()?;
        Some(QuestionView::new(self.cursor, self.total_questions(), question))
    }

    /// The question most recently issued, if any.
    pub fn current_question(&self) -> Option<&DiagnosticQuestion> {
        let index = self.cursor.checked_sub(1)?;
        self.test.questions().get(index)
    }

    /// Store the value for a parameter, replacing any earlier value.
    pub fn record_answer(&mut self, parameter: &str, value: i64) {
        self.answers.insert(parameter.to_string(), value);
        self.last_activity = Utc::now();
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.test.question_count()
    }

    /// Sum of the recorded values, one per distinct parameter.
    ///
    /// Saturates at the `i64` bounds. Totals of a finished session always
    /// fit, since the test's score domain was checked at load.
    pub fn total_score(&self) -> i64 {
        let total: i128 = self.answers.values().map(|v| i128::from(*v)).sum();
        i64::try_from(total).unwrap_or(if total < 0 { i64::MIN } else { i64::MAX })
    }

    /// Evaluate the total score once every question has been issued.
    pub fn result(&self) -> Result<Diagnosis, SessionError> {
        if !self.is_complete() {
            return Err(SessionError::Incomplete {
                issued: self.cursor,
                total: self.total_questions(),
            });
        }

        let total = self.total_score();
        let diagnosis = self
            .test
            .evaluate(total)
            .ok_or(SessionError::Unscored { total })?;

        Ok(Diagnosis {
            test_id: self.test.id().to_string(),
            test_name: self.test.name().to_string(),
            total_score: total,
            diagnosis: diagnosis.to_string(),
        })
    }
}
