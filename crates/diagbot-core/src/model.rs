//! Core data model types for diagbot.
//!
//! Questions and tests are immutable once constructed; the constructors
//! enforce the invariants that the rest of the engine relies on.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::{AnswerError, CatalogError, QuestionDefect};
use crate::scoring::{EvaluationRule, ScoreBand};

/// Identifies one chat conversation on a transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ConversationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<i64> for ConversationId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

/// A selectable answer and the score it contributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOption {
    pub label: String,
    pub value: i64,
}

/// A single multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticQuestion {
    prompt: String,
    parameter: String,
    answers: Vec<AnswerOption>,
}

impl DiagnosticQuestion {
    /// Build a question from its display-ordered labels and label→value map.
    ///
    /// Every label must carry exactly one value and every value must belong
    /// to a displayed label.
    pub fn new(
        prompt: impl Into<String>,
        parameter: impl Into<String>,
        labels: Vec<String>,
        values: &HashMap<String, i64>,
    ) -> Result<Self, QuestionDefect> {
        if labels.is_empty() {
            return Err(QuestionDefect::NoAnswers);
        }

        let mut seen = HashSet::new();
        let mut answers = Vec::with_capacity(labels.len());
        for label in labels {
            if !seen.insert(label.clone()) {
                return Err(QuestionDefect::DuplicateLabel(label));
            }
            let Some(&value) = values.get(&label) else {
                return Err(QuestionDefect::MissingValue(label));
            };
            answers.push(AnswerOption { label, value });
        }

        // Report extras in a stable order.
        let mut unknown: Vec<&String> = values.keys().filter(|k| !seen.contains(*k)).collect();
        unknown.sort();
        if let Some(label) = unknown.first() {
            return Err(QuestionDefect::UnknownLabel((*label).clone()));
        }

        Ok(Self {
            prompt: prompt.into(),
            parameter: parameter.into(),
            answers,
        })
    }

    /// Convenience constructor from `(label, value)` pairs.
    pub fn from_pairs(
        prompt: impl Into<String>,
        parameter: impl Into<String>,
        pairs: &[(&str, i64)],
    ) -> Result<Self, QuestionDefect> {
        let labels = pairs.iter().map(|(l, _)| l.to_string()).collect();
        let values = pairs.iter().map(|(l, v)| (l.to_string(), *v)).collect();
        Self::new(prompt, parameter, labels, &values)
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// The scored parameter this question contributes to.
    pub fn parameter(&self) -> &str {
        &self.parameter
    }

    pub fn answers(&self) -> &[AnswerOption] {
        &self.answers
    }

    /// Answer labels in display order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.answers.iter().map(|a| a.label.as_str())
    }

    pub fn value_for(&self, label: &str) -> Option<i64> {
        self.answers
            .iter()
            .find(|a| a.label == label)
            .map(|a| a.value)
    }

    pub fn min_value(&self) -> i64 {
        self.answers.iter().map(|a| a.value).min().unwrap_or(0)
    }

    pub fn max_value(&self) -> i64 {
        self.answers.iter().map(|a| a.value).max().unwrap_or(0)
    }

    /// Resolve a raw, 1-based answer number typed by the user.
    pub fn resolve(&self, raw: &str) -> Result<&AnswerOption, AnswerError> {
        let trimmed = raw.trim();
        let choice: i64 = trimmed
            .parse()
            .map_err(|_| AnswerError::InvalidInput(trimmed.to_string()))?;

        choice
            .checked_sub(1)
            .and_then(|index| usize::try_from(index).ok())
            .and_then(|index| self.answers.get(index))
            .ok_or(AnswerError::OutOfRange {
                choice,
                count: self.answers.len(),
            })
    }
}

/// A named sequence of questions with its evaluation rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticTest {
    id: String,
    name: String,
    questions: Vec<DiagnosticQuestion>,
    evaluation: EvaluationRule,
    domain: RangeInclusive<i64>,
}

impl DiagnosticTest {
    /// Build a test, checking that the bands cover every achievable total.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        questions: Vec<DiagnosticQuestion>,
        evaluation: EvaluationRule,
    ) -> Result<Self, CatalogError> {
        let (id, name) = (id.into(), name.into());
        if id.trim().is_empty() {
            return Err(CatalogError::EmptyTestId { name });
        }

        let domain = checked_domain(&questions)
            .ok_or_else(|| CatalogError::ScoreOverflow { test: id.clone() })?;
        evaluation.validate(&id, domain.clone())?;

        Ok(Self {
            id,
            name,
            questions,
            evaluation,
            domain,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn questions(&self) -> &[DiagnosticQuestion] {
        &self.questions
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn evaluation(&self) -> &EvaluationRule {
        &self.evaluation
    }

    /// The range of totals a completed session can produce.
    ///
    /// Answers are keyed by parameter, so only the last question carrying a
    /// given parameter counts toward the total.
    pub fn score_domain(&self) -> RangeInclusive<i64> {
        self.domain.clone()
    }

    /// Parameters that more than one question writes to, in question order.
    pub fn shared_parameters(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut shared = Vec::new();
        for question in &self.questions {
            if !seen.insert(question.parameter()) && !shared.contains(&question.parameter()) {
                shared.push(question.parameter());
            }
        }
        shared
    }

    /// Bands that no completed session can ever land in.
    pub fn unreachable_bands(&self) -> Vec<&ScoreBand> {
        let domain = self.score_domain();
        self.evaluation
            .bands()
            .iter()
            .filter(|band| band.max < *domain.start() || band.min > *domain.end())
            .collect()
    }

    pub fn evaluate(&self, total: i64) -> Option<&str> {
        self.evaluation
            .evaluate(total)
            .map(|band| band.diagnosis.as_str())
    }
}

/// Lowest and highest achievable totals, or `None` if either leaves `i64`.
fn checked_domain(questions: &[DiagnosticQuestion]) -> Option<RangeInclusive<i64>> {
    let mut last: HashMap<&str, &DiagnosticQuestion> = HashMap::new();
    for question in questions {
        last.insert(question.parameter(), question);
    }
    let low: i128 = last.values().map(|q| i128::from(q.min_value())).sum();
    let high: i128 = last.values().map(|q| i128::from(q.max_value())).sum();
    Some(i64::try_from(low).ok()?..=i64::try_from(high).ok()?)
}

/// The outcome of a completed session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub test_id: String,
    pub test_name: String,
    pub total_score: i64,
    pub diagnosis: String,
}

/// What the user should see for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionView {
    /// 1-based position of the question.
    pub ordinal: usize,
    pub total: usize,
    pub prompt: String,
    pub answers: Vec<String>,
}

impl QuestionView {
    pub fn new(ordinal: usize, total: usize, question: &DiagnosticQuestion) -> Self {
        Self {
            ordinal,
            total,
            prompt: question.prompt().to_string(),
            answers: question.labels().map(str::to_string).collect(),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn question_keeps_label_order() {
        let q = motor();
        let labels: Vec<&str> = q.labels().collect();
        assert_eq!(labels[0], "Obeys commands");
        assert_eq!(labels[5], "None");
        assert_eq!(q.value_for("Localising"), Some(5));
        assert_eq!(q.min_value(), 1);
        assert_eq!(q.max_value(), 6);
    }

    #[test]
    fn question_requires_values_for_every_label() {
        let values = HashMap::from([("Yes".to_string(), 1)]);
        let err = DiagnosticQuestion::new("q", "p", vec!["Yes".into(), "No".into()], &values)
            .unwrap_err();
        assert_eq!(err, QuestionDefect::MissingValue("No".into()));
    }

    #[test]
    fn question_rejects_orphan_values() {
        let values = HashMap::from([("Yes".to_string(), 1), ("Maybe".to_string(), 2)]);
        let err = DiagnosticQuestion::new("q", "p", vec!["Yes".into()], &values).unwrap_err();
        assert_eq!(err, QuestionDefect::UnknownLabel("Maybe".into()));
    }

    #[test]
    fn question_rejects_duplicate_labels_and_empty_sets() {
        let err = DiagnosticQuestion::from_pairs("q", "p", &[("Yes", 1), ("Yes", 2)]).unwrap_err();
        assert_eq!(err, QuestionDefect::DuplicateLabel("Yes".into()));

        let err = DiagnosticQuestion::from_pairs("q", "p", &[]).unwrap_err();
        assert_eq!(err, QuestionDefect::NoAnswers);
    }

    #[test]
    fn resolve_answer_numbers() {
        let q = eye();
        assert_eq!(q.resolve("1").unwrap().value, 4);
        assert_eq!(q.resolve(" 4 ").unwrap().label, "None");
        assert_eq!(
            q.resolve("0").unwrap_err(),
            AnswerError::OutOfRange {
                choice: 0,
                count: 4
            }
        );
        assert_eq!(
            q.resolve("5").unwrap_err(),
            AnswerError::OutOfRange {
                choice: 5,
                count: 4
            }
        );
        assert!(matches!(
            q.resolve("-3").unwrap_err(),
            AnswerError::OutOfRange { .. }
        ));
        assert_eq!(
            q.resolve("two").unwrap_err(),
            AnswerError::InvalidInput("two".into())
        );
    }

    #[test]
    fn glasgow_domain() {
        let test = glasgow();
        assert_eq!(test.score_domain(), 3..=15);
        assert_eq!(test.evaluate(15), Some("mild"));
        assert!(test.shared_parameters().is_empty());
        assert!(test.unreachable_bands().is_empty());
    }

    #[test]
    fn shared_parameter_domain_uses_last_question() {
        let first = DiagnosticQuestion::from_pairs("a", "axis", &[("x", 10), ("y", 20)]).unwrap();
        let second = DiagnosticQuestion::from_pairs("b", "axis", &[("x", 1), ("y", 2)]).unwrap();
        let test = DiagnosticTest::new(
            "dup",
            "Dup",
            vec![first, second],
            EvaluationRule::new(vec![ScoreBand::new(1, 2, "only")]),
        )
        .unwrap();
        assert_eq!(test.score_domain(), 1..=2);
        assert_eq!(test.shared_parameters(), vec!["axis"]);
    }

    #[test]
    fn zero_question_test_must_cover_zero() {
        let ok = DiagnosticTest::new(
            "empty",
            "Empty",
            vec![],
            EvaluationRule::new(vec![ScoreBand::new(0, 0, "nothing to assess")]),
        );
        assert!(ok.is_ok());

        let err = DiagnosticTest::new(
            "empty",
            "Empty",
            vec![],
            EvaluationRule::new(vec![ScoreBand::new(1, 5, "never")]),
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::UncoveredScore { score: 0, .. }));
    }

    #[test]
    fn totals_beyond_i64_are_rejected() {
        let big = |name: &str, parameter: &str| {
            DiagnosticQuestion::from_pairs(name, parameter, &[("huge", i64::MAX)]).unwrap()
        };
        let err = DiagnosticTest::new(
            "big",
            "Big",
            vec![big("a", "first"), big("b", "second")],
            EvaluationRule::new(vec![ScoreBand::new(0, i64::MAX, "any")]),
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::ScoreOverflow { ref test } if test == "big"));

        let lowest = DiagnosticQuestion::from_pairs("c", "third", &[("tiny", i64::MIN)]).unwrap();
        let minus_one = DiagnosticQuestion::from_pairs("d", "fourth", &[("tiny", -1)]).unwrap();
        let err = DiagnosticTest::new(
            "small",
            "Small",
            vec![lowest, minus_one],
            EvaluationRule::new(vec![ScoreBand::new(i64::MIN, 0, "any")]),
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::ScoreOverflow { .. }));
    }

    #[test]
    fn single_answer_at_i64_max_is_fine() {
        let question = DiagnosticQuestion::from_pairs("a", "only", &[("huge", i64::MAX)]).unwrap();
        let test = DiagnosticTest::new(
            "edge",
            "Edge",
            vec![question],
            EvaluationRule::new(vec![ScoreBand::new(i64::MAX, i64::MAX, "top")]),
        )
        .unwrap();
        assert_eq!(test.score_domain(), i64::MAX..=i64::MAX);
        assert_eq!(test.evaluate(i64::MAX), Some("top"));
    }

    #[test]
    fn blank_id_is_rejected() {
        let err = DiagnosticTest::new(" ", "Nameless", vec![eye()], glasgow_rule()).unwrap_err();
        assert!(matches!(err, CatalogError::EmptyTestId { .. }));
    }

    #[test]
    fn unreachable_bands_are_reported() {
        let test = DiagnosticTest::new(
            "eye",
            "Eye only",
            vec![eye()],
            EvaluationRule::new(vec![
                ScoreBand::new(1, 4, "any"),
                ScoreBand::new(10, 20, "impossible"),
            ]),
        )
        .unwrap();
        let unreachable = test.unreachable_bands();
        assert_eq!(unreachable.len(), 1);
        assert_eq!(unreachable[0].diagnosis, "impossible");
    }

    #[test]
    fn conversation_id_from_numeric_chat() {
        let id = ConversationId::from(-100123_i64);
        assert_eq!(id.as_str(), "-100123");
        assert_eq!(id.to_string(), "-100123");
    }
}
