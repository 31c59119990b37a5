//! Error types for the diagnosis core.
//!
//! Catalog errors are fatal at startup. Answer, session and engine errors are
//! recovered per request and turned into a re-prompt by the dispatcher.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::ConversationId;

/// A catalog that cannot be loaded or fails validation.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog file could not be read.
    #[error("failed to read catalog {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write catalog {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The catalog file is not valid JSON/TOML or has the wrong shape.
    #[error("failed to parse catalog: {0}")]
    Parse(String),

    /// The catalog could not be written back out.
    #[error("failed to serialize catalog: {0}")]
    Serialize(String),

    /// The file extension does not name a supported format.
    #[error("unsupported catalog format: {0} (expected .json or .toml)")]
    UnsupportedFormat(String),

    /// The catalog defines no tests.
    #[error("catalog contains no tests")]
    Empty,

    #[error("test '{name}' has an empty id")]
    EmptyTestId { name: String },

    #[error("duplicate test id: {0}")]
    DuplicateTestId(String),

    /// The id collides with a built-in chat command.
    #[error("test id '{0}' is reserved for a bot command")]
    ReservedTestId(String),

    /// The lowest or highest achievable total does not fit in an `i64`.
    #[error("test '{test}': total score overflows")]
    ScoreOverflow { test: String },

    #[error("test '{test}', question {question}: no answers defined")]
    NoAnswers { test: String, question: usize },

    #[error("test '{test}', question {question}: duplicate answer label '{label}'")]
    DuplicateLabel {
        test: String,
        question: usize,
        label: String,
    },

    #[error("test '{test}', question {question}: answer '{label}' has no value")]
    MissingValue {
        test: String,
        question: usize,
        label: String,
    },

    #[error("test '{test}', question {question}: value given for unknown answer '{label}'")]
    UnknownLabel {
        test: String,
        question: usize,
        label: String,
    },

    #[error("test '{test}': band {min}..={max} has min greater than max")]
    InvertedBand { test: String, min: i64, max: i64 },

    #[error("test '{test}': bands {first} and {second} overlap")]
    OverlappingBands {
        test: String,
        first: String,
        second: String,
    },

    /// An achievable total score falls outside every band.
    #[error("test '{test}': score {score} is not covered by any band (achievable {min}..={max})")]
    UncoveredScore {
        test: String,
        score: i64,
        min: i64,
        max: i64,
    },
}

/// A question definition whose labels and values do not line up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuestionDefect {
    #[error("no answers defined")]
    NoAnswers,

    #[error("duplicate answer label '{0}'")]
    DuplicateLabel(String),

    #[error("answer '{0}' has no value")]
    MissingValue(String),

    #[error("value given for unknown answer '{0}'")]
    UnknownLabel(String),
}

impl CatalogError {
    /// Attach test and question context to a question defect.
    pub fn question(test: &str, question: usize, defect: QuestionDefect) -> Self {
        let test = test.to_string();
        match defect {
            QuestionDefect::NoAnswers => CatalogError::NoAnswers { test, question },
            QuestionDefect::DuplicateLabel(label) => CatalogError::DuplicateLabel {
                test,
                question,
                label,
            },
            QuestionDefect::MissingValue(label) => CatalogError::MissingValue {
                test,
                question,
                label,
            },
            QuestionDefect::UnknownLabel(label) => CatalogError::UnknownLabel {
                test,
                question,
                label,
            },
        }
    }
}

/// A raw answer that cannot be resolved against the displayed question.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnswerError {
    /// The input is not an integer.
    #[error("not an answer number: '{0}'")]
    InvalidInput(String),

    /// The number does not select one of the displayed answers.
    #[error("answer {choice} is out of range (1..={count})")]
    OutOfRange { choice: i64, count: usize },
}

/// Misuse of a session that is not ready to produce a result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("test is not complete ({issued} of {total} questions issued)")]
    Incomplete { issued: usize, total: usize },

    /// No band matched the total. Unreachable with a validated catalog.
    #[error("no diagnosis defined for score {total}")]
    Unscored { total: i64 },
}

/// Errors surfaced by the engine to the dispatcher.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("test not found: {0}")]
    TestNotFound(String),

    #[error("no active session for conversation {0}")]
    NoActiveSession(ConversationId),

    /// The session exists but no question has been issued yet.
    #[error("no current question for conversation {0}")]
    NoCurrentQuestion(ConversationId),

    #[error(transparent)]
    Answer(#[from] AnswerError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl EngineError {
    /// Returns `true` if the user can simply retry; the session is unchanged.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::Answer(_) | EngineError::NoActiveSession(_) | EngineError::TestNotFound(_)
        )
    }
}
