//! diagbot-core: Diagnostic test catalog, session state machine and scoring.
//!
//! This crate defines the data model, the per-conversation session engine,
//! the text dispatcher and the transport trait that the rest of diagbot
//! builds on.

pub mod catalog;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod model;
pub mod registry;
pub mod scoring;
pub mod server;
pub mod session;
pub mod traits;

pub use catalog::Catalog;
pub use dispatcher::Dispatcher;
pub use engine::{DiagnosisEngine, Step};
pub use error::{AnswerError, CatalogError, EngineError, SessionError};
pub use model::{ConversationId, Diagnosis, DiagnosticQuestion, DiagnosticTest, QuestionView};
pub use session::DiagnosisSession;
