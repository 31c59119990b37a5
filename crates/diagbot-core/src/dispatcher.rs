//! Routes chat text to engine operations and renders the replies.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::engine::{DiagnosisEngine, Step};
use crate::error::{AnswerError, EngineError};
use crate::model::{ConversationId, Diagnosis, QuestionView};
use crate::traits::{InboundMessage, OutboundMessage};

/// Built-in command names; a test id may not reuse one.
pub const RESERVED_COMMANDS: &[&str] = &["start", "help", "tests", "cancel"];

/// A parsed line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Tests,
    Cancel,
    /// `/<query>`: start the test matching `query`.
    Test(String),
    /// Anything that is not a command.
    Answer(String),
}

impl Command {
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let Some(rest) = text.strip_prefix('/') else {
            return Command::Answer(text.to_string());
        };

        // Group chats address commands as `/cmd@BotName`.
        let name = rest
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .split('@')
            .next()
            .unwrap_or_default();

        match name.to_lowercase().as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "tests" => Command::Tests,
            "cancel" => Command::Cancel,
            _ => Command::Test(name.to_string()),
        }
    }

    /// Like [`Command::parse`], but `None` for a `/cmd@OtherBot` command
    /// when this bot's username is known.
    pub fn parse_for(text: &str, bot_username: Option<&str>) -> Option<Self> {
        if let (Some(bot), Some(target)) = (bot_username, addressee(text)) {
            if !target.eq_ignore_ascii_case(bot.trim_start_matches('@')) {
                return None;
            }
        }
        Some(Self::parse(text))
    }
}

/// The `BotName` of a `/cmd@BotName` command.
fn addressee(text: &str) -> Option<&str> {
    let (_, target) = text
        .trim()
        .strip_prefix('/')?
        .split_whitespace()
        .next()?
        .split_once('@')?;
    Some(target)
}

/// Turns inbound chat text into outbound replies.
pub struct Dispatcher {
    engine: Arc<DiagnosisEngine>,
    bot_username: Option<String>,
}

impl Dispatcher {
    pub fn new(engine: Arc<DiagnosisEngine>) -> Self {
        Self {
            engine,
            bot_username: None,
        }
    }

    /// Only answer `/cmd@name` commands addressed to `username`.
    pub fn with_bot_username(mut self, username: impl Into<String>) -> Self {
        self.bot_username = Some(username.into());
        self
    }

    pub fn engine(&self) -> &Arc<DiagnosisEngine> {
        &self.engine
    }

    pub fn bot_username(&self) -> Option<&str> {
        self.bot_username.as_deref()
    }

    /// Handle one inbound message and produce the reply.
    ///
    /// Returns `None` for commands addressed to a different bot.
    pub fn handle(&self, message: &InboundMessage) -> Option<OutboundMessage> {
        let conversation = &message.conversation;
        tracing::debug!(%conversation, "handling message: {}", message.text);

        let Some(command) = Command::parse_for(&message.text, self.bot_username()) else {
            tracing::debug!(%conversation, "ignoring command for another bot");
            return None;
        };

        let (text, remove_keyboard) = match command {
            Command::Start => (self.welcome_text(), false),
            Command::Help => (self.help_text(), false),
            Command::Tests => (self.tests_text(), false),
            Command::Cancel => (self.cancel(conversation), false),
            Command::Test(query) => {
                self.step_reply(self.engine.start_session(conversation, &query))
            }
            Command::Answer(raw) => self.step_reply(self.engine.submit_answer(conversation, &raw)),
        };

        Some(OutboundMessage {
            conversation: conversation.clone(),
            text,
            remove_keyboard,
        })
    }

    fn step_reply(&self, result: Result<Step, EngineError>) -> (String, bool) {
        match result {
            Ok(Step::Question(view)) => (render_question(&view), true),
            Ok(Step::Completed(diagnosis)) => (render_diagnosis(&diagnosis), false),
            Err(e) => (self.error_text(&e), false),
        }
    }

    fn cancel(&self, conversation: &ConversationId) -> String {
        match self.engine.cancel_session(conversation) {
            Ok(()) => format!(
                "The current test has been cancelled. You can start a new one with {}",
                self.start_hint()
            ),
            Err(_) => "There is no active test to cancel".to_string(),
        }
    }

    fn error_text(&self, error: &EngineError) -> String {
        match error {
            EngineError::NoActiveSession(_) => format!(
                "You have no active test. Start one with {}",
                self.start_hint()
            ),
            EngineError::TestNotFound(query) => format!(
                "Test '{query}' is currently unavailable. Send /tests to see the available tests."
            ),
            EngineError::Answer(AnswerError::InvalidInput(_)) => {
                "Please enter the number of your answer (1, 2, 3 and so on)".to_string()
            }
            EngineError::Answer(AnswerError::OutOfRange { count, .. }) => {
                format!("Please enter one of the offered answer numbers (1-{count})")
            }
            EngineError::NoCurrentQuestion(_) | EngineError::Session(_) => {
                tracing::error!("failed to process answer: {error}");
                "Something went wrong while processing your answer".to_string()
            }
        }
    }

    fn start_hint(&self) -> String {
        match self.engine.catalog().tests().first() {
            Some(test) => format!("/{}", test.id()),
            None => "/tests".to_string(),
        }
    }

    fn test_lines(&self) -> String {
        let mut lines = String::new();
        for test in self.engine.catalog().tests() {
            let _ = writeln!(lines, "/{} - {}", test.id(), test.name());
        }
        lines
    }

    pub fn welcome_text(&self) -> String {
        format!(
            "Welcome to the medical diagnosis bot!\n\n\
             Commands:\n\
             {}\
             /help - Show help\n\
             /cancel - Cancel the current test",
            self.test_lines()
        )
    }

    pub fn help_text(&self) -> String {
        format!(
            "This bot walks you through medical diagnostic tests.\n\n\
             Available commands:\n\
             {}\
             /tests - List the available tests\n\
             /help - Show this help\n\
             /cancel - Cancel the current test\n\n\
             While a test is running, just reply with the number of your answer.",
            self.test_lines()
        )
    }

    pub fn tests_text(&self) -> String {
        format!("Available tests:\n{}", self.test_lines())
    }
}

/// `Question n of total:` followed by the prompt and numbered answers.
pub fn render_question(view: &QuestionView) -> String {
    let mut text = format!(
        "Question {} of {}:\n{}\n\n",
        view.ordinal, view.total, view.prompt
    );
    for (index, answer) in view.answers.iter().enumerate() {
        let _ = writeln!(text, "{}. {}", index + 1, answer);
    }
    text
}

pub fn render_diagnosis(diagnosis: &Diagnosis) -> String {
    format!(
        "Diagnosis complete.\n\n\
         Result: {} (score {})\n\n\
         To take another test send /{}",
        diagnosis.diagnosis, diagnosis.total_score, diagnosis.test_id
    )
}
