//! Telegram Bot API transport using long polling.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use diagbot_core::traits::{ChatTransport, ErrorAction, InboundMessage, OutboundMessage};

use crate::error::{self, TransportError};

const DEFAULT_BASE_URL: &str = "https://api.telegram.org";
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;
/// Extra time on top of the long-poll timeout before the HTTP client gives up.
const REQUEST_GRACE_SECS: u64 = 10;

/// Telegram Bot API transport.
pub struct TelegramTransport {
    token: String,
    base_url: String,
    poll_timeout_secs: u64,
    client: reqwest::Client,
    /// Next update id to request; everything below it is acknowledged.
    offset: AtomicI64,
}

impl TelegramTransport {
    pub fn new(token: &str, base_url: Option<String>, poll_timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(poll_timeout_secs + REQUEST_GRACE_SECS))
            .build()
            .expect("failed to build HTTP client");

        Self {
            token: token.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            poll_timeout_secs,
            client,
            offset: AtomicI64::new(0),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    /// Fetch the bot's username, verifying the token on the way.
    #[instrument(skip(self))]
    pub async fn get_me(&self) -> anyhow::Result<String> {
        let response = self
            .client
            .get(self.method_url("getMe"))
            .send()
            .await
            .map_err(|e| self.request_error(e))?;
        let me: TelegramUser = parse_response(response).await?;
        Ok(me.username.unwrap_or_default())
    }

    fn request_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(self.poll_timeout_secs + REQUEST_GRACE_SECS)
        } else {
            TransportError::NetworkError(e.to_string())
        }
    }
}

#[derive(Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    #[serde(default = "Option::default")]
    result: Option<T>,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

#[derive(Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Deserialize)]
struct Message {
    chat: Chat,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Deserialize)]
struct TelegramUser {
    #[serde(default)]
    username: Option<String>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum ChatId<'a> {
    Numeric(i64),
    Username(&'a str),
}

impl<'a> ChatId<'a> {
    fn parse(id: &'a str) -> Self {
        id.parse().map(ChatId::Numeric).unwrap_or(ChatId::Username(id))
    }
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: ChatId<'a>,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<ReplyKeyboardRemove>,
}

#[derive(Serialize)]
struct ReplyKeyboardRemove {
    remove_keyboard: bool,
}

/// Decode a Bot API response, mapping failures to [`TransportError`].
async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> anyhow::Result<T> {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();

    let parsed: Option<TelegramResponse<T>> = serde_json::from_str(&body).ok();
    let (code, description, retry_after) = match &parsed {
        Some(r) => (
            r.error_code.unwrap_or(status),
            r.description.clone().unwrap_or_else(|| body.clone()),
            r.parameters.as_ref().and_then(|p| p.retry_after),
        ),
        None => (status, body.clone(), None),
    };

    if status == 429 || code == 429 {
        return Err(TransportError::RateLimited {
            retry_after_ms: retry_after.unwrap_or(5) * 1000,
        }
        .into());
    }
    if status == 401 || code == 401 {
        return Err(TransportError::Unauthorized(description).into());
    }

    match parsed {
        Some(TelegramResponse {
            ok: true,
            result: Some(result),
            ..
        }) if status < 400 => Ok(result),
        _ => Err(TransportError::ApiError {
            status: code,
            message: description,
        }
        .into()),
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    /// Verifies the token with `getMe` and returns the bot's username.
    async fn identity(&self) -> anyhow::Result<Option<String>> {
        let username = self.get_me().await?;
        Ok(Some(username).filter(|name| !name.is_empty()))
    }

    fn classify_error(&self, error: &anyhow::Error) -> ErrorAction {
        error::classify(error)
    }

    #[instrument(skip(self))]
    async fn receive(&self) -> anyhow::Result<Option<Vec<InboundMessage>>> {
        let offset = self.offset.load(Ordering::SeqCst);
        let url = format!(
            "{}?offset={}&timeout={}",
            self.method_url("getUpdates"),
            offset,
            self.poll_timeout_secs
        );
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let updates: Vec<Update> = parse_response(response).await?;

        if let Some(last) = updates.iter().map(|u| u.update_id).max() {
            self.offset.store(last + 1, Ordering::SeqCst);
        }

        let messages: Vec<InboundMessage> = updates
            .into_iter()
            .filter_map(|update| {
                let message = update.message?;
                let text = message.text?;
                Some(InboundMessage::new(message.chat.id, text))
            })
            .collect();

        if !messages.is_empty() {
            tracing::debug!("received {} message(s)", messages.len());
        }
        Ok(Some(messages))
    }

    #[instrument(skip(self, message), fields(chat = %message.conversation))]
    async fn send(&self, message: &OutboundMessage) -> anyhow::Result<()> {
        let body = SendMessageRequest {
            chat_id: ChatId::parse(message.conversation.as_str()),
            text: &message.text,
            reply_markup: message.remove_keyboard.then_some(ReplyKeyboardRemove {
                remove_keyboard: true,
            }),
        };

        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let _sent: serde_json::Value = parse_response(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(server: &MockServer) -> TelegramTransport {
        TelegramTransport::new("test-token", Some(server.uri()), 1)
    }

    #[tokio::test]
    async fn receive_text_messages_and_advance_offset() {
        let server = MockServer::start().await;

        let updates = serde_json::json!({
            "ok": true,
            "result": [
                {"update_id": 10, "message": {"message_id": 1, "chat": {"id": 111}, "text": "/start"}},
                {"update_id": 11, "message": {"message_id": 2, "chat": {"id": 222}, "sticker": {}}},
                {"update_id": 12, "message": {"message_id": 3, "chat": {"id": 111}, "text": "2"}}
            ]
        });

        Mock::given(method("GET"))
            .and(path("/bottest-token/getUpdates"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&updates))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/bottest-token/getUpdates"))
            .and(query_param("offset", "13"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true, "result": []})),
            )
            .mount(&server)
            .await;

        let telegram = transport(&server);
        let batch = telegram.receive().await.unwrap().unwrap();
        assert_eq!(
            batch,
            vec![
                InboundMessage::new(111_i64, "/start"),
                InboundMessage::new(111_i64, "2"),
            ]
        );

        let batch = telegram.receive().await.unwrap().unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn send_question_removes_keyboard() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/bottest-token/sendMessage"))
            .and(body_json(serde_json::json!({
                "chat_id": 111,
                "text": "Question 1 of 3",
                "reply_markup": {"remove_keyboard": true}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"ok": true, "result": {"message_id": 5}}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let telegram = transport(&server);
        telegram
            .send(&OutboundMessage {
                conversation: "111".into(),
                text: "Question 1 of 3".into(),
                remove_keyboard: true,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unauthorized_token() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/bottest-token/getUpdates"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "ok": false,
                "error_code": 401,
                "description": "Unauthorized"
            })))
            .mount(&server)
            .await;

        let err = transport(&server).receive().await.unwrap_err();
        let err = err.downcast::<TransportError>().unwrap();
        assert!(err.is_permanent());
        assert!(err.to_string().contains("Unauthorized"));
    }

    #[tokio::test]
    async fn rate_limiting() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/bottest-token/sendMessage"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "ok": false,
                "error_code": 429,
                "description": "Too Many Requests: retry after 7",
                "parameters": {"retry_after": 7}
            })))
            .mount(&server)
            .await;

        let err = transport(&server)
            .send(&OutboundMessage {
                conversation: "111".into(),
                text: "hi".into(),
                remove_keyboard: false,
            })
            .await
            .unwrap_err();
        let err = err.downcast::<TransportError>().unwrap();
        assert_eq!(err.retry_after_ms(), Some(7000));
    }

    #[tokio::test]
    async fn api_error_carries_description() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/bottest-token/sendMessage"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;

        let err = transport(&server)
            .send(&OutboundMessage {
                conversation: "@missing".into(),
                text: "hi".into(),
                remove_keyboard: false,
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("chat not found"));
    }

    #[tokio::test]
    async fn get_me_returns_username() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/bottest-token/getMe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": {"id": 1, "is_bot": true, "username": "DiagBot"}
            })))
            .mount(&server)
            .await;

        let telegram = transport(&server);
        assert_eq!(telegram.get_me().await.unwrap(), "DiagBot");
        assert_eq!(telegram.identity().await.unwrap().as_deref(), Some("DiagBot"));
    }

    #[tokio::test]
    async fn identity_rejects_bad_token() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/bottest-token/getMe"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "ok": false,
                "error_code": 401,
                "description": "Unauthorized"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let telegram = transport(&server);
        let err = telegram.identity().await.unwrap_err();
        assert_eq!(telegram.classify_error(&err), ErrorAction::Stop);
    }

    #[tokio::test]
    async fn rate_limited_poll_waits_for_hint() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/bottest-token/getUpdates"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "ok": false,
                "error_code": 429,
                "description": "Too Many Requests: retry after 3",
                "parameters": {"retry_after": 3}
            })))
            .mount(&server)
            .await;

        let telegram = transport(&server);
        let err = telegram.receive().await.unwrap_err();
        assert_eq!(
            telegram.classify_error(&err),
            ErrorAction::RetryAfter(Duration::from_secs(3))
        );
    }

    #[test]
    fn chat_id_serialization() {
        let numeric = serde_json::to_value(ChatId::parse("-100")).unwrap();
        assert_eq!(numeric, serde_json::json!(-100));
        let named = serde_json::to_value(ChatId::parse("@channel")).unwrap();
        assert_eq!(named, serde_json::json!("@channel"));
    }
}
