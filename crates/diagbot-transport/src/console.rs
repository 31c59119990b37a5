//! Line-oriented console transport.
//!
//! Every input line is one message from a single conversation. Replies are
//! written back followed by a blank line.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use diagbot_core::model::ConversationId;
use diagbot_core::traits::{ChatTransport, InboundMessage, OutboundMessage};

/// Chat over any async line reader and writer.
pub struct ConsoleTransport<R, W> {
    conversation: ConversationId,
    reader: Mutex<R>,
    writer: Mutex<W>,
}

impl ConsoleTransport<BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    /// Chat on the process's stdin and stdout.
    pub fn stdio(conversation: impl Into<ConversationId>) -> Self {
        Self::new(
            conversation,
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
        )
    }
}

impl<R, W> ConsoleTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(conversation: impl Into<ConversationId>, reader: R, writer: W) -> Self {
        Self {
            conversation: conversation.into(),
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }

    pub fn conversation(&self) -> &ConversationId {
        &self.conversation
    }

    /// Consume the transport and return the writer.
    pub fn into_writer(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<R, W> ChatTransport for ConsoleTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn name(&self) -> &str {
        "console"
    }

    async fn receive(&self) -> anyhow::Result<Option<Vec<InboundMessage>>> {
        let mut line = String::new();
        let read = self.reader.lock().await.read_line(&mut line).await?;
        if read == 0 {
            return Ok(None);
        }

        let text = line.trim();
        if text.is_empty() {
            return Ok(Some(Vec::new()));
        }
        Ok(Some(vec![InboundMessage::new(self.conversation.clone(), text)]))
    }

    async fn send(&self, message: &OutboundMessage) -> anyhow::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(message.text.trim_end().as_bytes()).await?;
        writer.write_all(b"\n\n").await?;
        writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn console(input: &'static str) -> ConsoleTransport<&'static [u8], Vec<u8>> {
        ConsoleTransport::new("console", input.as_bytes(), Vec::new())
    }

    #[tokio::test]
    async fn reads_lines_until_eof() {
        let transport = console("/glasgow\n\n 2 \n");

        let batch = transport.receive().await.unwrap().unwrap();
        assert_eq!(batch, vec![InboundMessage::new("console", "/glasgow")]);

        assert!(transport.receive().await.unwrap().unwrap().is_empty());

        let batch = transport.receive().await.unwrap().unwrap();
        assert_eq!(batch[0].text, "2");

        assert!(transport.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn last_line_without_newline() {
        let transport = console("/cancel");
        let batch = transport.receive().await.unwrap().unwrap();
        assert_eq!(batch[0].text, "/cancel");
        assert!(transport.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn writes_replies_separated_by_blank_line() {
        let transport = console("");
        for text in ["Question 1 of 3:\nEye opening\n\n1. Spontaneous\n", "done"] {
            transport
                .send(&OutboundMessage {
                    conversation: "console".into(),
                    text: text.into(),
                    remove_keyboard: false,
                })
                .await
                .unwrap();
        }

        let written = String::from_utf8(transport.into_writer()).unwrap();
        assert_eq!(
            written,
            "Question 1 of 3:\nEye opening\n\n1. Spontaneous\n\ndone\n\n"
        );
    }
}
