//! Line oriented conversation transport.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Incoming message from a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    pub text: String,
}

/// Where questions come from and answers go to.
pub trait Channel: Send {
    /// Receive the next message. Returns `None` when the user ends the session.
    ///
    /// Blank input is delivered as a message with empty text.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying I/O fails.
    fn recv(&mut self)
    -> impl Future<Output = Result<Option<ChannelMessage>, ChannelError>> + Send;

    /// # Errors
    ///
    /// Returns an error if the underlying I/O fails.
    fn send(&mut self, text: &str) -> impl Future<Output = Result<(), ChannelError>> + Send;

    /// Transient progress note. No-op by default.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying I/O fails.
    fn send_status(
        &mut self,
        _text: &str,
    ) -> impl Future<Output = Result<(), ChannelError>> + Send {
        async { Ok(()) }
    }
}

/// True for the words that end an interactive session.
#[must_use]
pub fn is_exit_command(input: &str) -> bool {
    let input = input.trim();
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

/// Prompted line channel over any reader/writer pair.
#[derive(Debug)]
pub struct LineChannel<R, W> {
    reader: R,
    writer: W,
    prompt: String,
}

/// Terminal channel: stdin in, stdout out.
pub type CliChannel = LineChannel<BufReader<Stdin>, Stdout>;

impl CliChannel {
    #[must_use]
    pub fn stdio() -> Self {
        LineChannel::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> LineChannel<R, W> {
    #[must_use]
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            prompt: "Question: ".into(),
        }
    }

    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn into_writer(self) -> W {
        self.writer
    }
}

impl<R, W> Channel for LineChannel<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn recv(&mut self) -> Result<Option<ChannelMessage>, ChannelError> {
        self.writer.write_all(self.prompt.as_bytes()).await?;
        self.writer.flush().await?;

        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let text = line.trim();
        if is_exit_command(text) {
            return Ok(None);
        }
        Ok(Some(ChannelMessage {
            text: text.to_owned(),
        }))
    }

    async fn send(&mut self, text: &str) -> Result<(), ChannelError> {
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn send_status(&mut self, text: &str) -> Result<(), ChannelError> {
        self.send(text).await
    }
}
