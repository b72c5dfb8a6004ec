//! Line-oriented request/response protocol with an interactive sbt shell.
//!
//! Every command is followed by a sentinel evaluation whose echo marks the
//! end of that command's output, so exactly one command is in flight at a
//! time.

use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, warn};

/// Command appended after every request.
pub const SENTINEL_COMMAND: &str = "eval \"EOF\"";
/// The sentinel's literal echo.
pub const SENTINEL_ECHO: &str = "[info] ans: String = EOF";

const ERROR_PREFIX: &str = "[error] ";
const WARN_PREFIX: &str = "[warn] ";
const INFO_PREFIX: &str = "[info] ";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("I/O error talking to sbt: {0}")]
    Io(#[from] std::io::Error),

    #[error("sbt command {command:?} did not finish within {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("sbt closed its output while running {command:?}")]
    Closed { command: String },
}

/// How a single output line is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line<'a> {
    Error(&'a str),
    Warn(&'a str),
    /// Retained as command output, prefix stripped.
    Info(&'a str),
    /// Banners and other chatter.
    Other,
}

pub fn classify(line: &str) -> Line<'_> {
    if let Some(rest) = line.strip_prefix(ERROR_PREFIX) {
        Line::Error(rest)
    } else if let Some(rest) = line.strip_prefix(WARN_PREFIX) {
        Line::Warn(rest)
    } else if let Some(rest) = line.strip_prefix(INFO_PREFIX) {
        Line::Info(rest)
    } else {
        Line::Other
    }
}

/// A synchronous conversation over sbt's stdout (`reader`) and stdin (`writer`).
pub struct SbtSession<R, W> {
    reader: R,
    writer: W,
    timeout: Option<Duration>,
}

impl<R, W> SbtSession<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, timeout: Option<Duration>) -> Self {
        SbtSession {
            reader,
            writer,
            timeout,
        }
    }

    /// Run `command` and return its `[info]` lines with the prefix stripped.
    ///
    /// `[error]` and `[warn]` lines are logged at the matching level and left
    /// out of the result.
    pub async fn send_and_collect(&mut self, command: &str) -> Result<Vec<String>, SessionError> {
        debug!("sbt input: {}", command);
        let request = format!("{}\n{}\n", command, SENTINEL_COMMAND);
        self.writer.write_all(request.as_bytes()).await?;
        self.writer.flush().await?;

        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.read_response(command))
                .await
                .map_err(|_| SessionError::Timeout {
                    command: command.to_string(),
                    timeout,
                })?,
            None => self.read_response(command).await,
        }
    }

    /// Write a command without waiting for a response (used for `exit`).
    pub async fn send(&mut self, command: &str) -> Result<(), SessionError> {
        debug!("sbt input: {}", command);
        self.writer.write_all(format!("{}\n", command).as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn read_response(&mut self, command: &str) -> Result<Vec<String>, SessionError> {
        let mut lines = Vec::new();
        let mut buf = String::new();
        loop {
            buf.clear();
            if self.reader.read_line(&mut buf).await? == 0 {
                return Err(SessionError::Closed {
                    command: command.to_string(),
                });
            }
            let line = buf.trim_end_matches(['\n', '\r']);
            debug!("sbt output: {}", line);
            if line == SENTINEL_ECHO {
                break;
            }
            match classify(line) {
                Line::Error(msg) => error!("{}", msg),
                Line::Warn(msg) => warn!("{}", msg),
                Line::Info(msg) => lines.push(msg.to_string()),
                Line::Other => {}
            }
        }
        Ok(lines)
    }

    #[cfg(test)]
    pub fn writer(&self) -> &W {
        &self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    fn session(transcript: &str) -> SbtSession<BufReader<&[u8]>, Vec<u8>> {
        SbtSession::new(BufReader::new(transcript.as_bytes()), Vec::new(), None)
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("[error] boom"), Line::Error("boom"));
        assert_eq!(classify("[warn] careful"), Line::Warn("careful"));
        assert_eq!(classify("[info] \t * root"), Line::Info("\t * root"));
        assert_eq!(classify("[success] Total time: 0 s"), Line::Other);
        assert_eq!(classify("Loading project definition"), Line::Other);
    }

    #[tokio::test]
    async fn test_collects_info_until_sentinel() {
        let transcript = "Welcome to sbt\n\
            [info] first\n\
            [warn] deprecated setting\n\
            [error] something failed\n\
            [info] second\r\n\
            [success] Total time: 1 s\n\
            [info] ans: String = EOF\n\
            [info] next-command\n\
            [info] ans: String = EOF\n";
        let mut s = session(transcript);

        let lines = s.send_and_collect("show name").await.unwrap();
        assert_eq!(lines, vec!["first", "second"]);

        let lines = s.send_and_collect("other").await.unwrap();
        assert_eq!(lines, vec!["next-command"]);

        let written = String::from_utf8(s.writer().clone()).unwrap();
        assert_eq!(
            written,
            "show name\neval \"EOF\"\nother\neval \"EOF\"\n"
        );
    }

    #[tokio::test]
    async fn test_stream_closed_before_sentinel() {
        let mut s = session("[info] partial\n");
        let err = s.send_and_collect("projects").await.unwrap_err();
        assert!(matches!(err, SessionError::Closed { ref command } if command == "projects"));
    }

    #[tokio::test]
    async fn test_timeout_when_shell_hangs() {
        let (_keep_open, silent) = tokio::io::duplex(64);
        let mut s = SbtSession::new(
            BufReader::new(silent),
            Vec::new(),
            Some(Duration::from_millis(50)),
        );
        let err = s.send_and_collect("update").await.unwrap_err();
        assert!(matches!(err, SessionError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_send_writes_single_line() {
        let mut s = session("");
        s.send("exit").await.unwrap();
        assert_eq!(s.writer().as_slice(), b"exit\n");
    }
}
