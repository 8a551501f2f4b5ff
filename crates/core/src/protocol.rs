//! Line protocol spoken by the client's command server.
//!
//! A request is `<command>\r\n`. The response may be preceded by banner and
//! prompt lines; the payload starts after a line containing [`MARKER`] and
//! ends at a line equal to [`SENTINEL`].

use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::pyon;

/// Lists work-queue entries.
pub const QUEUE_INFO: &str = "queue-info";
/// Lists slots.
pub const SLOT_INFO: &str = "slot-info";
/// Reports client options.
pub const OPTIONS: &str = "options";

/// Token on the line that opens a payload.
pub const MARKER: &str = "PyON";
/// Line that ends a response.
pub const SENTINEL: &str = "---";

/// Why a command produced no payload.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Socket read or write failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// The command was not written in a single write.
    #[error("transmission problem: tried sending {expected} bytes, but actually only sent {actual} bytes")]
    ShortWrite {
        /// Bytes in the request.
        expected: usize,
        /// Bytes the write accepted.
        actual: usize,
    },
    /// The peer hung up before the sentinel line.
    #[error("connection closed before the end of the {command} response")]
    Closed {
        /// Command whose response was cut short.
        command: String,
    },
    /// The payload was not valid PyON for the expected record type.
    #[error("cannot decode {command} response: {source}")]
    Decode {
        /// Command whose payload failed to decode.
        command: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

impl ProtocolError {
    /// True for connection-level failures, false for payload decode failures.
    pub fn is_transport(&self) -> bool {
        !matches!(self, Self::Decode { .. })
    }
}

/// A command-server connection that can carry several requests in sequence.
pub struct Connection<S> {
    stream: BufReader<S>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a connected stream. Nothing is read until the first request.
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    /// Sends `command` and returns the raw payload of its response.
    ///
    /// Payload lines are concatenated without their line terminators.
    pub async fn read_raw(&mut self, command: &str) -> Result<String, ProtocolError> {
        let request = format!("{command}\r\n");
        let sent = self.stream.write(request.as_bytes()).await?;
        if sent != request.len() {
            return Err(ProtocolError::ShortWrite {
                expected: request.len(),
                actual: sent,
            });
        }
        self.stream.flush().await?;

        let mut payload = String::new();
        let mut reading = false;
        let mut line = String::new();
        loop {
            line.clear();
            if self.stream.read_line(&mut line).await? == 0 {
                return Err(ProtocolError::Closed {
                    command: command.to_string(),
                });
            }
            let text = line.trim_end_matches(['\r', '\n']);
            if text == SENTINEL {
                break;
            }
            if reading {
                payload.push_str(text);
            } else if text.contains(MARKER) {
                reading = true;
            }
        }

        tracing::trace!(command, bytes = payload.len(), "response read");
        Ok(payload)
    }

    /// Sends `command` and decodes its PyON payload into `T`.
    pub async fn request<T: DeserializeOwned>(&mut self, command: &str) -> Result<T, ProtocolError> {
        let raw = self.read_raw(command).await?;
        pyon::decode(&raw).map_err(|source| ProtocolError::Decode {
            command: command.to_string(),
            source,
        })
    }

    /// Shuts down the write half. Dropping the connection closes it as well.
    pub async fn close(mut self) -> Result<(), ProtocolError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
