use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::rpc::codec;
use crate::rpc::error::{DecodeError, EncodeError};

/// Why the backend-to-client pump stopped.
#[derive(Debug)]
pub enum CloseReason {
    /// The backend closed its stdout (process exited or shut the pipe).
    StreamEnded,
    /// The backend produced bytes that do not frame or parse; the stream
    /// cannot be trusted past this point.
    Decode(DecodeError),
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Failed to encode outbound message: {0}")]
    Encode(#[from] EncodeError),

    #[error("Backend stdin is not writable: {0}")]
    Io(#[from] std::io::Error),
}

/// Capacity of the backend-to-connection handoff channel.
const MESSAGE_CHANNEL_CAPACITY: usize = 64;

/// Decodes frames from the backend's stdout on a dedicated task.
///
/// Messages arrive on the returned receiver in exactly the order they were
/// decoded. When the stream ends or a frame fails to decode, the channel
/// closes and the task resolves with the reason, exactly once. The task
/// never blocks anything but itself; it is unblocked by the pipe reaching
/// EOF when the process dies.
pub fn spawn_reader(stdout: ChildStdout) -> (mpsc::Receiver<Value>, JoinHandle<CloseReason>) {
    let (tx, rx) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);

    let handle = tokio::spawn(async move {
        let mut reader = BufReader::new(stdout);
        loop {
            match codec::read_message(&mut reader).await {
                Ok(Some(message)) => {
                    if tx.send(message).await.is_err() {
                        debug!("Connection dropped its receiver, stopping backend reader");
                        return CloseReason::StreamEnded;
                    }
                }
                Ok(None) => {
                    debug!("Backend stdout reached end of stream");
                    return CloseReason::StreamEnded;
                }
                Err(e) => {
                    warn!("Failed to decode backend output: {}", e);
                    return CloseReason::Decode(e);
                }
            }
        }
    });

    (rx, handle)
}

/// Writes client messages to the backend's stdin, strictly in call order.
pub struct BridgeWriter {
    stdin: ChildStdin,
}

impl BridgeWriter {
    pub fn new(stdin: ChildStdin) -> Self {
        Self { stdin }
    }

    /// Frames `message` and writes it to the backend.
    pub async fn write(&mut self, message: &Value) -> Result<(), WriteError> {
        let frame = codec::encode(message)?;
        self.stdin.write_all(&frame).await?;
        self.stdin.flush().await?;
        Ok(())
    }
}
