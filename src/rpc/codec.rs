//! Content-Length framing for JSON-RPC messages.
//!
//! A frame is `Content-Length: <n>\r\n\r\n` followed by exactly `n` bytes of
//! UTF-8 JSON, the stdio transport framing used by the Language Server
//! Protocol.

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::rpc::error::{DecodeError, EncodeError};

/// Serializes `message` to compact JSON and prefixes the Content-Length
/// header. There is no trailing separator after the payload.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    let body = serde_json::to_vec(message)?;
    let mut frame = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Reads the next complete frame from `reader` and parses its payload.
///
/// Returns `Ok(None)` on a clean end of stream at a frame boundary. An EOF
/// inside a header or payload, a missing or non-numeric Content-Length, or a
/// payload that is not valid JSON all end the stream with an error; callers
/// must treat the source as dead afterwards (no resynchronization).
///
/// Header names are matched case-insensitively and unknown headers (such as
/// `Content-Type`) are skipped.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Value>, DecodeError>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut line = String::new();
    let mut mid_frame = false;

    loop {
        line.clear();
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            if mid_frame {
                return Err(DecodeError::UnexpectedEof);
            }
            return Ok(None);
        }
        mid_frame = true;

        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }

        if let Some((name, value)) = trimmed.split_once(':')
            && name.trim().eq_ignore_ascii_case("content-length")
        {
            let value = value.trim();
            content_length = Some(
                value
                    .parse::<usize>()
                    .map_err(|_| DecodeError::InvalidContentLength(value.to_string()))?,
            );
        }
    }

    let length = content_length.ok_or(DecodeError::MissingContentLength)?;

    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            DecodeError::UnexpectedEof
        } else {
            DecodeError::Io(e)
        }
    })?;

    let value = serde_json::from_slice(&body).map_err(DecodeError::MalformedPayload)?;
    Ok(Some(value))
}
