//! Stream readers
//!
//! One loop per output channel. Each loop decodes its pipe into lines and
//! hands them to the shared [`Emitter`] until end-of-stream, a read error or
//! cancellation.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::sync::CancellationToken;

use crate::emitter::Emitter;
use crate::signal::DataLineType;

/// Read buffer size for one pipe
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Read lines from `pipe` until it ends, fails or `cancel` fires
///
/// A line that is only partially read when cancellation arrives is
/// discarded. A final line without a terminator is still delivered at
/// end-of-stream. Returns the number of lines handed to the emitter.
pub async fn read_lines<R: AsyncRead + Unpin>(
    pipe: R,
    kind: DataLineType,
    emitter: Emitter,
    cancel: CancellationToken,
) -> u64 {
    let process_id = emitter.process_id();
    let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, pipe);
    // Reuse line buffer across iterations
    let mut buf = Vec::with_capacity(256);
    let mut lines = 0u64;

    loop {
        buf.clear();
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(process_id, channel = %kind, "Stream reader cancelled");
                break;
            }
            read = reader.read_until(b'\n', &mut buf) => read,
        };

        match read {
            Ok(0) => {
                tracing::debug!(process_id, channel = %kind, "Stream ended");
                break;
            }
            Ok(_) => {
                if !emitter.line(kind, decode_line(&buf)) {
                    break;
                }
                lines += 1;
            }
            Err(e) => {
                // Only this channel ends; the sibling and the exit watcher carry on
                tracing::warn!(
                    process_id,
                    channel = %kind,
                    error = %e,
                    "Error reading from stream"
                );
                break;
            }
        }
    }

    tracing::debug!(process_id, channel = %kind, lines, "Stream reader finished");
    lines
}

/// Decode one raw line, stripping `\n` or `\r\n`
///
/// Invalid UTF-8 is replaced rather than rejected so a single bad byte does
/// not end the channel.
pub fn decode_line(raw: &[u8]) -> String {
    let mut end = raw.len();
    if end > 0 && raw[end - 1] == b'\n' {
        end -= 1;
        if end > 0 && raw[end - 1] == b'\r' {
            end -= 1;
        }
    }
    String::from_utf8_lossy(&raw[..end]).into_owned()
}
