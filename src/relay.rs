//! Buffer-then-splice: previewing a one-shot byte stream without loss.
//!
//! The upstream body can only be read once, but the gateway wants a short
//! diagnostic preview of it before forwarding. [`preview_stream`] pulls
//! chunks until a character cap is reached, recording each one, and returns
//! the preview text together with a [`SplicedStream`] that first replays the
//! recorded chunks in original order and then resumes pulling live from the
//! same source. The concatenation of replayed-then-live bytes is
//! byte-identical to an unbuffered passthrough.
//!
//! An error encountered during the preview read is retained and re-yielded
//! after the replayed prefix, so the downstream consumer observes the same
//! fault it would have hit reading the source directly.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

/// Character cap for diagnostic previews of hybrid responses.
pub const PREVIEW_CHAR_CAP: usize = 2000;

/// Two-stage stream: replay a buffered prefix, then forward the live source.
pub struct SplicedStream<S, E>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    replay: VecDeque<Bytes>,
    pending_error: Option<E>,
    live: Option<S>,
}

impl<S, E> Stream for SplicedStream<S, E>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(chunk) = this.replay.pop_front() {
            return Poll::Ready(Some(Ok(chunk)));
        }
        if let Some(err) = this.pending_error.take() {
            this.live = None;
            return Poll::Ready(Some(Err(err)));
        }
        match this.live.as_mut() {
            Some(live) => live.poll_next_unpin(cx),
            None => Poll::Ready(None),
        }
    }
}

/// Read up to `char_cap` decoded characters from `source` into an ordered
/// buffer, then return the preview text and the spliced stream.
///
/// The buffer is bounded by the cap plus at most one chunk, independent of
/// total stream length.
pub async fn preview_stream<S, E>(mut source: S, char_cap: usize) -> (String, SplicedStream<S, E>)
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    let mut replay = VecDeque::new();
    let mut preview = String::new();
    let mut carry: Vec<u8> = Vec::new();
    let mut chars_read = 0usize;
    let mut pending_error = None;

    while chars_read < char_cap {
        match source.next().await {
            Some(Ok(chunk)) => {
                chars_read += decode_into(&mut preview, &mut carry, &chunk);
                replay.push_back(chunk);
            }
            Some(Err(err)) => {
                pending_error = Some(err);
                break;
            }
            None => {
                if !carry.is_empty() {
                    preview.push(char::REPLACEMENT_CHARACTER);
                }
                return (
                    preview,
                    SplicedStream {
                        replay,
                        pending_error,
                        live: None,
                    },
                );
            }
        }
    }

    (
        preview,
        SplicedStream {
            replay,
            pending_error,
            live: Some(source),
        },
    )
}

/// Lossy UTF-8 decode of `chunk` appended to any carried-over bytes. A
/// multibyte character split across chunk boundaries stays in `carry` until
/// its continuation bytes arrive; genuinely invalid sequences become
/// replacement characters. Returns the number of characters appended.
fn decode_into(preview: &mut String, carry: &mut Vec<u8>, chunk: &[u8]) -> usize {
    carry.extend_from_slice(chunk);
    let mut appended = 0usize;
    let mut offset = 0usize;
    loop {
        match std::str::from_utf8(&carry[offset..]) {
            Ok(valid) => {
                appended += valid.chars().count();
                preview.push_str(valid);
                carry.clear();
                return appended;
            }
            Err(err) => {
                let valid_up_to = err.valid_up_to();
                let valid = String::from_utf8_lossy(&carry[offset..offset + valid_up_to]);
                appended += valid.chars().count();
                preview.push_str(&valid);
                offset += valid_up_to;
                match err.error_len() {
                    Some(len) => {
                        preview.push(char::REPLACEMENT_CHARACTER);
                        appended += 1;
                        offset += len;
                    }
                    None => {
                        // Incomplete trailing character: wait for more bytes.
                        let tail = carry.split_off(offset);
                        *carry = tail;
                        return appended;
                    }
                }
            }
        }
    }
}
