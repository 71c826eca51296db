//! Async adapter from a byte stream to a frame stream.

use futures::stream::{self, Stream, StreamExt};

use crate::decoder::FrameDecoder;
use crate::frame::Frame;

/// Decode a chunked response body into frames.
///
/// Frames are yielded in arrival order as soon as their line is complete.
/// A transport error is passed through and ends the stream. At end of body
/// the unterminated tail, if any, is discarded.
pub fn frames<S, B, E>(body: S) -> impl Stream<Item = Result<Frame, E>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    let state = Some((Box::pin(body), FrameDecoder::new()));

    stream::unfold(state, |state| async move {
        let (mut body, mut decoder) = state?;
        loop {
            if let Some(frame) = decoder.next_frame() {
                return Some((Ok(frame), Some((body, decoder))));
            }
            match body.next().await {
                Some(Ok(chunk)) => decoder.push(chunk.as_ref()),
                Some(Err(e)) => return Some((Err(e), None)),
                None => {
                    decoder.finish();
                    return None;
                }
            }
        }
    })
}
