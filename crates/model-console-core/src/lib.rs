//! Chat stream decoding and conversation state for the model console.
//!
//! This crate holds the parts of the console that do not touch the network
//! or the terminal:
//!
//! - **Frames**: the tagged records of the assistant's streaming protocol
//! - **Decoder**: incremental bytes-to-frames decoding, sync and async
//! - **Transcript**: the message history and the reducer that folds frames into it
//!
//! # Example
//!
//! ```
//! use model_console_core::{ExchangeMode, FrameDecoder, Transcript};
//!
//! let mut transcript = Transcript::new();
//! transcript.begin_exchange("hello", ExchangeMode::Stream).unwrap();
//!
//! let mut decoder = FrameDecoder::new();
//! for chunk in [&b"data: {\"type\":\"content\",\"content\":\"Hel"[..], &b"lo\"}\n"[..]] {
//!     for frame in decoder.decode(chunk) {
//!         transcript.apply(&frame);
//!     }
//! }
//! decoder.finish();
//! transcript.finish_stream().unwrap();
//!
//! assert_eq!(transcript.messages()[1].content, "Hello");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod decoder;
pub mod error;
pub mod frame;
pub mod stream;
pub mod transcript;

pub use decoder::{FrameDecoder, Frames, Utf8Decoder};
pub use error::{Result, TranscriptError};
pub use frame::{Frame, FrameKind};
pub use stream::frames;
pub use transcript::{
    reduce, ExchangeMode, FrameEffect, Message, Role, Transcript, EMPTY_REPLY, EXCHANGE_FAILED,
    GENERIC_STREAM_ERROR, UNKNOWN_TOOL,
};
