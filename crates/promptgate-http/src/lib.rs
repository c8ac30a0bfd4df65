//! Outbound backend transport and streaming-response mediation: the part
//! of the proxy that talks to an Ollama-style backend and, for streaming
//! calls, runs the output scan pipeline over the response as it arrives.

#![deny(rust_2018_idioms)]

pub mod client;
pub mod mediator;
pub mod wire;

pub use client::{BackendClient, BackendRequest, BackendResponse, PassthroughStream, StreamHandle};
pub use mediator::{mediate, BlockedMessage, MediatorContext, MediatorOutcome, MediatorThresholds};
pub use wire::{
    extract_full_text, format_blocked_frame, parse_content_delta, ContentDelta, FrameSplitter,
    WireFormat,
};
