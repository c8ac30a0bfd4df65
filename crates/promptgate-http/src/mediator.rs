//! `StreamMediator`: pumps frames from a backend `StreamHandle` to an
//! outbound channel, running the output scan pipeline over a rolling
//! buffer instead of the whole response. Modeled as a task that owns both
//! ends (an input side reading backend frames, an output side writing
//! client frames) with the scan pipeline in between, the same shape as a
//! coroutine that reads, maybe scans, and writes.

use crate::client::StreamHandle;
use crate::wire::{format_blocked_frame, parse_content_delta, WireFormat};
use bytes::Bytes;
use promptgate_error::ErrorKind;
use promptgate_scan::{Lang, ScanContext, ScanPipeline};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Configurable triggers for when the rolling scan buffer is flushed
/// through the output pipeline.
#[derive(Debug, Clone, Copy)]
pub struct MediatorThresholds {
    pub scan_bytes: usize,
    pub scan_interval: Duration,
}

impl Default for MediatorThresholds {
    fn default() -> Self {
        Self {
            scan_bytes: 256,
            scan_interval: Duration::from_millis(500),
        }
    }
}

/// How a mediated stream ended, for the caller's event emission and slot
/// release bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediatorOutcome {
    Flushed,
    Blocked { failed_scanners: Vec<String> },
    Aborted,
}

/// Render-localized, formatted blocked/error text plugged in by the
/// caller so this module doesn't depend on the error catalog directly.
pub trait BlockedMessage {
    fn render(&self, kind: ErrorKind, reason: &str) -> String;
}

/// Owned request identity for one mediated stream: the mediation task
/// outlives its handler, so it can't borrow from the request, and each
/// output scan rebuilds a borrowed [`ScanContext`] from these fields.
#[derive(Debug, Clone)]
pub struct MediatorContext {
    pub request_id: String,
    pub client_id: String,
    pub model: String,
    pub language: Lang,
}

struct State {
    format: WireFormat,
    pipeline: ScanPipeline,
    thresholds: MediatorThresholds,
    ctx: MediatorContext,
    buffer: String,
}

/// Drives one stream to completion, writing client-bound frames to `out`.
/// Returns once the stream is flushed, blocked, or aborted; the caller
/// awaits the returned `JoinHandle`-equivalent via the outcome channel.
#[instrument(
    skip(handle, out, pipeline, message, ctx),
    fields(request_id = %ctx.request_id, language = %ctx.language)
)]
pub async fn mediate(
    mut handle: StreamHandle,
    format: WireFormat,
    pipeline: ScanPipeline,
    thresholds: MediatorThresholds,
    ctx: MediatorContext,
    message: impl BlockedMessage,
    out: mpsc::Sender<Bytes>,
    cancellation: CancellationToken,
) -> MediatorOutcome {
    let mut state = State {
        format,
        pipeline,
        thresholds,
        ctx,
        buffer: String::new(),
    };
    let mut ticker = tokio::time::interval(state.thresholds.scan_interval);
    ticker.tick().await; // first tick fires immediately; discard it

    loop {
        tokio::select! {
            _ = cancellation.cancelled() => {
                handle.close();
                return MediatorOutcome::Aborted;
            }
            _ = ticker.tick() => {
                if let Some(outcome) = scan_and_maybe_block(&mut state, &mut handle, &message, &out).await {
                    return outcome;
                }
            }
            frame = handle.next_frame() => {
                match frame {
                    None => {
                        // Backend closed without an explicit terminal chunk.
                        // Run a final scan over whatever is buffered before
                        // calling it flushed.
                        if let Some(outcome) = scan_and_maybe_block(&mut state, &mut handle, &message, &out).await {
                            return outcome;
                        }
                        return MediatorOutcome::Flushed;
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "backend failed mid-stream");
                        handle.close();
                        let rendered = message.render(ErrorKind::UpstreamError, &err.reason);
                        let terminal = format_blocked_frame(
                            state.format,
                            ErrorKind::UpstreamError,
                            &rendered,
                            state.ctx.language.tag(),
                            &[],
                        );
                        let _ = out.send(terminal).await;
                        return MediatorOutcome::Aborted;
                    }
                    Some(Ok(frame)) => {
                        let delta = parse_content_delta(state.format, &frame);
                        if delta.content.is_empty() && !delta.is_end {
                            // Keep-alive or role marker: forward untouched,
                            // no scan needed.
                            if out.send(frame).await.is_err() {
                                handle.close();
                                return MediatorOutcome::Aborted;
                            }
                            continue;
                        }

                        state.buffer.push_str(&delta.content);
                        let over_threshold = state.buffer.len() >= state.thresholds.scan_bytes;

                        if delta.is_end || over_threshold {
                            if let Some(outcome) = scan_and_maybe_block(&mut state, &mut handle, &message, &out).await {
                                return outcome;
                            }
                        }

                        if out.send(frame).await.is_err() {
                            handle.close();
                            return MediatorOutcome::Aborted;
                        }

                        if delta.is_end {
                            return MediatorOutcome::Flushed;
                        }
                    }
                }
            }
        }
    }
}

/// Scans whatever is buffered since the last trigger. On a pass, clears
/// the buffer and returns `None` to keep reading. On a block, closes the
/// handle, emits the terminal frame, and returns the final outcome.
async fn scan_and_maybe_block(
    state: &mut State,
    handle: &mut StreamHandle,
    message: &impl BlockedMessage,
    out: &mpsc::Sender<Bytes>,
) -> Option<MediatorOutcome> {
    if state.buffer.is_empty() {
        return None;
    }
    let scan_ctx = ScanContext {
        request_id: &state.ctx.request_id,
        client_id: &state.ctx.client_id,
        language: state.ctx.language,
        model: &state.ctx.model,
    };
    let report = state.pipeline.scan(&state.buffer, &scan_ctx).await;
    state.buffer.clear();
    if report.allowed {
        return None;
    }

    info!(failed = ?report.failed_scanner_names(), "output scan blocked stream");
    handle.close();
    let reason = report.failure_summary();
    let rendered = message.render(ErrorKind::ResponseBlocked, &reason);
    let terminal = format_blocked_frame(
        state.format,
        ErrorKind::ResponseBlocked,
        &rendered,
        state.ctx.language.tag(),
        &report.failed_scanner_names(),
    );
    if out.send(terminal).await.is_err() {
        warn!("client disconnected before the blocked-stream terminal frame could be sent");
    }
    Some(MediatorOutcome::Blocked {
        failed_scanners: report.failed_scanner_names(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::StreamHandle;
    use crate::wire::WireFormat;
    use promptgate_error::ProxyError;
    use promptgate_scan::{AlwaysFail, AlwaysPass, Lang, ScanPipeline, ScanPolicy};
    use std::sync::Arc;
    use std::time::Duration;

    struct EchoMessage;
    impl BlockedMessage for EchoMessage {
        fn render(&self, kind: ErrorKind, reason: &str) -> String {
            format!("{kind}: {reason}")
        }
    }

    fn stream_ctx() -> MediatorContext {
        MediatorContext {
            request_id: "req-test".to_string(),
            client_id: "127.0.0.1".to_string(),
            model: "m".to_string(),
            language: Lang::En,
        }
    }

    fn thresholds(scan_bytes: usize) -> MediatorThresholds {
        MediatorThresholds {
            scan_bytes,
            scan_interval: Duration::from_secs(3600),
        }
    }

    /// A backend handle whose frames are pre-queued, ending naturally once
    /// they are consumed. The returned token observes `close()` calls.
    fn handle_from(frames: Vec<Bytes>) -> (StreamHandle, CancellationToken) {
        let (tx, rx) = mpsc::channel(frames.len().max(1));
        for frame in frames {
            tx.try_send(Ok(frame)).expect("channel sized to hold every frame");
        }
        let token = CancellationToken::new();
        (StreamHandle::from_parts(rx, token.clone()), token)
    }

    fn fail_on_code() -> ScanPipeline {
        ScanPipeline::new(
            vec![Arc::new(AlwaysFail::new("NoCode", 0.9, "code detected"))],
            ScanPolicy::FailFast,
        )
    }

    fn pass_all() -> ScanPipeline {
        ScanPipeline::new(vec![Arc::new(AlwaysPass::new("ok"))], ScanPolicy::RunAll)
    }

    #[tokio::test]
    async fn blocks_mid_stream_once_the_buffer_crosses_the_byte_threshold() {
        let (handle, token) = handle_from(vec![
            Bytes::from_static(br#"{"response":"Here is","done":false}"#),
            Bytes::from_static(br#"{"response":" a Python","done":false}"#),
            Bytes::from_static(
                br#"{"response":" snippet: def foo(): return os.environ['SECRET_KEY']","done":false}"#,
            ),
        ]);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let outcome = mediate(
            handle,
            WireFormat::Ollama,
            fail_on_code(),
            thresholds(64),
            stream_ctx(),
            EchoMessage,
            out_tx,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(
            outcome,
            MediatorOutcome::Blocked {
                failed_scanners: vec!["NoCode".to_string()]
            }
        );
        assert!(token.is_cancelled(), "backend handle must be closed on block");

        let first = out_rx.recv().await.unwrap();
        assert!(std::str::from_utf8(&first).unwrap().contains("Here is"));
        let second = out_rx.recv().await.unwrap();
        assert!(std::str::from_utf8(&second).unwrap().contains(" a Python"));
        let terminal = std::str::from_utf8(&out_rx.recv().await.unwrap())
            .unwrap()
            .to_string();
        assert!(terminal.contains("response_blocked"));
        assert!(terminal.contains("NoCode"));
        assert!(terminal.contains("\"done\":true"));
        assert!(
            out_rx.recv().await.is_none(),
            "no backend content may follow the blocking scan"
        );
    }

    #[tokio::test]
    async fn flushes_a_clean_stream_after_a_final_scan() {
        let (handle, token) = handle_from(vec![
            Bytes::from_static(br#"{"response":"All good","done":false}"#),
            Bytes::from_static(br#"{"response":" here.","done":true}"#),
        ]);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let outcome = mediate(
            handle,
            WireFormat::Ollama,
            pass_all(),
            thresholds(1024),
            stream_ctx(),
            EchoMessage,
            out_tx,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome, MediatorOutcome::Flushed);
        assert!(!token.is_cancelled());
        assert!(std::str::from_utf8(&out_rx.recv().await.unwrap()).unwrap().contains("All good"));
        assert!(std::str::from_utf8(&out_rx.recv().await.unwrap()).unwrap().contains(" here."));
        assert!(out_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn contentless_frames_are_forwarded_without_scanning() {
        // A fail-everything pipeline proves the keep-alive was never
        // scanned: any scan would have blocked the stream.
        let (handle, _token) = handle_from(vec![Bytes::from_static(br#"{"model":"m","done":false}"#)]);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let outcome = mediate(
            handle,
            WireFormat::Ollama,
            fail_on_code(),
            thresholds(1),
            stream_ctx(),
            EchoMessage,
            out_tx,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome, MediatorOutcome::Flushed);
        assert!(std::str::from_utf8(&out_rx.recv().await.unwrap()).unwrap().contains("\"model\""));
        assert!(out_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn backend_error_mid_stream_yields_a_terminal_upstream_error_frame() {
        let (tx, rx) = mpsc::channel(4);
        tx.try_send(Ok(Bytes::from_static(br#"{"response":"partial","done":false}"#)))
            .unwrap();
        tx.try_send(Err(ProxyError::upstream_error("connection reset"))).unwrap();
        drop(tx);
        let token = CancellationToken::new();
        let handle = StreamHandle::from_parts(rx, token.clone());

        let (out_tx, mut out_rx) = mpsc::channel(8);
        let outcome = mediate(
            handle,
            WireFormat::Ollama,
            pass_all(),
            thresholds(1024),
            stream_ctx(),
            EchoMessage,
            out_tx,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome, MediatorOutcome::Aborted);
        assert!(token.is_cancelled());
        assert!(std::str::from_utf8(&out_rx.recv().await.unwrap()).unwrap().contains("partial"));
        let terminal = std::str::from_utf8(&out_rx.recv().await.unwrap())
            .unwrap()
            .to_string();
        assert!(terminal.contains("upstream_error"));
        assert!(out_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn cancellation_closes_the_backend_handle() {
        // The sender stays open so the stream never ends on its own; only
        // the cancellation signal can end this call.
        let (_tx, rx) = mpsc::channel::<Result<Bytes, ProxyError>>(1);
        let token = CancellationToken::new();
        let handle = StreamHandle::from_parts(rx, token.clone());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let (out_tx, _out_rx) = mpsc::channel(1);
        let outcome = mediate(
            handle,
            WireFormat::Ollama,
            pass_all(),
            thresholds(1024),
            stream_ctx(),
            EchoMessage,
            out_tx,
            cancel,
        )
        .await;

        assert_eq!(outcome, MediatorOutcome::Aborted);
        assert!(token.is_cancelled());
    }
}
