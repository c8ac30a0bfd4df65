//! The scanned-endpoint request flow: ingress gate, parse, detect
//! language, admit, input scan, call the backend, output scan or
//! mediate, release the slot exactly once, emit one completion event.

use super::blocked;
use super::request::ParsedRequest;
use crate::context::RequestContext;
use crate::events::{Outcome, RequestCompleted};
use crate::state::AppState;
use axum::body::Body;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use promptgate_error::{ErrorKind, ProxyError};
use promptgate_http::{
    format_blocked_frame, mediate, BackendRequest, BlockedMessage, MediatorContext,
    MediatorOutcome, MediatorThresholds, WireFormat,
};
use promptgate_scan::{ErrorCatalog, Lang, ScanContext, ScanReport};
use std::net::IpAddr;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::Span;

struct CatalogMessage<'a> {
    catalog: &'a ErrorCatalog,
    language: Lang,
}

impl BlockedMessage for CatalogMessage<'_> {
    fn render(&self, kind: ErrorKind, reason: &str) -> String {
        self.catalog.render(kind, self.language, reason)
    }
}

/// Cancels the request's token once the deadline expires. One watchdog is
/// armed per request and covers its whole lifetime, including the queued
/// wait and a long-running stream; dropping it disarms the deadline.
struct DeadlineWatchdog(tokio::task::JoinHandle<()>);

impl DeadlineWatchdog {
    fn arm(ctx: &RequestContext) -> Self {
        let token = ctx.cancellation.clone();
        let remaining = ctx.remaining();
        Self(tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            token.cancel();
        }))
    }
}

impl Drop for DeadlineWatchdog {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Emits the request-completed event and releases the slot, with one
/// elapsed reading feeding both.
fn emit_and_release(
    state: &AppState,
    request_id: crate::context::RequestId,
    model: &str,
    outcome: Outcome,
    wait_ms: f64,
    guard: promptgate_concurrency::SlotGuard,
) {
    let process = guard.elapsed();
    state.events.request_completed(RequestCompleted {
        request_id,
        model: model.to_string(),
        outcome,
        wait_ms,
        process_ms: process.as_secs_f64() * 1000.0,
    });
    guard.release(process);
}

fn stream_content_type(format: WireFormat) -> &'static str {
    match format {
        WireFormat::Ollama => "application/x-ndjson",
        WireFormat::OpenAi => "text/event-stream",
    }
}

/// One scanned-endpoint request, from ingress through response. `path` is
/// the backend path to call; `parse` extracts `(model, text, stream)`
/// from the raw body in this endpoint's wire format.
///
/// Carries one `promptgate.request` span for the whole request; fields that
/// aren't known until parsing/language-detection happen are recorded onto
/// the span as they become available rather than split across child spans.
#[tracing::instrument(
    name = "promptgate.request",
    skip(state, parse, body),
    fields(
        client_id = %client_ip,
        model = tracing::field::Empty,
        request_id = tracing::field::Empty,
        wire_format = tracing::field::Empty,
        language = tracing::field::Empty,
    )
)]
pub async fn handle_scanned(
    state: AppState,
    client_ip: IpAddr,
    path: &'static str,
    parse: fn(&[u8]) -> Result<ParsedRequest, ProxyError>,
    body: Bytes,
) -> Response {
    if !state.ingress.allows(client_ip) {
        return blocked::response(
            ErrorKind::AccessDenied,
            &state.catalog.render(ErrorKind::AccessDenied, Lang::En, ""),
            Lang::En,
            &ScanReport::allow_all(),
        );
    }

    let parsed = match parse(&body) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };
    Span::current().record("model", parsed.model.as_str());
    Span::current().record("wire_format", format!("{:?}", parsed.wire_format).as_str());

    let language = if state.config.language_detection_enabled {
        promptgate_scan::detect(&parsed.scannable_text)
    } else {
        Lang::En
    };
    Span::current().record("language", language.tag());

    let ctx = RequestContext::new(
        client_ip.to_string(),
        parsed.model.clone(),
        parsed.wire_format,
        parsed.stream,
        state.config.request_timeout(),
    )
    .with_language(language);
    Span::current().record("request_id", ctx.request_id.to_string().as_str());
    let watchdog = DeadlineWatchdog::arm(&ctx);

    let admit_started = Instant::now();
    let ticket = match state.concurrency.admit(&parsed.model, ctx.cancellation.clone()) {
        Ok(t) => t,
        Err(_) => {
            state.events.request_completed(RequestCompleted {
                request_id: ctx.request_id,
                model: parsed.model.clone(),
                outcome: Outcome::ServerBusy,
                wait_ms: 0.0,
                process_ms: 0.0,
            });
            return blocked::response(
                ErrorKind::ServerBusy,
                &state.catalog.render(ErrorKind::ServerBusy, language, ""),
                language,
                &ScanReport::allow_all(),
            );
        }
    };

    // Cancellation here is the deadline watchdog: a client disconnect
    // drops this whole future instead, and the ticket's own drop handling
    // returns the queue slot.
    let guard = match ticket.acquire().await {
        Ok(g) => g,
        Err(_) => {
            state.events.request_completed(RequestCompleted {
                request_id: ctx.request_id,
                model: parsed.model.clone(),
                outcome: Outcome::Timeout,
                wait_ms: admit_started.elapsed().as_secs_f64() * 1000.0,
                process_ms: 0.0,
            });
            return blocked::response(
                ErrorKind::RequestTimeout,
                &state.catalog.render(ErrorKind::RequestTimeout, language, ""),
                language,
                &ScanReport::allow_all(),
            );
        }
    };
    let wait_ms = admit_started.elapsed().as_secs_f64() * 1000.0;

    let request_id_tag = ctx.request_id.to_string();
    let scan_ctx = ScanContext {
        request_id: &request_id_tag,
        client_id: &ctx.client_id,
        language,
        model: &parsed.model,
    };

    if state.config.input_guard_enabled {
        match state.input_scan.scan(&parsed.scannable_text, &scan_ctx).await {
            Ok(report) if !report.allowed => {
                let message = state
                    .catalog
                    .render(ErrorKind::PromptBlocked, language, &report.failure_summary());
                emit_and_release(&state, ctx.request_id, &parsed.model, Outcome::BlockedInput, wait_ms, guard);
                return blocked::response(ErrorKind::PromptBlocked, &message, language, &report);
            }
            Ok(_) => {}
            Err(e) => {
                emit_and_release(&state, ctx.request_id, &parsed.model, Outcome::UpstreamError, wait_ms, guard);
                return e.into_response();
            }
        }
    }

    let backend_req = BackendRequest::post(path, body.clone(), ctx.remaining());

    if parsed.stream {
        let handle = match state.backend.stream(backend_req, parsed.wire_format).await {
            Ok(h) => h,
            Err(e) => {
                emit_and_release(&state, ctx.request_id, &parsed.model, Outcome::UpstreamError, wait_ms, guard);
                return e.into_response();
            }
        };

        let (tx, rx) = mpsc::channel::<Bytes>(64);
        let mediator_state = state.clone();
        let model = parsed.model.clone();
        let wire_format = parsed.wire_format;
        let request_id = ctx.request_id;
        let cancellation = ctx.cancellation.clone();
        let mediator_ctx = MediatorContext {
            request_id: request_id_tag.clone(),
            client_id: ctx.client_id.clone(),
            model: parsed.model.clone(),
            language,
        };
        tokio::spawn(async move {
            // The handler returns as soon as response headers go out; the
            // watchdog moves in here so the deadline still covers the
            // stream's full lifetime.
            let _watchdog = watchdog;
            let message = CatalogMessage {
                catalog: &mediator_state.catalog,
                language,
            };
            let outcome = mediate(
                handle,
                wire_format,
                mediator_state.output_scan.pipeline(),
                MediatorThresholds {
                    scan_bytes: mediator_state.config.stream_scan_bytes,
                    scan_interval: mediator_state.config.stream_scan_interval(),
                },
                mediator_ctx,
                message,
                tx.clone(),
                cancellation.clone(),
            )
            .await;
            let event_outcome = match outcome {
                MediatorOutcome::Flushed => Outcome::Ok,
                MediatorOutcome::Blocked { .. } => Outcome::BlockedOutput,
                MediatorOutcome::Aborted if cancellation.is_cancelled() => {
                    // Deadline expiry, not a disconnect: the client is
                    // still listening, so tell it why the stream ended.
                    let rendered = mediator_state.catalog.render(ErrorKind::RequestTimeout, language, "");
                    let frame = format_blocked_frame(
                        wire_format,
                        ErrorKind::RequestTimeout,
                        &rendered,
                        language.tag(),
                        &[],
                    );
                    let _ = tx.send(frame).await;
                    Outcome::Timeout
                }
                MediatorOutcome::Aborted => Outcome::UpstreamError,
            };
            emit_and_release(&mediator_state, request_id, &model, event_outcome, wait_ms, guard);
        });

        let stream = tokio_stream::wrappers::ReceiverStream::new(rx).map(Ok::<_, std::io::Error>);
        return Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, stream_content_type(parsed.wire_format))
            .body(Body::from_stream(stream))
            .expect("static status and streamed body always build a response");
    }

    let response = match state.backend.call(backend_req).await {
        Ok(r) => r,
        Err(e) => {
            emit_and_release(&state, ctx.request_id, &parsed.model, Outcome::UpstreamError, wait_ms, guard);
            return e.into_response();
        }
    };

    if state.config.output_guard_enabled && response.status.is_success() {
        let full_text = promptgate_http::extract_full_text(parsed.wire_format, &response.body);
        match state.output_scan.scan(&full_text, &scan_ctx).await {
            Ok(report) if !report.allowed => {
                let message = state
                    .catalog
                    .render(ErrorKind::ResponseBlocked, language, &report.failure_summary());
                emit_and_release(&state, ctx.request_id, &parsed.model, Outcome::BlockedOutput, wait_ms, guard);
                return blocked::response(ErrorKind::ResponseBlocked, &message, language, &report);
            }
            Ok(_) => {}
            Err(e) => {
                emit_and_release(&state, ctx.request_id, &parsed.model, Outcome::UpstreamError, wait_ms, guard);
                return e.into_response();
            }
        }
    }

    emit_and_release(&state, ctx.request_id, &parsed.model, Outcome::Ok, wait_ms, guard);
    let status = StatusCode::from_u16(response.status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = Response::builder().status(status);
    if let Some(content_type) = response.headers.get(header::CONTENT_TYPE) {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    builder
        .body(Body::from(response.body))
        .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
}

/// Forwards a request verbatim with no admission, scan, or mediation:
/// model list, pull, push, model-management calls, health.
pub async fn passthrough(state: AppState, client_ip: IpAddr, method: Method, path: String, body: Bytes) -> Response {
    if !state.ingress.allows(client_ip) {
        return blocked::response(
            ErrorKind::AccessDenied,
            &state.catalog.render(ErrorKind::AccessDenied, Lang::En, ""),
            Lang::En,
            &ScanReport::allow_all(),
        );
    }

    let mut req = BackendRequest::post(path, body, state.config.request_timeout());
    req.retryable = method == Method::GET;
    req.method = method;

    let mut stream = match state.backend.stream_passthrough(req).await {
        Ok(s) => s,
        Err(e) => return e.into_response(),
    };

    let (tx, rx) = mpsc::channel::<Bytes>(64);
    let status = stream.status;
    let headers = stream.headers.clone();
    tokio::spawn(async move {
        while let Some(chunk) = stream.next_chunk().await {
            if tx.send(chunk).await.is_err() {
                break;
            }
        }
    });

    let body_stream = tokio_stream::wrappers::ReceiverStream::new(rx).map(Ok::<_, std::io::Error>);
    let mut builder = Response::builder().status(status.as_u16());
    for (name, value) in headers.iter() {
        builder = builder.header(name, value);
    }
    builder
        .body(Body::from_stream(body_stream))
        .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
}
