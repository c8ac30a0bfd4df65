//! Outbound HTTP to one backend: a pooled `hyper` client, a deadline on
//! every call, and a small retry budget reserved for idempotent
//! pass-through calls. Generation/chat/completion calls always go through
//! `call`/`stream` with `retryable: false` and are attempted at most once.

use crate::wire::{FrameSplitter, WireFormat};
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use promptgate_error::ProxyError;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

/// One outbound call: method, path (joined to the client's base URL),
/// headers, body, a deadline, and whether a transport-level failure may
/// be retried.
pub struct BackendRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub deadline: Duration,
    pub retryable: bool,
}

impl BackendRequest {
    pub fn get(path: impl Into<String>, deadline: Duration) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            deadline,
            retryable: true,
        }
    }

    pub fn post(path: impl Into<String>, body: Bytes, deadline: Duration) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            headers: HeaderMap::new(),
            body,
            deadline,
            retryable: false,
        }
    }
}

pub struct BackendResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A single-consumer, finite handle over a backend's streaming response,
/// already split into wire-format frames. A mid-stream transport failure
/// arrives in-band as an `Err` frame so the consumer can tell it apart
/// from a natural end of stream. Dropping the handle or calling `close`
/// aborts the underlying connection promptly.
pub struct StreamHandle {
    frames: mpsc::Receiver<Result<Bytes, ProxyError>>,
    cancellation: CancellationToken,
}

impl StreamHandle {
    pub(crate) fn from_parts(
        frames: mpsc::Receiver<Result<Bytes, ProxyError>>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            frames,
            cancellation,
        }
    }

    pub async fn next_frame(&mut self) -> Option<Result<Bytes, ProxyError>> {
        self.frames.recv().await
    }

    /// Aborts the backend connection. Safe to call more than once; safe to
    /// call after the stream has already ended naturally.
    pub fn close(&self) {
        self.cancellation.cancel();
    }
}

/// A raw, unparsed byte stream used for pass-through endpoints: the proxy
/// never looks inside these frames, just relays them in order.
pub struct PassthroughStream {
    pub status: StatusCode,
    pub headers: HeaderMap,
    chunks: mpsc::Receiver<Bytes>,
}

impl PassthroughStream {
    pub async fn next_chunk(&mut self) -> Option<Bytes> {
        self.chunks.recv().await
    }
}

#[derive(Clone)]
pub struct BackendClient {
    base_url: String,
    inner: HyperClient<HttpConnector, Full<Bytes>>,
    retry_budget: u32,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_retry_budget(base_url, 2)
    }

    pub fn with_retry_budget(base_url: impl Into<String>, retry_budget: u32) -> Self {
        let inner = HyperClient::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            base_url: base_url.into(),
            inner,
            retry_budget,
        }
    }

    fn build_request(&self, req: &BackendRequest) -> http::Request<Full<Bytes>> {
        let uri = format!("{}{}", self.base_url, req.path);
        let mut builder = http::Request::builder().method(req.method.clone()).uri(uri);
        for (name, value) in req.headers.iter() {
            builder = builder.header(name, value);
        }
        builder
            .body(Full::new(req.body.clone()))
            .expect("request built from validated method/uri/headers")
    }

    /// Sends `req` and waits for the complete response body. Used for
    /// non-streaming calls and for pass-through calls whose body is small
    /// enough to buffer (admin/health/version).
    #[instrument(skip(self, req), fields(path = %req.path, retryable = req.retryable))]
    pub async fn call(&self, req: BackendRequest) -> Result<BackendResponse, ProxyError> {
        let attempts = if req.retryable { self.retry_budget + 1 } else { 1 };
        let mut last_err = None;
        for attempt in 0..attempts {
            match self.try_call(&req).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    if attempt + 1 < attempts {
                        warn!(attempt, "transient backend failure, retrying");
                    }
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.expect("attempts is always >= 1"))
    }

    async fn try_call(&self, req: &BackendRequest) -> Result<BackendResponse, ProxyError> {
        let request = self.build_request(req);
        let sent = tokio::time::timeout(req.deadline, self.inner.request(request))
            .await
            .map_err(|_| ProxyError::request_timeout("backend call exceeded deadline"))?
            .map_err(|e| ProxyError::upstream_error(e.to_string()))?;

        let status = sent.status();
        let headers = sent.headers().clone();
        let body = tokio::time::timeout(req.deadline, sent.into_body().collect())
            .await
            .map_err(|_| ProxyError::request_timeout("backend body exceeded deadline"))?
            .map_err(|e| ProxyError::upstream_error(e.to_string()))?
            .to_bytes();

        Ok(BackendResponse {
            status,
            headers,
            body,
        })
    }

    /// Starts a streaming call and returns a handle producing wire-format
    /// frames, parsed from the backend's raw body by a background pump
    /// task. The pump task owns the connection; dropping or closing the
    /// handle cancels it, which drops the connection within the next poll.
    #[instrument(skip(self, req), fields(path = %req.path))]
    pub async fn stream(
        &self,
        req: BackendRequest,
        format: WireFormat,
    ) -> Result<StreamHandle, ProxyError> {
        let request = self.build_request(&req);
        let sent = tokio::time::timeout(req.deadline, self.inner.request(request))
            .await
            .map_err(|_| ProxyError::request_timeout("backend call exceeded deadline"))?
            .map_err(|e| ProxyError::upstream_error(e.to_string()))?;

        if !sent.status().is_success() {
            return Err(ProxyError::upstream_error(format!(
                "backend returned status {}",
                sent.status()
            )));
        }

        let (tx, rx) = mpsc::channel(64);
        let cancellation = CancellationToken::new();
        let pump_cancellation = cancellation.clone();
        let mut body = sent.into_body();
        tokio::spawn(async move {
            let mut splitter = FrameSplitter::new(format);
            loop {
                tokio::select! {
                    _ = pump_cancellation.cancelled() => break,
                    frame = body.frame() => {
                        match frame {
                            Some(Ok(frame)) => {
                                if let Some(data) = frame.data_ref() {
                                    splitter.push(data);
                                    while let Some(parsed) = splitter.next_frame() {
                                        if tx.send(Ok(parsed)).await.is_err() {
                                            return;
                                        }
                                    }
                                }
                            }
                            Some(Err(err)) => {
                                warn!(error = %err, "backend stream transport error");
                                let _ = tx.send(Err(ProxyError::upstream_error(err.to_string()))).await;
                                return;
                            }
                            None => break,
                        }
                    }
                }
            }
            if let Some(remainder) = splitter.take_remainder() {
                let _ = tx.send(Ok(remainder)).await;
            }
        });

        Ok(StreamHandle::from_parts(rx, cancellation))
    }

    /// Starts a streaming call for a pass-through endpoint: no frame
    /// parsing, raw chunks relayed in arrival order.
    #[instrument(skip(self, req), fields(path = %req.path))]
    pub async fn stream_passthrough(
        &self,
        req: BackendRequest,
    ) -> Result<PassthroughStream, ProxyError> {
        let request = self.build_request(&req);
        let sent = tokio::time::timeout(req.deadline, self.inner.request(request))
            .await
            .map_err(|_| ProxyError::request_timeout("backend call exceeded deadline"))?
            .map_err(|e| ProxyError::upstream_error(e.to_string()))?;

        let status = sent.status();
        let headers = sent.headers().clone();
        let (tx, rx) = mpsc::channel(64);
        let mut body = sent.into_body();
        tokio::spawn(async move {
            loop {
                match body.frame().await {
                    Some(Ok(frame)) => {
                        if let Some(data) = frame.data_ref() {
                            if tx.send(data.clone()).await.is_err() {
                                return;
                            }
                        }
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "pass-through stream transport error");
                        break;
                    }
                    None => break,
                }
            }
        });

        Ok(PassthroughStream {
            status,
            headers,
            chunks: rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotent_get_defaults_to_retryable() {
        let req = BackendRequest::get("/api/tags", Duration::from_secs(5));
        assert!(req.retryable);
        assert_eq!(req.method, Method::GET);
    }

    #[test]
    fn generation_post_defaults_to_not_retryable() {
        let req = BackendRequest::post("/api/generate", Bytes::from_static(b"{}"), Duration::from_secs(5));
        assert!(!req.retryable);
    }
}
