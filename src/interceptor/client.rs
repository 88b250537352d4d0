//! Monitored `reqwest` client

use super::{CallInterceptor, OutgoingRequest, ResponseHead, CANCELLED_ERROR};
use crate::capture::BodyCapture;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Body, IntoUrl, Method, Request, RequestBuilder, Response, ResponseBuilderExt};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// `reqwest::Client` whose calls are recorded by a [`CallInterceptor`].
///
/// The response is handed back as soon as its headers arrive. Its body is
/// captured (up to the configured cap) while the caller reads it, and the
/// call is completed when the body ends. Transport errors are recorded and
/// returned as is.
#[derive(Clone)]
pub struct MonitoredClient {
    inner: reqwest::Client,
    interceptor: Arc<CallInterceptor>,
}

impl MonitoredClient {
    pub fn new(inner: reqwest::Client, interceptor: Arc<CallInterceptor>) -> Self {
        Self { inner, interceptor }
    }

    pub fn inner(&self) -> &reqwest::Client {
        &self.inner
    }

    pub fn get<U: IntoUrl>(&self, url: U) -> MonitoredRequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn post<U: IntoUrl>(&self, url: U) -> MonitoredRequestBuilder {
        self.request(Method::POST, url)
    }

    pub fn put<U: IntoUrl>(&self, url: U) -> MonitoredRequestBuilder {
        self.request(Method::PUT, url)
    }

    pub fn patch<U: IntoUrl>(&self, url: U) -> MonitoredRequestBuilder {
        self.request(Method::PATCH, url)
    }

    pub fn delete<U: IntoUrl>(&self, url: U) -> MonitoredRequestBuilder {
        self.request(Method::DELETE, url)
    }

    pub fn head<U: IntoUrl>(&self, url: U) -> MonitoredRequestBuilder {
        self.request(Method::HEAD, url)
    }

    pub fn request<U: IntoUrl>(&self, method: Method, url: U) -> MonitoredRequestBuilder {
        MonitoredRequestBuilder {
            client: self.clone(),
            inner: self.inner.request(method, url),
        }
    }

    pub async fn execute(&self, request: Request) -> reqwest::Result<Response> {
        let body = request
            .body()
            .and_then(|body| body.as_bytes())
            .map(<[u8]>::to_vec);
        let outgoing = OutgoingRequest {
            method: request.method().as_str(),
            url: request.url(),
            version: request.version(),
            headers: request.headers(),
            body: body.as_deref(),
        };

        let Some(id) = self.interceptor.on_request(&outgoing).await else {
            return self.inner.execute(request).await;
        };
        let guard = InFlight::new(id, Arc::clone(&self.interceptor));

        let response = match self.inner.execute(request).await {
            Ok(response) => response,
            Err(err) => {
                self.interceptor.on_failure(guard.id(), &err.to_string()).await;
                guard.disarm();
                return Err(err);
            }
        };

        let head = ResponseHead {
            status: response.status(),
            version: response.version(),
            headers: response.headers().clone(),
        };
        let url = response.url().clone();
        let tap = BodyTap {
            id: Some(guard.into_id()),
            interceptor: Arc::clone(&self.interceptor),
            head: head.clone(),
            capture: Some(BodyCapture::new(
                self.interceptor.config().max_content_length(),
            )),
            chunks: response.bytes_stream().boxed(),
        };

        Ok(rebuild_response(head, url, Body::wrap_stream(tap.into_stream())))
    }
}

/// Request builder whose `send` goes through [`MonitoredClient::execute`]
#[must_use = "a request builder does nothing until sent"]
pub struct MonitoredRequestBuilder {
    client: MonitoredClient,
    inner: RequestBuilder,
}

impl MonitoredRequestBuilder {
    fn map(self, f: impl FnOnce(RequestBuilder) -> RequestBuilder) -> Self {
        Self {
            inner: f(self.inner),
            client: self.client,
        }
    }

    pub fn header<K, V>(self, key: K, value: V) -> Self
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        self.map(|inner| inner.header(key, value))
    }

    pub fn headers(self, headers: HeaderMap) -> Self {
        self.map(|inner| inner.headers(headers))
    }

    pub fn bearer_auth<T: fmt::Display>(self, token: T) -> Self {
        self.map(|inner| inner.bearer_auth(token))
    }

    pub fn basic_auth<U: fmt::Display, P: fmt::Display>(
        self,
        username: U,
        password: Option<P>,
    ) -> Self {
        self.map(|inner| inner.basic_auth(username, password))
    }

    pub fn body<T: Into<Body>>(self, body: T) -> Self {
        self.map(|inner| inner.body(body))
    }

    pub fn json<T: Serialize + ?Sized>(self, json: &T) -> Self {
        self.map(|inner| inner.json(json))
    }

    pub fn form<T: Serialize + ?Sized>(self, form: &T) -> Self {
        self.map(|inner| inner.form(form))
    }

    pub fn query<T: Serialize + ?Sized>(self, query: &T) -> Self {
        self.map(|inner| inner.query(query))
    }

    pub fn timeout(self, timeout: Duration) -> Self {
        self.map(|inner| inner.timeout(timeout))
    }

    pub fn version(self, version: http::Version) -> Self {
        self.map(|inner| inner.version(version))
    }

    pub fn build(self) -> reqwest::Result<Request> {
        self.inner.build()
    }

    pub async fn send(self) -> reqwest::Result<Response> {
        let request = self.inner.build()?;
        self.client.execute(request).await
    }
}

/// Same status, version, headers and URL, with a new body
fn rebuild_response(head: ResponseHead, url: reqwest::Url, body: Body) -> Response {
    // Only the URL extension is set, so the builder cannot fail
    let template = http::Response::builder()
        .url(url)
        .body(())
        .unwrap_or_default();
    let (mut parts, ()) = template.into_parts();
    parts.status = head.status;
    parts.version = head.version;
    parts.headers = head.headers;
    Response::from(http::Response::from_parts(parts, body))
}

fn spawn_on_current<F>(id: &str, task: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(task);
        }
        Err(_) => tracing::debug!("Call {} dropped outside a runtime", id),
    }
}

/// Records a cancellation if the owning future is dropped before the
/// response headers arrive
struct InFlight {
    id: Option<String>,
    interceptor: Arc<CallInterceptor>,
}

impl InFlight {
    fn new(id: String, interceptor: Arc<CallInterceptor>) -> Self {
        Self {
            id: Some(id),
            interceptor,
        }
    }

    fn id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    fn disarm(mut self) {
        self.id = None;
    }

    /// Hand the call over to whoever completes it next
    fn into_id(mut self) -> String {
        self.id.take().unwrap_or_default()
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        let interceptor = Arc::clone(&self.interceptor);
        spawn_on_current(&id.clone(), async move {
            interceptor.on_failure(&id, CANCELLED_ERROR).await;
        });
    }
}

/// Response body passing through to the caller while a capped copy is kept.
///
/// End of body completes the call with the captured bytes; a body error
/// records a failure. Dropped early, it records what was read so far as a
/// truncated body.
struct BodyTap {
    id: Option<String>,
    interceptor: Arc<CallInterceptor>,
    head: ResponseHead,
    capture: Option<BodyCapture>,
    chunks: BoxStream<'static, reqwest::Result<Bytes>>,
}

impl BodyTap {
    async fn next_chunk(&mut self) -> Option<reqwest::Result<Bytes>> {
        match self.chunks.next().await {
            Some(Ok(chunk)) => {
                if let Some(capture) = self.capture.as_mut() {
                    capture.push(&chunk);
                }
                Some(Ok(chunk))
            }
            Some(Err(err)) => {
                if let Some(id) = self.id.take() {
                    self.interceptor.on_failure(&id, &err.to_string()).await;
                }
                Some(Err(err))
            }
            None => {
                if let (Some(id), Some(capture)) = (self.id.take(), self.capture.take()) {
                    self.interceptor
                        .on_response_body(&id, &self.head, capture.finish())
                        .await;
                }
                None
            }
        }
    }

    fn into_stream(self) -> BoxStream<'static, reqwest::Result<Bytes>> {
        stream::unfold(self, |mut tap| async move {
            let item = tap.next_chunk().await?;
            Some((item, tap))
        })
        .boxed()
    }
}

impl Drop for BodyTap {
    fn drop(&mut self) {
        let (Some(id), Some(capture)) = (self.id.take(), self.capture.take()) else {
            return;
        };
        let interceptor = Arc::clone(&self.interceptor);
        let head = self.head.clone();
        spawn_on_current(&id.clone(), async move {
            interceptor
                .on_response_body(&id, &head, capture.finish_partial())
                .await;
        });
    }
}
