#![cfg(feature = "net")]

use super::http::{read_request, write_json_response, RequestDeadline, SimpleHttpRequest};
use super::server::{spawn_listener, ServerHandle};
use super::{HttpError, NetError};
use crate::control_plane::admin::{
    AdminRequestContext, AdminServiceError, GrayRuleRequest, PublishRuleRequest,
    RollbackRuleRequest, RuleAdminService,
};
use crate::lifecycle::RuleError;
use crate::timeouts::{ADMIN_REQUEST_TIMEOUT, ADMIN_STREAM_TIMEOUT, SERVER_SHUTDOWN_GRACE};
use crate::util::now_ms;
use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const SERVER_NAME: &str = "admin_http";
const MAX_REQUEST_ID_CHARS: usize = 128;

#[derive(Debug, Clone)]
pub struct AdminHttpServerConfig {
    pub bind: SocketAddr,
    /// Budget for a request from accept to dispatch.
    pub request_timeout: Duration,
    /// Socket read/write timeout.
    pub stream_timeout: Duration,
    pub max_connections: Option<usize>,
}

impl AdminHttpServerConfig {
    pub fn new(bind: SocketAddr) -> Self {
        Self {
            bind,
            request_timeout: ADMIN_REQUEST_TIMEOUT,
            stream_timeout: ADMIN_STREAM_TIMEOUT,
            max_connections: Some(64),
        }
    }
}

pub struct AdminHttpServerHandle {
    inner: ServerHandle,
}

impl AdminHttpServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr()
    }

    pub fn try_shutdown(&mut self, timeout: Duration) -> Result<(), NetError> {
        self.inner.try_shutdown(timeout)
    }

    pub fn shutdown(&mut self) {
        if let Err(err) = self.inner.try_shutdown(SERVER_SHUTDOWN_GRACE) {
            warn!("event=admin_http_shutdown_failed error={err}");
        }
    }

    /// Blocks the caller for the lifetime of the accept loop.
    pub fn wait(mut self) {
        self.inner.wait();
    }
}

pub struct AdminHttpServer;

impl AdminHttpServer {
    pub fn spawn(
        config: AdminHttpServerConfig,
        service: Arc<RuleAdminService>,
    ) -> Result<AdminHttpServerHandle, NetError> {
        let listener = TcpListener::bind(config.bind)?;
        let request_timeout = config.request_timeout;
        let stream_timeout = config.stream_timeout;
        let inner = spawn_listener(
            SERVER_NAME,
            listener,
            config.max_connections,
            move |stream, addr| {
                handle_connection(stream, addr, &service, request_timeout, stream_timeout)
            },
        )?;
        info!(
            "event=admin_http_listening addr={} max_connections={:?}",
            inner.local_addr(),
            config.max_connections
        );
        Ok(AdminHttpServerHandle { inner })
    }
}

fn handle_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    service: &RuleAdminService,
    request_timeout: Duration,
    stream_timeout: Duration,
) -> Result<(), NetError> {
    let deadline = RequestDeadline::starting_at(Instant::now(), request_timeout);
    stream.set_read_timeout(Some(stream_timeout))?;
    stream.set_write_timeout(Some(stream_timeout))?;
    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(NetError::Io(err)) => return Err(NetError::Io(err)),
        Err(NetError::Http(HttpError::RequestTimeout)) => {
            debug!("event=admin_http_read_timeout addr={addr}");
            let failure = HttpAdminError::new(408, "request_timeout", "request timed out");
            return reply_unparsed(&mut stream, failure);
        }
        Err(err) => {
            warn!("event=admin_http_invalid_request addr={addr} error={err}");
            let failure = HttpAdminError::bad_request(format!("invalid HTTP request: {err}"));
            return reply_unparsed(&mut stream, failure);
        }
    };
    let request_id = request_id_for(&request);
    let started = Instant::now();
    let (status, body) = match deadline.enforce() {
        Err(_) => {
            let failure = HttpAdminError::new(408, "request_timeout", "request deadline exceeded");
            (failure.status, failure.body(&request_id))
        }
        Ok(()) => match dispatch_request(service, &request) {
            Ok(data) => (200, json!({ "data": data, "request_id": request_id })),
            Err(failure) => (failure.status, failure.body(&request_id)),
        },
    };
    debug!(
        "event=admin_http_request method={} path={} status={} request_id={} elapsed_ms={}",
        request.method,
        request.path,
        status,
        request_id,
        started.elapsed().as_millis()
    );
    write_json_response(&mut stream, status, Some(&request_id), &body)
}

/// Failure reply for a request that never parsed, under a generated id.
fn reply_unparsed(stream: &mut TcpStream, failure: HttpAdminError) -> Result<(), NetError> {
    let request_id = next_request_id();
    write_json_response(
        stream,
        failure.status,
        Some(&request_id),
        &failure.body(&request_id),
    )
}

fn dispatch_request(
    service: &RuleAdminService,
    request: &SimpleHttpRequest,
) -> Result<Value, HttpAdminError> {
    let ctx = build_context(request)?;
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/admin/rules/active") => to_data(service.active(&ctx)?),
        ("GET", "/admin/rules/versions") => {
            let limit = parse_limit(request)?;
            let cursor = request.query_param("cursor");
            to_data(service.list_versions(&ctx, limit, cursor.as_deref())?)
        }
        ("POST", "/admin/rules/publish") => {
            let payload: PublishRuleRequest = parse_body(request)?;
            to_data(service.publish(&ctx, payload)?)
        }
        ("POST", "/admin/rules/rollback") => {
            let payload: RollbackRuleRequest = parse_body(request)?;
            to_data(service.rollback(&ctx, payload)?)
        }
        ("POST", "/admin/rules/gray") => {
            let payload: GrayRuleRequest = parse_body(request)?;
            to_data(service.set_gray(&ctx, payload)?)
        }
        ("GET", "/admin/rules/audit") => {
            let limit = parse_limit(request)?;
            to_data(service.recent_audit(&ctx, limit)?)
        }
        ("GET", "/admin/rules/resolve") => {
            let requester = request.query_param("requester").ok_or_else(|| {
                HttpAdminError::validation("missing `requester` query parameter")
            })?;
            to_data(service.resolve(&ctx, &requester)?)
        }
        _ => Err(HttpAdminError::new(
            404,
            "not_found",
            format!("no route for {} {}", request.method, request.path),
        )),
    }
}

fn build_context(request: &SimpleHttpRequest) -> Result<AdminRequestContext, HttpAdminError> {
    let actor = match request.header("x-actor-id").map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(raw.parse::<i64>().map_err(|_| {
            HttpAdminError::bad_request(format!("X-Actor-Id must be an integer, got `{raw}`"))
        })?),
    };
    Ok(AdminRequestContext::new(actor))
}

fn parse_limit(request: &SimpleHttpRequest) -> Result<Option<usize>, HttpAdminError> {
    request
        .query_param("limit")
        .map(|raw| {
            raw.trim()
                .parse::<usize>()
                .map_err(|_| HttpAdminError::validation(format!("invalid limit `{raw}`")))
        })
        .transpose()
}

fn parse_body<T: DeserializeOwned>(request: &SimpleHttpRequest) -> Result<T, HttpAdminError> {
    let is_json = request
        .header("content-type")
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false);
    if !is_json {
        return Err(HttpAdminError::new(
            415,
            "unsupported_media_type",
            "Content-Type must be application/json",
        ));
    }
    serde_json::from_slice(&request.body)
        .map_err(|err| HttpAdminError::bad_request(format!("invalid JSON body: {err}")))
}

fn to_data<T: Serialize>(value: T) -> Result<Value, HttpAdminError> {
    serde_json::to_value(value).map_err(|err| {
        error!("event=admin_http_serialize_failed error={err}");
        HttpAdminError::internal()
    })
}

fn request_id_for(request: &SimpleHttpRequest) -> String {
    request
        .header("x-request-id")
        .map(str::trim)
        .filter(|value| !value.is_empty() && value.len() <= MAX_REQUEST_ID_CHARS)
        .map(str::to_string)
        .unwrap_or_else(next_request_id)
}

fn next_request_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("req-{}-{seq}", now_ms())
}

#[derive(Debug)]
struct HttpAdminError {
    status: u16,
    code: &'static str,
    message: String,
}

impl HttpAdminError {
    fn new(status: u16, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn validation(message: impl Into<String>) -> Self {
        Self::new(400, "validation_error", message)
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, "bad_request", message)
    }

    fn internal() -> Self {
        Self::new(500, "internal_error", "internal error")
    }

    fn body(&self, request_id: &str) -> Value {
        json!({
            "code": self.code,
            "message": self.message,
            "request_id": request_id,
        })
    }
}

impl From<AdminServiceError> for HttpAdminError {
    fn from(err: AdminServiceError) -> Self {
        match err {
            AdminServiceError::Forbidden => {
                HttpAdminError::new(403, "forbidden", "administrator privileges required")
            }
            AdminServiceError::InvalidRequest(message) => HttpAdminError::validation(message),
            AdminServiceError::UnknownVersion(raw) => {
                HttpAdminError::new(404, "not_found", format!("rule version {raw} not found"))
            }
            AdminServiceError::Rule(RuleError::Validation(message)) => {
                HttpAdminError::validation(message)
            }
            AdminServiceError::Rule(RuleError::NotFound { id }) => {
                HttpAdminError::new(404, "not_found", format!("rule version {id} not found"))
            }
            AdminServiceError::Rule(other) => {
                error!("event=admin_http_internal_error error={other}");
                HttpAdminError::internal()
            }
        }
    }
}
