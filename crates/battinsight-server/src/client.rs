//! Per-request client identity: address, user agent and request id.

use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::http::header::{HeaderName, HeaderValue, USER_AGENT};
use actix_web::middleware::Next;
use actix_web::{Error, HttpMessage, HttpRequest};
use battinsight_core::model::ClientInfo;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest client-supplied request id that is echoed back.
const MAX_REQUEST_ID_LEN: usize = 128;

#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Client address. `X-Forwarded-For` is trusted only from a loopback peer
/// (a local reverse proxy), and a loopback value inside it is ignored.
pub fn client_ip(req: &HttpRequest) -> String {
    let peer = req.peer_addr().map(|addr| addr.ip());

    if peer.is_some_and(|ip| ip.is_loopback()) {
        if let Some(value) = req
            .headers()
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
        {
            // first entry is the original client
            let first = value.split(',').next().unwrap_or("").trim();
            if is_localhost_address(first) {
                tracing::warn!(
                    event = "xff_loopback_rejected",
                    value = %first,
                    "ignoring loopback X-Forwarded-For from trusted proxy"
                );
            } else if !first.is_empty() {
                return first.to_string();
            }
        }
    } else if req.headers().contains_key("X-Forwarded-For") {
        tracing::warn!(event = "xff_untrusted_peer", peer = ?peer);
    }

    peer.map(|ip| ip.to_string())
        .unwrap_or_else(|| ClientInfo::default().ip)
}

pub fn is_localhost_address(ip: &str) -> bool {
    ip == "::1"
        || ip.starts_with("127.")
        || ip.eq_ignore_ascii_case("localhost")
        || ip.eq_ignore_ascii_case("::ffff:127.0.0.1")
}

pub fn client_info(req: &HttpRequest) -> ClientInfo {
    let user_agent = req
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| ClientInfo::default().user_agent);
    ClientInfo {
        ip: client_ip(req),
        user_agent,
    }
}

/// Client-supplied `X-Request-ID` when it is short printable ASCII, else a
/// fresh id.
fn incoming_request_id(req: &HttpRequest) -> String {
    req.headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
        .filter(|v| v.chars().all(|c| c.is_ascii_graphic()))
        .map(str::to_string)
        .unwrap_or_else(battinsight_core::next_request_id)
}

/// Request id assigned by [`tag_request_id`], or a fresh one when the
/// middleware is not mounted.
pub fn request_id(req: &HttpRequest) -> String {
    req.extensions()
        .get::<RequestId>()
        .map(|r| r.0.clone())
        .unwrap_or_else(|| incoming_request_id(req))
}

/// Assigns the request id and echoes it on every response.
pub async fn tag_request_id(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let rid = incoming_request_id(req.request());
    req.extensions_mut().insert(RequestId(rid.clone()));

    let mut res = next.call(req).await?;
    if let Ok(value) = HeaderValue::from_str(&rid) {
        res.headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    Ok(res)
}
