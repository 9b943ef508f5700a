use thiserror::Error;
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::StatusCode;
use tungstenite::http::header::{HeaderValue, ORIGIN, SEC_WEBSOCKET_PROTOCOL};

/// Origin pattern that admits every origin.
pub const ANY_ORIGIN: &str = "*";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeReject {
    #[error("origin {0:?} is not allowed")]
    OriginNotAllowed(String),
    #[error("none of the offered sub-protocols ({0}) is accepted")]
    NoAcceptableSubprotocol(String),
}

impl HandshakeReject {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::OriginNotAllowed(_) => StatusCode::FORBIDDEN,
            Self::NoAcceptableSubprotocol(_) => StatusCode::BAD_REQUEST,
        }
    }
}

/// Cross-origin allow-list plus accepted `Sec-WebSocket-Protocol` values.
#[derive(Debug, Clone)]
pub struct HandshakePolicy {
    allowed_origins: Vec<String>,
    subprotocols: Vec<String>,
}

impl HandshakePolicy {
    pub fn new(allowed_origins: Vec<String>, subprotocols: Vec<String>) -> Self {
        Self {
            allowed_origins: allowed_origins
                .into_iter()
                .map(|o| normalize_origin(&o))
                .collect(),
            subprotocols,
        }
    }

    /// Accepts any origin and clients that offer no sub-protocol.
    pub fn permissive() -> Self {
        Self::new(vec![ANY_ORIGIN.to_string()], Vec::new())
    }

    /// Requests without an `Origin` header come from non-browser clients and
    /// are always allowed.
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        let Some(origin) = origin else {
            return true;
        };
        let origin = normalize_origin(origin);
        self.allowed_origins
            .iter()
            .any(|allowed| allowed == ANY_ORIGIN || *allowed == origin)
    }

    /// Picks the first offered sub-protocol (client order) that is accepted.
    pub fn negotiate_subprotocol(
        &self,
        offered: Option<&str>,
    ) -> Result<Option<String>, HandshakeReject> {
        let Some(offered) = offered.filter(|o| !o.trim().is_empty()) else {
            return Ok(None);
        };
        offered
            .split(',')
            .map(str::trim)
            .find(|p| self.subprotocols.iter().any(|s| s == p))
            .map(|p| Some(p.to_string()))
            .ok_or_else(|| HandshakeReject::NoAcceptableSubprotocol(offered.to_string()))
    }

    /// Full decision for one upgrade request; returns the sub-protocol to echo.
    pub fn check(
        &self,
        origin: Option<&str>,
        offered_protocols: Option<&str>,
    ) -> Result<Option<String>, HandshakeReject> {
        if !self.origin_allowed(origin) {
            return Err(HandshakeReject::OriginNotAllowed(
                origin.unwrap_or_default().to_string(),
            ));
        }
        self.negotiate_subprotocol(offered_protocols)
    }

    /// Applies the policy to a tungstenite upgrade request.
    ///
    /// `outcome` records the decision so the caller can log it after the
    /// handshake returns.
    pub fn apply(
        &self,
        req: &Request,
        mut resp: Response,
        outcome: &mut Option<Result<Option<String>, HandshakeReject>>,
    ) -> Result<Response, ErrorResponse> {
        let origin = header_str(req, ORIGIN.as_str());
        let offered = header_str(req, SEC_WEBSOCKET_PROTOCOL.as_str());

        let decision = self.check(origin, offered);
        *outcome = Some(decision.clone());

        match decision {
            Ok(Some(protocol)) => match HeaderValue::from_str(&protocol) {
                Ok(value) => {
                    resp.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
                    Ok(resp)
                }
                Err(_) => Err(reject_response(
                    StatusCode::BAD_REQUEST,
                    "invalid sub-protocol".to_string(),
                )),
            },
            Ok(None) => Ok(resp),
            Err(reject) => Err(reject_response(reject.status(), reject.to_string())),
        }
    }
}

fn header_str<'a>(req: &'a Request, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

fn reject_response(status: StatusCode, body: String) -> ErrorResponse {
    let mut resp = ErrorResponse::new(Some(body));
    *resp.status_mut() = status;
    resp
}

/// Origins compare case-insensitively and without a trailing slash.
fn normalize_origin(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_ascii_lowercase()
}
