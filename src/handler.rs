//! The top-level request router: health checks, admission control, optional
//! JWT auth, invocation, and metrics recording, wired onto a single
//! [`Handler`] implementation. A second, much smaller [`Handler`] serves the
//! metrics scrape listener.

use crate::{
    auth::Auth,
    config::Config,
    http::{response::Response, types::StatusCode},
    invoke,
    metrics::Metrics,
    state::{ConcurrencyLimiter, InFlight, ReadyState},
    Handled, Method, Request,
};
use std::sync::Arc;

const HEALTH_PATH: &[u8] = b"/_/health";

/// Serves invocations of `config.fprocess` behind health checks, admission
/// control, and optional JWT auth.
pub struct WatchdogHandler {
    config: Arc<Config>,
    auth: Arc<Auth>,
    ready: Arc<ReadyState>,
    limiter: Arc<ConcurrencyLimiter>,
    in_flight: Arc<InFlight>,
}

impl WatchdogHandler {
    pub fn new(
        config: Arc<Config>,
        auth: Arc<Auth>,
        ready: Arc<ReadyState>,
        limiter: Arc<ConcurrencyLimiter>,
        in_flight: Arc<InFlight>,
    ) -> Self {
        Self {
            config,
            auth,
            ready,
            limiter,
            in_flight,
        }
    }

    async fn handle_request(&self, req: &Request, resp: &mut Response) -> Handled {
        if req.url().path() == HEALTH_PATH {
            return self.handle_health(resp);
        }

        if self.auth.is_enabled() {
            if let Err(err) = self.auth.validate(req) {
                tracing::warn!(error = %err, "rejected unauthenticated request");
                return resp.status(StatusCode::Unauthorized).body(err.to_string());
            }
        }

        let Some(_limiter_guard) = self.limiter.try_enter() else {
            return resp
                .status(StatusCode::TooManyRequests)
                .body("too many in-flight requests");
        };
        let _in_flight_guard = self.in_flight.enter();

        let method = req.method().as_str();
        let outcome = invoke::invoke(&self.config, req).await;

        Metrics::global().record_completion(method, outcome.status);

        let status = status_from_u16(outcome.status);
        resp.status(status);
        for (name, value) in &outcome.headers {
            resp.header(name.as_str(), value.as_str());
        }
        if let Some(content_type) = &self.config.content_type {
            resp.header("content-type", content_type.as_str());
        }
        resp.body(outcome.body)
    }

    fn handle_health(&self, resp: &mut Response) -> Handled {
        if self.ready.is_ready() {
            resp.status(StatusCode::Ok).body("")
        } else {
            resp.status(StatusCode::ServiceUnavailable).body("")
        }
    }
}

impl crate::Handler for WatchdogHandler {
    async fn handle(&self, _connection_data: &mut (), request: &Request, response: &mut Response) -> Handled {
        self.handle_request(request, response).await
    }
}

/// Serves `GET /metrics` on the dedicated metrics listener. Kept separate
/// from [`WatchdogHandler`] so a slow or misbehaving `fprocess` can never
/// block the scrape surface.
#[derive(Default)]
pub struct MetricsHandler;

impl crate::Handler for MetricsHandler {
    async fn handle(&self, _connection_data: &mut (), request: &Request, response: &mut Response) -> Handled {
        if request.method() != Method::Get {
            return response.status(StatusCode::MethodNotAllowed).body("");
        }

        response
            .status(StatusCode::Ok)
            .header("content-type", "text/plain; version=0.0.4")
            .body(Metrics::global().render())
    }
}

fn status_from_u16(code: u16) -> StatusCode {
    match code {
        200 => StatusCode::Ok,
        401 => StatusCode::Unauthorized,
        429 => StatusCode::TooManyRequests,
        502 => StatusCode::BadGateway,
        503 => StatusCode::ServiceUnavailable,
        _ => StatusCode::InternalServerError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_invocation_statuses() {
        assert_eq!(status_from_u16(200), StatusCode::Ok);
        assert_eq!(status_from_u16(401), StatusCode::Unauthorized);
        assert_eq!(status_from_u16(429), StatusCode::TooManyRequests);
        assert_eq!(status_from_u16(502), StatusCode::BadGateway);
        assert_eq!(status_from_u16(503), StatusCode::ServiceUnavailable);
        assert_eq!(status_from_u16(500), StatusCode::InternalServerError);
        assert_eq!(status_from_u16(418), StatusCode::InternalServerError);
    }
}
