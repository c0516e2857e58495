//! procwatch - a process-level HTTP watchdog for turning a command-line
//! executable into a network-addressable function.
//!
//! Every inbound HTTP request spawns a fresh child process: the request
//! body is streamed to its stdin, its stdout is streamed back as the
//! response body, and a layered timeout/concurrency discipline keeps a
//! single misbehaving invocation from starving the rest.
//!
//! # Layout
//!
//! - [`http`]/[`server`] — the HTTP engine: parsing, response building, the
//!   connection/worker-pool server loop. Internal; the `procwatch` binary
//!   target is the only consumer.
//! - [`config`] — environment-variable configuration loading.
//! - [`state`] — process-wide readiness flag and in-flight request gauge.
//! - [`lock`] — the readiness sentinel file and `--run-healthcheck` contract.
//! - [`metrics`] — the Prometheus-style counters and the `/metrics` surface.
//! - [`invoke`] — the per-request child process invocation pipeline.
//! - [`auth`] — the optional JWT validation adapter.
//! - [`handler`] — wires admission, auth, invocation and metrics into a
//!   [`Handler`] for the main listener.
//! - [`shutdown`] — the SIGTERM drain-and-exit coordinator.
//! - [`werror`] — typed errors for configuration, invocation and auth.
pub(crate) mod http {
    pub(crate) mod query;
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod types;
}
pub(crate) mod server {
    pub(crate) mod connection;
    pub(crate) mod server_impl;
}
pub(crate) mod errors;
pub mod limits;

pub mod auth;
pub mod config;
pub mod handler;
pub mod invoke;
pub mod lock;
pub mod metrics;
pub mod shutdown;
pub mod state;
pub mod werror;

pub use crate::http::{
    request::Request,
    response::{
        write::{BodyWriter, WriteBuffer},
        Handled, Response,
    },
    types::{Method, StatusCode, Version},
};
pub use crate::server::{
    connection::{ConnectionData, ConnectionFilter},
    server_impl::{Handler, Server, ServerBuilder},
};

/// Runs a [`Handler::handle`]-shaped closure against a scratch request and
/// response, for the doc examples above to exercise without binding a
/// socket.
#[doc(hidden)]
pub fn run_test<F: FnOnce(&Request, &mut Response) -> Handled>(f: F) {
    f(
        &Request::new(&crate::limits::ReqLimits::default()),
        &mut Response::new(&crate::limits::RespLimits::default()),
    );
}

#[doc(hidden)]
#[macro_export]
macro_rules! impt_default_handler {
    ($name:ident) => {
        use procwatch::{Handled, Handler, Request, Response, StatusCode};
        struct $name;

        impl Handler<()> for $name {
            async fn handle(&self, _: &mut (), _: &Request, resp: &mut Response) -> Handled {
                resp.status(StatusCode::Ok).body("function output")
            }
        }
    };
}
