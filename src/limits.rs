//! Pre-allocated connection buffer sizing for the listener that accepts
//! invocation requests.
//!
//! Every accepted connection gets a fixed-size buffer up front, sized from
//! [`ReqLimits`]/[`RespLimits`] — there is no reallocate-and-retry path once
//! parsing starts. [`ReqLimits::from_config`] is how the watchdog's own
//! `Config` (in particular `max_request_body`) reaches this buffer: a
//! deployment accepting larger invocation payloads raises the one field that
//! matters for this domain, the rest stay at engine defaults sized for a
//! typical REST-ish request line and header block.

use std::time::Duration;

/// Controls server-level concurrency, queueing, and performance behavior.
///
/// Configures how the server handles connection admission, worker pools,
/// and overload protection with tunable parameters for different workloads.
///
/// # Connection management
/// ```text
///                            [------------]
///                            [ Tcp accept ]
///                            [------------]
///                                  ||
///                                  || TCP_STREAM
///                                  \/
/// [--------------]   Yes   /----------------\   No   [-------------]
/// [ Add to queue ] <====== | Queue if full? | =====> [ Sending 503 ]
/// [--------------]         \----------------/        [-------------]
///        ||                       
///        \==================\\          //====================\
///                            V          V                    ||
/// [---------]   Yes   /--------------------------\   No   [------]
/// [ Handler ] <====== | Is there a free handler? | =====> [ Wait ]
/// [---------]         \--------------------------/        [------]
/// ```
///
/// The queue acts as a buffer between connection acceptance and processing.
/// Workers continuously poll the queue using the configured `wait_strategy`.
///
/// # Handler
/// A worker process is a continuously running asynchronous task, created once
/// during initialization (from [tokio::spawn]). It runs in an infinite loop,
/// processing connections from a shared queue, which is replenished by a TCP
/// listener. This design eliminates the need to create tasks for each connection,
/// allowing for efficient resource reuse across an unlimited number of connections.
#[derive(Debug, Clone)]
pub struct ServerLimits {
    /// Number of worker handlers started at launch, and therefore the
    /// server-wide concurrency ceiling before requests start queueing
    /// (default: `100`). The watchdog's own per-request admission control is
    /// `Config::max_inflight`, applied inside the handler, not here — this is
    /// the engine's worker pool size underneath that.
    pub max_connections: usize,

    /// Connections waiting in the admission queue before new ones are
    /// answered `503` immediately (default: `250`).
    pub max_pending_connections: usize,

    /// How an idle worker waits for the next queued connection (default:
    /// `Sleep(50µs)`).
    pub wait_strategy: WaitStrategy,

    /// Dedicated handlers that answer `503` when the admission queue is full,
    /// so a flood of rejections can't itself starve real work (default: `1`).
    pub count_503_handlers: usize,

    /// Whether an engine-level parse error is reported as a JSON body or an
    /// empty one (default: `true`).
    pub json_errors: bool,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            max_connections: 100,
            max_pending_connections: 250,
            wait_strategy: WaitStrategy::Sleep(Duration::from_micros(50)),
            count_503_handlers: 1,
            json_errors: true,

            _priv: (),
        }
    }
}

/// Strategy for worker task waiting when no connections are available
///
/// Different strategies optimize for different workload patterns.
/// Choose based on your latency requirements and resource constraints.
#[derive(Debug, Clone)]
pub enum WaitStrategy {
    /// Busy-polls via [`tokio::task::yield_now()`] between queue checks.
    /// Keeps a core near 100% even when idle — only worth it if a worker
    /// must react to a new connection sooner than a sleep interval allows.
    Yield,

    /// Sleeps for the given duration between queue checks (the default
    /// `ServerLimits` strategy uses `50µs`).
    Sleep(Duration),
}

/// Connection-level timeouts and per-connection request ceiling. Applies to
/// the invocation listener and the metrics listener alike.
#[derive(Debug, Clone)]
pub struct ConnLimits {
    /// How long to wait for the next byte of a request before closing the
    /// connection (default: `2s`) — the primary defense against a client
    /// that opens a connection and then stalls.
    pub socket_read_timeout: Duration,

    /// How long a single write to the socket may take before the connection
    /// is closed (default: `3s`).
    pub socket_write_timeout: Duration,

    /// Requests allowed per connection before it is closed regardless of
    /// activity (default: `100`).
    pub max_requests_per_connection: usize,

    /// Hard ceiling on a connection's total lifetime regardless of read/write
    /// activity (default: `2 minutes`) — a backstop for the case where a
    /// slow invocation keeps re-justifying `socket_read_timeout` resets one
    /// request at a time.
    pub connection_lifetime: Duration,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ConnLimits {
    #[inline(always)]
    fn default() -> Self {
        Self {
            socket_read_timeout: Duration::from_secs(2),
            socket_write_timeout: Duration::from_secs(3),
            connection_lifetime: Duration::from_secs(120),
            max_requests_per_connection: 100,

            _priv: (),
        }
    }
}

/// Limits for the minimal `[METHOD] SP [PATH] CRLF` request form, with no
/// headers and no status line in the response. Neither watchdog listener
/// enables this: `main.rs` never calls `.http_09_limits(...)`, so no
/// invocation or metrics request is ever parsed this way. Kept because the
/// zero-copy parser still understands the form and a deployment embedding
/// this crate directly may want it; `/keep_alive/`-prefixed paths hold a
/// connection open across requests instead of closing after one.
#[derive(Debug, Clone)]
pub struct Http09Limits {
    /// Requests allowed on one keep_alive connection before it is closed
    /// regardless of idle time (default: `250`).
    pub max_requests_per_connection: usize,

    /// Idle time between requests before a keep_alive connection is closed
    /// (default: `30s`).
    pub connection_lifetime: Duration,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for Http09Limits {
    fn default() -> Self {
        Self {
            max_requests_per_connection: 250,
            connection_lifetime: Duration::from_secs(30),
            _priv: (),
        }
    }
}

/// Request parsing limits and the pre-allocated per-connection buffer they
/// size. `body_size` is the one field the watchdog actually varies per
/// deployment, see `ReqLimits::from_config`; everything else stays at a size
/// that fits a typical invocation request line and header block (bearer
/// tokens, content negotiation headers) without per-request reallocation.
#[derive(Debug, Clone)]
pub struct ReqLimits {
    /// Maximum URL length in bytes including path and query string (default: `256 B`).
    pub url_size: usize,
    /// Maximum number of path segments in the URL (default: `8`).
    pub url_parts: usize,
    /// Maximum query string length in bytes, `?` included (default: `128 B`).
    pub url_query_size: usize,
    /// Maximum number of `key=value` query parameters (default: `8`).
    pub url_query_parts: usize,

    /// Maximum number of headers per request (default: `16`).
    pub header_count: usize,
    /// Maximum header name length in bytes (default: `64 B`).
    pub header_name_size: usize,
    /// Maximum header value length in bytes; sized to fit a bearer JWT
    /// (default: `512 B`).
    pub header_value_size: usize,

    /// Maximum request body size in bytes, the invocation payload ceiling.
    /// Driven by `Config::max_request_body` when built via
    /// `ReqLimits::from_config` (default otherwise: `1 MiB`, well above a
    /// plain REST JSON body since invocation payloads can carry file
    /// uploads or batched events).
    pub body_size: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub precalc: ReqLimitsPrecalc,
}

impl Default for ReqLimits {
    fn default() -> Self {
        Self {
            url_size: 256,
            url_parts: 8,
            url_query_size: 128,
            url_query_parts: 8,

            header_count: 16,
            header_name_size: 64,
            header_value_size: 512,

            body_size: 1024 * 1024,

            precalc: ReqLimitsPrecalc::default(),
        }
    }
}

impl ReqLimits {
    /// Builds request limits from watchdog configuration: `body_size` tracks
    /// `Config::max_request_body`, everything else stays at the engine
    /// default since nothing else in the watchdog's configuration surface
    /// varies it.
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            body_size: config.max_request_body,
            ..Self::default()
        }
    }

    /// Returns the pre-allocated buffer size these limits require per
    /// connection (request line + headers + body + CRLF overhead).
    #[inline(always)]
    pub fn estimated_buffer_size(self) -> usize {
        self.precalculate().precalc.buffer
    }

    #[inline(always)]
    pub(crate) fn precalculate(mut self) -> Self {
        self.precalc.first_line = self.first_line();
        self.precalc.h_line = self.h_line();
        self.precalc.buffer = self.buffer();
        self.precalc.req_without_body = self.precalc.buffer - self.body_size;

        self
    }

    #[inline(always)]
    // First line + Header * N + "\r\n" + Body
    fn buffer(&self) -> usize {
        self.precalc.first_line + self.header_count * self.precalc.h_line + 2 + self.body_size
    }

    #[inline(always)]
    // First line HTTP response:
    // CONNECT /url/test HTTP/1.1\r\n
    // |-----| |-------| |------|
    //  Method    URl    Version
    //
    // Formula: Method(7) + " " + URl + " " + Version(8) + "\r\n"
    // In Code: 19 + url_size
    fn first_line(&self) -> usize {
        19 + self.url_size
    }

    #[inline(always)]
    // Header:
    // Authorization: Sample%20Data\r\n
    // |-----------|  |-----------|
    //     Name           Value
    //
    // Formula: Name + ": " + Value +  "\r\n"
    // In Code: 4 + header_name_size + header_value_size
    fn h_line(&self) -> usize {
        self.header_name_size + self.header_value_size + 4
    }
}

#[doc(hidden)]
#[derive(Debug, Clone, Default)]
pub struct ReqLimitsPrecalc {
    pub(crate) buffer: usize,
    pub(crate) first_line: usize,
    pub(crate) req_without_body: usize,
    pub(crate) h_line: usize,
}

/// Response buffer allocation: a buffer starts at `default_capacity` and is
/// reused (cleared, not reallocated) across invocations unless it grows past
/// `max_capacity`, in which case it is dropped and replaced at
/// `default_capacity` rather than kept oversized indefinitely.
#[derive(Debug, Clone)]
pub struct RespLimits {
    /// Initial buffer capacity allocated for responses (default: `1024 B`)
    pub default_capacity: usize,
    /// Maximum allowed buffer capacity for responses (default: `8192 B`)
    //
    // Note: If the response exceeds `max_capacity * 2`, it may be sent in 1 or more `syscall`
    pub max_capacity: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for RespLimits {
    fn default() -> Self {
        Self {
            default_capacity: 1024,
            max_capacity: 8 * 1024,

            _priv: (),
        }
    }
}
