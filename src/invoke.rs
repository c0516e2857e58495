//! The per-request child process invocation pipeline: the core of the
//! watchdog. Spawns one child per request, streams the body to its stdin,
//! collects its output, and enforces the hard execution deadline.

use crate::{config::Config, werror::InvokeError, Request};
use nix::{
    sys::signal::{killpg, Signal},
    unistd::Pid,
};
use serde::Serialize;
use std::{process::Stdio, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    process::{Child, Command},
    time::timeout,
};

/// The result of a single invocation, ready to be written onto an HTTP
/// [`Response`](crate::http::response::Response) by the caller.
pub struct InvokeOutcome {
    pub status: u16,
    /// Only populated when `combine_output = false` and the child emitted a
    /// leading header block (see [`split_headers`]).
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[derive(Serialize)]
struct MarshalEnvelope<'a> {
    method: &'a str,
    #[serde(rename = "contentLength")]
    content_length: usize,
    path: &'a str,
    query: &'a str,
    headers: std::collections::BTreeMap<String, Vec<String>>,
    body: String,
}

/// Runs one invocation of `config.fprocess` against `req`, end to end.
pub async fn invoke(config: &Config, req: &Request) -> InvokeOutcome {
    let body = req.body().unwrap_or(&[]).to_vec();

    let mut command = Command::new(&config.fprocess[0]);
    command
        .args(&config.fprocess[1..])
        .envs(cgi_env_vars(config, req))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(source) => {
            tracing::error!(error = %source, command = ?config.fprocess, "failed to spawn child");
            return outcome_for_spawn_error(InvokeError::Spawn {
                command: config.fprocess.join(" "),
                source,
            });
        }
    };

    let stdin_payload = if config.marshal_request {
        marshal_envelope(req, &body)
    } else {
        body
    };

    let run = run_to_completion(&mut child, stdin_payload, config.combine_output);

    let (stdout, stderr, exit_status) = if config.exec_timeout.is_zero() {
        run.await
    } else {
        match timeout(config.exec_timeout, run).await {
            Ok(result) => result,
            Err(_) => {
                kill_process_group(&child, SIGKILL_GRACE).await;
                let _ = child.wait().await;
                tracing::warn!(command = ?config.fprocess, timeout = ?config.exec_timeout, "invocation timed out");
                return InvokeOutcome {
                    status: 502,
                    headers: Vec::new(),
                    body: b"invocation timed out".to_vec(),
                };
            }
        }
    };

    if config.debug_headers || config.write_debug {
        tracing::debug!(bytes = stdout.len(), "captured child stdout");
    }
    if !stderr.is_empty() {
        tracing::warn!(stderr = %String::from_utf8_lossy(&stderr), "child wrote to stderr");
    }

    build_outcome(config, exit_status, stdout, stderr)
}

fn outcome_for_spawn_error(error: InvokeError) -> InvokeOutcome {
    InvokeOutcome {
        status: 500,
        headers: Vec::new(),
        body: error.to_string().into_bytes(),
    }
}

/// Drives stdin writing, stdout/stderr collection, and the exit-status wait
/// concurrently, as the invocation pipeline requires all three to complete
/// before a response can be shaped.
async fn run_to_completion(
    child: &mut Child,
    stdin_payload: Vec<u8>,
    combine_output: bool,
) -> (Vec<u8>, Vec<u8>, Option<i32>) {
    let mut stdin = child.stdin.take().expect("stdin was piped");
    let mut stdout = child.stdout.take().expect("stdout was piped");
    let mut stderr = child.stderr.take().expect("stderr was piped");

    let write_stdin = async move {
        if let Err(err) = stdin.write_all(&stdin_payload).await {
            tracing::warn!(error = %err, "writing request body to child stdin failed");
        }
        drop(stdin);
    };

    let read_stdout = async { read_to_end(&mut stdout).await };
    let read_stderr = async { read_to_end(&mut stderr).await };

    let (_, stdout_bytes, stderr_bytes, wait_result) =
        tokio::join!(write_stdin, read_stdout, read_stderr, child.wait());

    let exit_status = wait_result.ok().and_then(|s| s.code());

    if combine_output {
        let mut combined = stdout_bytes;
        combined.extend_from_slice(&stderr_bytes);
        (combined, Vec::new(), exit_status)
    } else {
        (stdout_bytes, stderr_bytes, exit_status)
    }
}

async fn read_to_end(reader: &mut (impl tokio::io::AsyncRead + Unpin)) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Err(err) = reader.read_to_end(&mut buf).await {
        tracing::warn!(error = %err, "reading child output failed");
    }
    buf
}

/// Grace period between `SIGTERM` and the follow-up `SIGKILL` on a timed-out
/// invocation, long enough for a cooperative child to flush and exit on its
/// own rather than being killed mid-write.
const SIGKILL_GRACE: Duration = Duration::from_secs(5);

async fn kill_process_group(child: &Child, grace: Duration) {
    let Some(pid) = child.id() else { return };
    let pgid = Pid::from_raw(pid as i32);

    if killpg(pgid, Signal::SIGTERM).is_err() {
        return;
    }
    tokio::time::sleep(grace).await;
    let _ = killpg(pgid, Signal::SIGKILL);
}

fn build_outcome(
    config: &Config,
    exit_status: Option<i32>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
) -> InvokeOutcome {
    let succeeded = exit_status == Some(0);

    if config.combine_output {
        // Documented quirk: combine_output always reports 200, even on a
        // non-zero exit, because the exit code is invisible once stdout and
        // stderr have been merged into a single undifferentiated stream.
        let (headers, body) = extract_headers_if_enabled(config, stdout);
        return InvokeOutcome {
            status: 200,
            headers,
            body,
        };
    }

    if !succeeded {
        return InvokeOutcome {
            status: 500,
            headers: Vec::new(),
            body: stderr,
        };
    }

    let (headers, body) = extract_headers_if_enabled(config, stdout);
    InvokeOutcome {
        status: 200,
        headers,
        body,
    }
}

fn extract_headers_if_enabled(config: &Config, stdout: Vec<u8>) -> (Vec<(String, String)>, Vec<u8>) {
    if config.combine_output {
        return (Vec::new(), stdout);
    }
    split_headers(stdout)
}

/// Splits a leading `Name: Value\r\n` header block off of `raw`, terminated
/// by a blank line. Lenient by design: a body with no blank-line terminator
/// is treated as having no headers at all, never as a parse failure.
fn split_headers(raw: Vec<u8>) -> (Vec<(String, String)>, Vec<u8>) {
    let separator = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| (pos, 4))
        .or_else(|| raw.windows(2).position(|w| w == b"\n\n").map(|pos| (pos, 2)));

    let Some((pos, sep_len)) = separator else {
        return (Vec::new(), raw);
    };

    let header_block = &raw[..pos];
    let body = raw[pos + sep_len..].to_vec();

    let mut headers = Vec::new();
    for line in header_block.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if let Some(colon) = line.iter().position(|&b| b == b':') {
            let name = String::from_utf8_lossy(&line[..colon]).trim().to_string();
            let value = String::from_utf8_lossy(&line[colon + 1..]).trim().to_string();
            if !name.is_empty() {
                headers.push((name, value));
            }
        }
    }

    (headers, body)
}

fn marshal_envelope(req: &Request, body: &[u8]) -> Vec<u8> {
    let mut headers: std::collections::BTreeMap<String, Vec<String>> = Default::default();
    for (name, value) in req.headers() {
        headers
            .entry(String::from_utf8_lossy(name).to_string())
            .or_default()
            .push(String::from_utf8_lossy(value).to_string());
    }

    let query = req
        .url()
        .query_full()
        .map(strip_leading_question_mark)
        .unwrap_or("");

    let envelope = MarshalEnvelope {
        method: req.method().as_str(),
        content_length: body.len(),
        path: simdutf8::basic::from_utf8(req.url().path()).unwrap_or(""),
        query,
        headers,
        body: String::from_utf8_lossy(body).to_string(),
    };

    serde_json::to_vec(&envelope).unwrap_or_default()
}

/// Builds the `Http_*` environment variables a child process sees, per the
/// CGI-style header propagation contract.
fn cgi_env_vars(config: &Config, req: &Request) -> Vec<(String, String)> {
    let mut vars = vec![
        ("Http_Method".to_string(), req.method().as_str().to_string()),
        (
            "Http_ContentLength".to_string(),
            req.content_length().unwrap_or(0).to_string(),
        ),
        (
            "Http_Path".to_string(),
            String::from_utf8_lossy(req.url().path()).to_string(),
        ),
    ];

    if let Some(query) = req.url().query_full() {
        if !query.is_empty() {
            vars.push(("Http_Query".to_string(), strip_leading_question_mark(query).to_string()));
        }
    }

    if let Some(te) = req.header(b"transfer-encoding") {
        vars.push((
            "Http_Transfer_Encoding".to_string(),
            String::from_utf8_lossy(te).to_string(),
        ));
    }

    if config.cgi_headers {
        for (name, value) in req.headers() {
            vars.push((cgi_var_name(name), String::from_utf8_lossy(value).to_string()));
        }
    }

    vars
}

fn cgi_var_name(header_name: &[u8]) -> String {
    let mut out = String::from("Http_");
    for (i, segment) in header_name.split(|&b| b == b'-').enumerate() {
        if i > 0 {
            out.push('_');
        }
        for (j, &byte) in segment.iter().enumerate() {
            let byte = if j == 0 {
                byte.to_ascii_uppercase()
            } else {
                byte.to_ascii_lowercase()
            };
            out.push(byte as char);
        }
    }
    out
}

fn strip_leading_question_mark(raw: &[u8]) -> &str {
    let raw = raw.strip_prefix(b"?").unwrap_or(raw);
    std::str::from_utf8(raw).unwrap_or("")
}
