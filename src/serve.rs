//! Development server.
//!
//! A `tiny_http` server answering every request through the dev middleware
//! chain. The server is started once, after the first successful dev build,
//! from a "create if absent" slot held by the build orchestrator.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌──────────────────┐
//! │   Main Thread   │     │  Server Thread   │     │  Watcher Thread  │
//! │ (initial build) │     │  (HTTP requests) │     │  (File Monitor)  │
//! └────────┬────────┘     └────────┬─────────┘     └────────┬─────────┘
//!          │                       │                        │
//!          ▼                       ▼                        ▼
//!   start server once      MiddlewareChain           full rebuilds
//!   wait for Ctrl+C        (url map → bundler)      (serialized)
//! ```

use crate::{
    config::ServeConfig,
    log,
    middleware::{DevRequest, DevResponse, MiddlewareChain},
};
use anyhow::{Context, Result, anyhow};
use parking_lot::Mutex;
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    thread::JoinHandle,
};
use tiny_http::{Header, Request, Response, Server};

/// Try binding to port, retry with incremented port if in use
const MAX_PORT_RETRIES: u16 = 10;

// ============================================================================
// Create-once slot
// ============================================================================

/// A value created on first need and never recreated.
#[derive(Debug)]
pub struct CreateOnce<T> {
    slot: Mutex<Option<T>>,
}

impl<T> Default for CreateOnce<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

impl<T> CreateOnce<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `init` if the slot is empty. Returns `true` when it created the value.
    ///
    /// A failed `init` leaves the slot empty so a later call can retry.
    pub fn get_or_try_init(&self, init: impl FnOnce() -> Result<T>) -> Result<bool> {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return Ok(false);
        }
        *slot = Some(init()?);
        Ok(true)
    }

    #[cfg(test)]
    pub fn is_initialized(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Apply `f` to the value, if created.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.slot.lock().as_ref().map(f)
    }
}

// ============================================================================
// Server session
// ============================================================================

/// A running dev server.
pub struct DevSession {
    server: Option<Arc<Server>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl DevSession {
    /// A session with no socket behind it.
    #[cfg(test)]
    pub fn detached() -> Self {
        Self {
            server: None,
            thread: Mutex::new(None),
        }
    }

    /// Take the server thread handle so a caller can join it without
    /// holding the session's slot.
    pub fn take_thread(&self) -> Option<JoinHandle<()>> {
        self.thread.lock().take()
    }
}

impl Drop for DevSession {
    fn drop(&mut self) {
        if let Some(server) = &self.server {
            server.unblock();
        }
    }
}

/// Bind the dev server and serve `chain` on a background thread.
///
/// Ctrl+C unblocks the server, which ends the thread.
pub fn start_dev_server(config: &ServeConfig, chain: MiddlewareChain) -> Result<DevSession> {
    let interface: IpAddr = config
        .interface
        .parse()
        .with_context(|| format!("Invalid [serve.interface] `{}`", config.interface))?;
    let (server, addr) = try_bind_port(interface, config.port, MAX_PORT_RETRIES)?;
    let server = Arc::new(server);

    let server_for_signal = Arc::clone(&server);
    ctrlc::set_handler(move || {
        log!("serve"; "shutting down...");
        server_for_signal.unblock();
    })
    .context("Failed to set Ctrl+C handler")?;

    let server_for_thread = Arc::clone(&server);
    let thread = std::thread::Builder::new()
        .name("isle-serve".into())
        .spawn(move || {
            for request in server_for_thread.incoming_requests() {
                if let Err(e) = handle_request(request, &chain) {
                    log!("serve"; "request error: {e}");
                }
            }
        })
        .context("Failed to spawn server thread")?;

    log!("serve"; "http://{}", addr);
    Ok(DevSession {
        server: Some(server),
        thread: Mutex::new(Some(thread)),
    })
}

/// Try to bind to a port, retrying with incremented port numbers if in use.
fn try_bind_port(interface: IpAddr, base_port: u16, max_retries: u16) -> Result<(Server, SocketAddr)> {
    let mut last_error = None;
    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                return Ok((server, addr));
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(anyhow!(
        "Failed to bind after {} attempts (ports {}-{}): {}",
        max_retries,
        base_port,
        base_port.saturating_add(max_retries.saturating_sub(1)),
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}

/// Answer one request through the middleware chain.
fn handle_request(request: Request, chain: &MiddlewareChain) -> Result<()> {
    let dev_request = DevRequest {
        method: request.method().as_str().to_owned(),
        url: request.url().to_owned(),
    };
    let DevResponse {
        status,
        content_type,
        body,
    } = chain.handle(&dev_request);

    let header = Header::from_bytes("Content-Type", content_type)
        .map_err(|()| anyhow!("invalid content type `{content_type}`"))?;
    let response = Response::from_data(body)
        .with_status_code(status)
        .with_header(header);

    request.respond(response)?;
    Ok(())
}
