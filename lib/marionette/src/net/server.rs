//! Non-blocking HTTP endpoint scheduled on the engine frame loop.
//!
//! Each `sync` accepts pending connections, polls every active connection
//! for readable bytes, advances request parsing, dispatches completed
//! requests, and pumps the cooperative tasks of suspended handlers. Nothing
//! here ever blocks the frame.

use crate::bridge::{BridgeCtx, Handler, Outcome};
use crate::error::{ErrorKind, NetError, NetResult};
use crate::net::buffer::Buffer;
use crate::net::http::{self, ParseOutcome, Request, Response, MAX_REQUEST_SIZE};
use crate::tasks::{Progress, Task};
use hashbrown::HashMap;
use indexmap::IndexSet;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use serde_json::json;
use std::io;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::time;
use strand::logging;

const LISTENER_TOKEN: Token = Token(0);
const ZERO_TIME: time::Duration = time::Duration::from_secs(0);

enum ConnState {
    Reading,
    Running(Task),
    Writing,
    Closed,
}

/// One accepted connection: accumulate → parse → dispatch → (maybe run) →
/// write → close. One request per connection.
struct Connection {
    stream: Option<TcpStream>,
    peer: Option<SocketAddr>,
    read_buffer: Buffer,
    write_buffer: Buffer,
    state: ConnState,
    created_at: time::Instant,
}

impl Connection {
    fn new() -> Connection {
        Connection {
            stream: None,
            peer: None,
            read_buffer: Buffer::new(MAX_REQUEST_SIZE),
            write_buffer: Buffer::new(usize::MAX),
            state: ConnState::Closed,
            created_at: time::Instant::now(),
        }
    }

    fn open(&mut self, stream: TcpStream, peer: SocketAddr, now: time::Instant) {
        self.stream = Some(stream);
        self.peer = Some(peer);
        self.read_buffer.clear();
        self.write_buffer.clear();
        self.state = ConnState::Reading;
        self.created_at = now;
    }

    /// Reads everything available. Returns (bytes, peer_closed).
    fn receive(&mut self) -> NetResult<(usize, bool)> {
        let stream = self.stream.as_mut().expect("Connection must have a stream");
        self.read_buffer.ingress(stream).map_err(|err| {
            if err.kind() == io::ErrorKind::Other {
                NetError::Fatal(ErrorKind::TooLarge)
            } else {
                err.into()
            }
        })
    }

    /// Flushes as much of the pending response as the socket accepts.
    fn send(&mut self) -> NetResult<usize> {
        let stream = self.stream.as_mut().expect("Connection must have a stream");
        self.write_buffer.egress(stream).map_err(Into::into)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
        }
        self.peer = None;
        self.read_buffer.clear();
        self.write_buffer.clear();
        self.state = ConnState::Closed;
    }
}

pub struct HttpServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    poll: Poll,
    events: Events,
    routes: HashMap<String, Handler>,
    conns: Vec<Connection>,
    free: Vec<usize>,
    live: IndexSet<usize>,
    log: logging::Logger,
}

impl HttpServer {
    /// Binds the endpoint. Port 0 binds ephemerally; `local_addr` reports
    /// the outcome.
    pub fn bind(host: &str, port: u16, log: &logging::Logger) -> NetResult<HttpServer> {
        let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
        let mut listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        Ok(HttpServer {
            listener,
            local_addr,
            poll,
            events: Events::with_capacity(128),
            routes: HashMap::new(),
            conns: Vec::new(),
            free: Vec::new(),
            live: IndexSet::new(),
            log: log.new(logging::o!()),
        })
    }

    #[inline]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Installs a handler under `"METHOD path"`.
    pub fn register(&mut self, method: &str, path: &str, handler: Handler) {
        self.routes.insert(format!("{} {}", method, path), handler);
    }

    /// One frame of endpoint work: accept, reap, pump.
    pub fn sync(&mut self, ctx: &mut BridgeCtx, now: time::Instant) {
        // Drain listener readiness; accepts below retry until WouldBlock
        // either way.
        self.poll
            .poll(&mut self.events, Some(ZERO_TIME))
            .unwrap_or_else(|err| panic!("Listen poll failed: {:?}", err));

        self.accept_pending(now);
        self.housekeeping(ctx, now);

        let slots: Vec<usize> = self.live.iter().copied().collect();
        for slot in slots {
            self.pump(slot, ctx);
        }
    }

    fn accept_pending(&mut self, now: time::Instant) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    // The protocol is tiny request/response pairs; never
                    // batch them behind Nagle.
                    drop(stream.set_nodelay(true));

                    let slot = match self.free.pop() {
                        Some(slot) => slot,
                        None => {
                            self.conns.push(Connection::new());
                            self.conns.len() - 1
                        }
                    };

                    self.conns[slot].open(stream, peer, now);
                    self.live.insert(slot);

                    logging::debug!(self.log, "connection accepted";
                                    "context" => "accept",
                                    "slot" => slot,
                                    "peer" => %peer);
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    logging::error!(self.log, "accept failed"; "context" => "accept", "error" => ?err);
                    break;
                }
            }
        }
    }

    /// Force-closes connections older than the configured socket timeout,
    /// whatever state they are in. A task dropped here simply never writes.
    fn housekeeping(&mut self, ctx: &BridgeCtx, now: time::Instant) {
        let timeout = time::Duration::from_secs(ctx.config.connection_timeout_secs);

        let stale: Vec<usize> = self
            .live
            .iter()
            .copied()
            .filter(|&slot| now.duration_since(self.conns[slot].created_at) >= timeout)
            .collect();

        for slot in stale {
            logging::debug!(self.log, "connection timed out";
                            "context" => "housekeeping",
                            "slot" => slot,
                            "peer" => ?self.conns[slot].peer);
            self.close(slot);
        }
    }

    fn pump(&mut self, slot: usize, ctx: &mut BridgeCtx) {
        // Suspended handler first: it may complete and move the connection
        // into the writing state this same frame.
        if matches!(self.conns[slot].state, ConnState::Running(_)) {
            self.advance_task(slot, ctx);
        }

        match self.conns[slot].state {
            ConnState::Reading => self.pump_read(slot, ctx),
            ConnState::Writing => self.pump_write(slot),
            _ => (),
        }
    }

    fn advance_task(&mut self, slot: usize, ctx: &mut BridgeCtx) {
        let mut task = match std::mem::replace(&mut self.conns[slot].state, ConnState::Reading) {
            ConnState::Running(task) => task,
            other => {
                self.conns[slot].state = other;
                return;
            }
        };

        let progress = panic::catch_unwind(AssertUnwindSafe(|| task.advance(ctx)));

        match progress {
            Ok(Progress::Pending) => self.conns[slot].state = ConnState::Running(task),
            Ok(Progress::Ready(reply)) => self.respond(slot, reply.into_response()),
            Err(payload) => self.respond(slot, internal_error(&panic_message(payload))),
        }
    }

    fn pump_read(&mut self, slot: usize, ctx: &mut BridgeCtx) {
        let received = self.conns[slot].receive();

        let closed = match received {
            Ok((_, closed)) => closed,
            Err(NetError::Wait) => false,
            Err(NetError::Fatal(ErrorKind::TooLarge)) => {
                self.respond(
                    slot,
                    Response::json(400, &json!({"error": "Request too large"})),
                );
                return;
            }
            Err(err) => {
                logging::debug!(self.log, "read failed, dropping connection";
                                "context" => "pump_read",
                                "slot" => slot,
                                "error" => ?err);
                self.close(slot);
                return;
            }
        };

        match http::try_parse(&mut self.conns[slot].read_buffer) {
            ParseOutcome::Complete(request) => self.dispatch(slot, request, ctx),
            ParseOutcome::BadRequest(message) => {
                self.respond(slot, Response::json(400, &json!({ "error": message })));
            }
            ParseOutcome::Incomplete => {
                if closed {
                    // Half-closed peer that never finished a request.
                    self.close(slot);
                }
            }
        }
    }

    fn dispatch(&mut self, slot: usize, request: Request, ctx: &mut BridgeCtx) {
        let key = format!("{} {}", request.method, request.path);

        logging::debug!(self.log, "dispatching request";
                        "context" => "dispatch",
                        "slot" => slot,
                        "route" => %key);

        if !self.routes.contains_key(&key) {
            self.respond(
                slot,
                Response::json(
                    404,
                    &json!({
                        "error": "No route for request",
                        "path": request.path,
                        "method": request.method,
                    }),
                ),
            );
            return;
        }

        let handler = self.routes.get(&key).expect("route checked above");

        // Handlers never raise across the HTTP boundary; a panic becomes a
        // structured 500 and the connection machinery stays intact.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(&request, ctx)));

        match outcome {
            Ok(Outcome::Reply(reply)) => self.respond(slot, reply.into_response()),
            Ok(Outcome::Task(mut task)) => {
                // Give the task its first advance immediately so conditions
                // that already hold answer within this frame.
                let progress = panic::catch_unwind(AssertUnwindSafe(|| task.advance(ctx)));
                match progress {
                    Ok(Progress::Pending) => self.conns[slot].state = ConnState::Running(task),
                    Ok(Progress::Ready(reply)) => self.respond(slot, reply.into_response()),
                    Err(payload) => self.respond(slot, internal_error(&panic_message(payload))),
                }
            }
            Err(payload) => self.respond(slot, internal_error(&panic_message(payload))),
        }
    }

    fn respond(&mut self, slot: usize, response: Response) {
        let encoded = response.encode();
        self.conns[slot].write_buffer.extend(&encoded);
        self.conns[slot].state = ConnState::Writing;
        self.pump_write(slot);
    }

    fn pump_write(&mut self, slot: usize) {
        match self.conns[slot].send() {
            Ok(_) => {
                if self.conns[slot].write_buffer.is_empty() {
                    self.close(slot);
                }
            }
            Err(NetError::Wait) => (),
            Err(err) => {
                // Dropped write; the client disconnected. Bridge state is
                // untouched.
                logging::debug!(self.log, "write failed, dropping response";
                                "context" => "pump_write",
                                "slot" => slot,
                                "error" => ?err);
                self.close(slot);
            }
        }
    }

    fn close(&mut self, slot: usize) {
        self.conns[slot].close();
        self.live.swap_remove(&slot);
        self.free.push(slot);

        logging::trace!(self.log, "connection closed"; "context" => "close", "slot" => slot);
    }
}

fn internal_error(message: &str) -> Response {
    Response::json(500, &json!({ "error": format!("Internal: {}", message) }))
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
