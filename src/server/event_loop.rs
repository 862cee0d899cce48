//! The Event Loop
//!
//! One thread, one readiness poll, no locks around the registry. Each call
//! to [`EventLoop::run_once`] is one iteration:
//!
//! 1. **Throttle.** Sleep `tick_interval` (or `idle_tick_interval` with no
//!    clients). Returns early if shutdown was requested.
//! 2. **Evict.** Close every client whose age since accept has reached
//!    `idle_timeout`. Age is measured from accept, not from last activity.
//! 3. **Poll.** Wait up to `poll_timeout` for the listener or any client to
//!    become readable. A timeout just ends the iteration.
//! 4. **Accept.** If the listener is ready, accept exactly one connection.
//!    A burst of N connects therefore takes at least N iterations.
//! 5. **Dispatch.** Hand every other ready client to the [`Handler`].
//!
//! ## Readiness
//!
//! mio is edge-triggered. Before each poll the listener and every client are
//! re-registered, which re-arms them and gives level-triggered behaviour:
//! a listener with connections still queued, or a client with unread bytes,
//! is reported again on the next iteration.
//!
//! ## Failures
//!
//! Handler errors are classified. Transient kinds close that one connection.
//! An unclassified failure is reported and, under
//! [`FaultPolicy::StopServer`], ends the run: the rest of the tick is
//! skipped and the server is stopped through the same path as a signal.

use crate::config::{FaultPolicy, ServerConfig};
use crate::connection::{
    classify, classify_io, ConnectionRecord, ConnectionRegistry, ConnectionStats, FailureKind,
    Handler, LISTENER_TOKEN, WAKER_TOKEN,
};
use crate::error::{ServerError, ServerResult, SetupStage};
use crate::metrics::TimerMetrics;
use crate::server::listener::bind_listener;
use crate::server::shutdown::{ShutdownController, ShutdownHandle};
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, error, info, trace};

/// Timer covering `run()` from start to stop.
pub const SERVE_TIMER: &str = "server.serve";

/// Timer covering each handler call.
pub const DISPATCH_TIMER: &str = "client.dispatch";

/// Lifecycle state of an [`EventLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Constructed, no socket yet
    Idle,
    /// Listening socket bound, loop not started
    Listening,
    /// Inside `run()`
    Running,
    /// Sockets closed; terminal
    Stopped,
}

/// What happened during one iteration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// A connection was accepted
    pub accepted: bool,
    /// Handler invocations
    pub dispatched: usize,
    /// Connections closed, including evictions
    pub closed: usize,
    /// Connections evicted for age
    pub evicted: usize,
    /// The poll returned with nothing ready
    pub timed_out: bool,
    /// Shutdown was observed and the iteration ended early
    pub interrupted: bool,
}

enum Dispatch {
    Skipped,
    Kept,
    Closed,
}

/// A single-threaded TCP connection server.
pub struct EventLoop<H: Handler> {
    /// Fixed at construction
    config: ServerConfig,

    state: LoopState,

    poll: Poll,
    events: Events,

    /// `None` before listening and after stop
    listener: Option<TcpListener>,
    local_addr: Option<SocketAddr>,

    registry: ConnectionRegistry<H::State>,
    handler: H,

    metrics: TimerMetrics,
    stats: Arc<ConnectionStats>,
    shutdown: ShutdownController,
}

impl<H: Handler> EventLoop<H> {
    /// Creates a loop in the [`LoopState::Idle`] state.
    ///
    /// The configuration is moved in and cannot change afterwards.
    pub fn new(config: ServerConfig, handler: H, metrics: TimerMetrics) -> ServerResult<Self> {
        let poll = Poll::new()?;
        let shutdown = ShutdownController::new(poll.registry())?;
        let events = Events::with_capacity(config.events_capacity.max(1));

        Ok(Self {
            config,
            state: LoopState::Idle,
            poll,
            events,
            listener: None,
            local_addr: None,
            registry: ConnectionRegistry::new(),
            handler,
            metrics,
            stats: Arc::new(ConnectionStats::new()),
            shutdown,
        })
    }

    /// Creates, binds, and registers the listening socket.
    ///
    /// Returns the bound address (useful with port 0).
    pub fn start_listening(&mut self) -> ServerResult<SocketAddr> {
        self.expect_state(LoopState::Idle)?;

        let std_listener = bind_listener(&self.config)?;
        let local_addr = std_listener
            .local_addr()
            .map_err(|e| ServerError::setup(SetupStage::Listen, e))?;

        let mut listener = TcpListener::from_std(std_listener);
        self.poll
            .registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)
            .map_err(|e| ServerError::setup(SetupStage::Register, e))?;

        self.listener = Some(listener);
        self.local_addr = Some(local_addr);
        self.state = LoopState::Listening;

        info!(
            address = %local_addr,
            socket_kind = %self.config.socket_kind,
            protocol = %self.config.protocol,
            "Listening for connections"
        );

        Ok(local_addr)
    }

    /// Runs iterations until shutdown is requested or a fault stops the
    /// server, then closes everything.
    ///
    /// Returns `Ok(())` after a requested shutdown, or the error that
    /// stopped the server.
    pub fn run(&mut self) -> ServerResult<()> {
        self.expect_state(LoopState::Listening)?;
        self.state = LoopState::Running;
        self.metrics.start_timer(SERVE_TIMER);

        info!(
            port = self.port(),
            idle_timeout_secs = self.config.idle_timeout.as_secs_f64(),
            poll_timeout_ms = self.config.poll_timeout.as_millis() as u64,
            fault_policy = %self.config.fault_policy,
            "Event loop running"
        );

        let outcome = loop {
            if self.shutdown.is_requested() {
                info!(clients = self.registry.len(), "Shutdown requested");
                break Ok(());
            }
            if let Err(e) = self.run_once() {
                break Err(e);
            }
        };

        if let Err(e) = &outcome {
            // Dispatch already reported unclassified handler failures
            if !matches!(e, ServerError::Unclassified { .. }) {
                self.report(FailureKind::Other, &e.to_string(), "event loop");
            }
        }

        self.stop();
        outcome
    }

    /// Runs a single iteration.
    pub fn run_once(&mut self) -> ServerResult<TickReport> {
        match self.state {
            LoopState::Listening | LoopState::Running => {}
            actual => {
                return Err(ServerError::InvalidState {
                    expected: LoopState::Running,
                    actual,
                })
            }
        }

        let mut report = TickReport::default();

        let pause = if self.registry.is_empty() {
            self.config.idle_tick_interval
        } else {
            self.config.tick_interval
        };
        if self.shutdown.throttle(pause) {
            report.interrupted = true;
            return Ok(report);
        }

        report.evicted = self.evict_idle(SystemTime::now());
        report.closed += report.evicted;

        self.rearm();
        match self
            .poll
            .poll(&mut self.events, Some(self.config.poll_timeout))
        {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                report.timed_out = true;
                return Ok(report);
            }
            Err(e) => return Err(e.into()),
        }

        if self.shutdown.is_requested() {
            report.interrupted = true;
            return Ok(report);
        }

        let mut listener_ready = false;
        let mut ready = Vec::new();
        for event in self.events.iter() {
            match event.token() {
                LISTENER_TOKEN => listener_ready = true,
                WAKER_TOKEN => {}
                token => ready.push(token),
            }
        }

        if !listener_ready && ready.is_empty() {
            report.timed_out = true;
            return Ok(report);
        }

        if listener_ready {
            report.accepted = self.accept_one()?;
        }

        for token in ready {
            match self.dispatch(token)? {
                Dispatch::Skipped => {}
                Dispatch::Kept => report.dispatched += 1,
                Dispatch::Closed => {
                    report.dispatched += 1;
                    report.closed += 1;
                }
            }
        }

        trace!(?report, clients = self.registry.len(), "Tick complete");
        Ok(report)
    }

    /// Closes every client whose age at `now` has reached the idle timeout.
    ///
    /// Returns the number of connections evicted.
    pub fn evict_idle(&mut self, now: SystemTime) -> usize {
        let timeout = self.config.idle_timeout;
        let mut evicted = 0;

        for token in self.registry.idle_tokens(now, timeout) {
            if let Some(record) = self.registry.get(token) {
                info!(
                    port = self.port(),
                    client = %record.peer_addr(),
                    idle_timeout_secs = timeout.as_secs_f64(),
                    elapsed_secs = record.elapsed(now).as_secs_f64(),
                    "Evicting idle connection"
                );
            }
            if self.close_connection(token, "idle timeout") {
                self.stats.connection_evicted();
                evicted += 1;
            }
        }

        evicted
    }

    /// Closes all clients and the listener. Calling it again does nothing.
    pub fn stop(&mut self) {
        if self.state == LoopState::Stopped {
            return;
        }

        let records = self.registry.drain();
        let clients = records.len();
        for record in records {
            record.close(self.poll.registry());
            self.stats.connection_closed();
        }

        if let Some(mut listener) = self.listener.take() {
            if let Err(e) = self.poll.registry().deregister(&mut listener) {
                trace!(error = %e, "Deregister listener failed");
            }
        }

        self.state = LoopState::Stopped;
        let served = self.metrics.end_timer(SERVE_TIMER);

        info!(
            closed_clients = clients,
            served_secs = served.as_secs_f64(),
            "Event loop stopped"
        );
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// The bound address, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Whether the listening socket is open.
    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    pub fn registry(&self) -> &ConnectionRegistry<H::State> {
        &self.registry
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn metrics(&self) -> &TimerMetrics {
        &self.metrics
    }

    pub fn metrics_mut(&mut self) -> &mut TimerMetrics {
        &mut self.metrics
    }

    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    pub fn shutdown_controller(&self) -> &ShutdownController {
        &self.shutdown
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.handle()
    }

    fn expect_state(&self, expected: LoopState) -> ServerResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ServerError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    fn port(&self) -> u16 {
        self.local_addr
            .map(|addr| addr.port())
            .unwrap_or(self.config.port)
    }

    /// Re-registers the listener and every client so the coming poll
    /// reports current readiness.
    fn rearm(&mut self) {
        let poll_registry = self.poll.registry();

        if let Some(listener) = self.listener.as_mut() {
            if let Err(e) = poll_registry.reregister(listener, LISTENER_TOKEN, Interest::READABLE) {
                debug!(error = %e, "Failed to re-arm listener");
            }
        }

        let mut broken = Vec::new();
        for record in self.registry.iter_mut() {
            let token = record.token();
            if let Err(e) = poll_registry.reregister(record.stream_mut(), token, Interest::READABLE) {
                debug!(token = token.0, error = %e, "Failed to re-arm connection");
                broken.push(token);
            }
        }

        for token in broken {
            self.close_connection(token, "re-arm failed");
        }
    }

    /// Accepts at most one pending connection.
    fn accept_one(&mut self) -> ServerResult<bool> {
        let Some(listener) = self.listener.as_ref() else {
            return Ok(false);
        };

        let (mut stream, peer) = match listener.accept() {
            Ok(pair) => pair,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(false),
            Err(e) => {
                let kind = classify_io(&e);
                if kind.is_transient() {
                    self.stats.transient_failure();
                    debug!(kind = %kind, error = %e, "Transient accept failure");
                    return Ok(false);
                }
                return Err(e.into());
            }
        };

        let token = self.registry.allocate_token();
        self.poll
            .registry()
            .register(&mut stream, token, Interest::READABLE)?;

        let record = ConnectionRecord::new(token, stream, peer, SystemTime::now());
        self.registry.insert(record)?;
        self.stats.connection_opened();

        debug!(
            client = %peer,
            token = token.0,
            clients = self.registry.len(),
            "Accepted connection"
        );

        Ok(true)
    }

    /// Invokes the handler for one ready client.
    fn dispatch(&mut self, token: Token) -> ServerResult<Dispatch> {
        let Some(record) = self.registry.get_mut(token) else {
            trace!(token = token.0, "Ready socket no longer registered");
            return Ok(Dispatch::Skipped);
        };
        let peer = record.peer_addr();

        self.metrics.start_timer(DISPATCH_TIMER);
        let result = self.handler.process(record);
        self.metrics.end_timer(DISPATCH_TIMER);
        self.stats.dispatched();

        let err = match result {
            Ok(true) => return Ok(Dispatch::Kept),
            Ok(false) => {
                self.close_connection(token, "handler requested close");
                return Ok(Dispatch::Closed);
            }
            Err(err) => err,
        };

        let kind = classify(&err);
        if kind.is_transient() {
            self.stats.transient_failure();
            debug!(client = %peer, token = token.0, kind = %kind, error = %err, "Transient connection failure");
            self.close_connection(token, "transient failure");
            return Ok(Dispatch::Closed);
        }

        let location = format!("connection {} ({})", token.0, peer);
        self.report(kind, &err.to_string(), &location);

        match self.config.fault_policy {
            FaultPolicy::CloseConnection => {
                self.close_connection(token, "unclassified failure");
                Ok(Dispatch::Closed)
            }
            FaultPolicy::StopServer => Err(ServerError::Unclassified {
                token,
                peer,
                message: err.to_string(),
            }),
        }
    }

    /// Removes and closes one client. Returns `false` if it was not registered.
    fn close_connection(&mut self, token: Token, reason: &str) -> bool {
        let Some(record) = self.registry.remove(token) else {
            return false;
        };

        let peer = record.peer_addr();
        record.close(self.poll.registry());
        self.stats.connection_closed();

        debug!(
            client = %peer,
            token = token.0,
            reason,
            clients = self.registry.len(),
            "Closed connection"
        );
        true
    }

    fn report(&self, kind: FailureKind, message: &str, location: &str) {
        self.stats.reported_failure();
        error!(
            port = self.port(),
            socket_kind = %self.config.socket_kind,
            protocol = %self.config.protocol,
            clients = self.registry.len(),
            kind = %kind,
            error = %message,
            location,
            "Server failure"
        );
    }
}

impl<H: Handler> Drop for EventLoop<H> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::HandlerError;
    use std::collections::HashSet;
    use std::io::{Read, Write};
    use std::net::{Ipv4Addr, TcpStream};
    use std::sync::atomic::Ordering;
    use std::thread;
    use std::time::{Duration, Instant};

    /// Drains whatever is readable, counts calls in its state.
    struct CountingHandler;

    impl Handler for CountingHandler {
        type State = u32;

        fn process(&mut self, conn: &mut ConnectionRecord<u32>) -> Result<bool, HandlerError> {
            let mut buf = [0u8; 1024];
            match conn.stream_mut().read(&mut buf) {
                Ok(0) => return Ok(false),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e.into()),
            }
            *conn.state_mut() += 1;
            Ok(true)
        }
    }

    /// Drains the socket, then asks for the connection to be closed.
    struct ClosingHandler;

    impl Handler for ClosingHandler {
        type State = ();

        fn process(&mut self, conn: &mut ConnectionRecord<()>) -> Result<bool, HandlerError> {
            let mut buf = [0u8; 1024];
            let _ = conn.stream_mut().read(&mut buf);
            Ok(false)
        }
    }

    /// Always fails with the error produced by `make`.
    struct FailingHandler {
        make: fn() -> HandlerError,
    }

    impl Handler for FailingHandler {
        type State = ();

        fn process(&mut self, _conn: &mut ConnectionRecord<()>) -> Result<bool, HandlerError> {
            Err((self.make)())
        }
    }

    fn test_config() -> ServerConfig {
        ServerConfig::new(0)
            .with_poll_timeout(Duration::from_millis(50))
            .with_tick_intervals(Duration::from_millis(1), Duration::from_millis(1))
    }

    fn listening<H: Handler>(handler: H, config: ServerConfig) -> (EventLoop<H>, SocketAddr) {
        let mut event_loop = EventLoop::new(config, handler, TimerMetrics::new()).unwrap();
        let bound = event_loop.start_listening().unwrap();
        (event_loop, SocketAddr::from((Ipv4Addr::LOCALHOST, bound.port())))
    }

    fn connect(addr: SocketAddr) -> TcpStream {
        let client = TcpStream::connect(addr).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        client
    }

    /// Ticks until `done` holds, up to a bounded number of iterations.
    fn tick_until<H: Handler>(
        event_loop: &mut EventLoop<H>,
        mut done: impl FnMut(&EventLoop<H>) -> bool,
    ) -> bool {
        for _ in 0..200 {
            if done(event_loop) {
                return true;
            }
            event_loop.run_once().unwrap();
        }
        done(event_loop)
    }

    #[test]
    fn test_lifecycle_states() {
        let mut event_loop =
            EventLoop::new(test_config(), CountingHandler, TimerMetrics::new()).unwrap();
        assert_eq!(event_loop.state(), LoopState::Idle);
        assert!(!event_loop.is_listening());

        assert!(matches!(
            event_loop.run(),
            Err(ServerError::InvalidState {
                expected: LoopState::Listening,
                actual: LoopState::Idle
            })
        ));
        assert!(event_loop.run_once().is_err());

        event_loop.start_listening().unwrap();
        assert_eq!(event_loop.state(), LoopState::Listening);
        assert!(event_loop.is_listening());
        assert!(event_loop.local_addr().is_some());
        assert!(event_loop.start_listening().is_err());

        event_loop.stop();
        assert_eq!(event_loop.state(), LoopState::Stopped);
        assert!(!event_loop.is_listening());
        assert!(event_loop.run_once().is_err());
    }

    #[test]
    fn test_empty_tick_times_out() {
        let (mut event_loop, _addr) = listening(CountingHandler, test_config());

        let report = event_loop.run_once().unwrap();
        assert!(report.timed_out);
        assert!(!report.accepted);
        assert_eq!(report.dispatched, 0);
    }

    #[test]
    fn test_one_accept_per_iteration() {
        let (mut event_loop, addr) = listening(CountingHandler, test_config());

        let _clients: Vec<TcpStream> = (0..5).map(|_| connect(addr)).collect();
        thread::sleep(Duration::from_millis(100));

        let mut ticks = 0;
        while event_loop.registry().len() < 5 && ticks < 200 {
            let report = event_loop.run_once().unwrap();
            ticks += 1;
            assert!(event_loop.registry().len() <= ticks);
            if report.accepted {
                assert!(event_loop.stats().accepted() as usize <= ticks);
            }
        }

        assert_eq!(event_loop.registry().len(), 5);
        assert!(ticks >= 5);

        let tokens: HashSet<Token> = event_loop.registry().tokens().into_iter().collect();
        assert_eq!(tokens.len(), 5);
        assert!(!tokens.contains(&LISTENER_TOKEN));
        assert!(!tokens.contains(&WAKER_TOKEN));
    }

    #[test]
    fn test_handler_true_keeps_record() {
        let (mut event_loop, addr) = listening(CountingHandler, test_config());
        let mut client = connect(addr);

        assert!(tick_until(&mut event_loop, |el| el.registry().len() == 1));
        let token = event_loop.registry().tokens()[0];
        let connected_at = event_loop.registry().get(token).unwrap().connected_at();
        let peer = event_loop.registry().get(token).unwrap().peer_addr();

        client.write_all(b"ping").unwrap();
        assert!(tick_until(&mut event_loop, |el| {
            el.registry().get(token).map(|r| *r.state()).unwrap_or(0) >= 1
        }));

        let record = event_loop.registry().get(token).unwrap();
        assert_eq!(record.connected_at(), connected_at);
        assert_eq!(record.peer_addr(), peer);
        assert_eq!(event_loop.stats().closed(), 0);
    }

    #[test]
    fn test_handler_false_closes_connection() {
        let (mut event_loop, addr) = listening(ClosingHandler, test_config());
        let mut client = connect(addr);

        assert!(tick_until(&mut event_loop, |el| el.registry().len() == 1));
        client.write_all(b"bye").unwrap();
        assert!(tick_until(&mut event_loop, |el| el.registry().is_empty()));

        assert_eq!(event_loop.stats().closed(), 1);
        assert_eq!(event_loop.stats().active(), 0);

        let mut buf = [0u8; 8];
        assert_eq!(client.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_idle_eviction_at_timeout_boundary() {
        let config = test_config().with_idle_timeout(Duration::from_secs(10));
        let (mut event_loop, addr) = listening(CountingHandler, config);
        let _client = connect(addr);

        assert!(tick_until(&mut event_loop, |el| el.registry().len() == 1));
        let token = event_loop.registry().tokens()[0];
        let connected_at = event_loop.registry().get(token).unwrap().connected_at();

        assert_eq!(event_loop.evict_idle(connected_at + Duration::from_secs(9)), 0);
        assert_eq!(event_loop.registry().len(), 1);

        assert_eq!(
            event_loop.evict_idle(connected_at + Duration::from_secs(10)),
            1
        );
        assert!(event_loop.registry().is_empty());

        // A second pass finds nothing to close
        assert_eq!(
            event_loop.evict_idle(connected_at + Duration::from_secs(20)),
            0
        );
        assert_eq!(event_loop.stats().evicted(), 1);
        assert_eq!(event_loop.stats().closed(), 1);
    }

    #[test]
    fn test_idle_connection_evicted_on_tick() {
        let config = test_config().with_idle_timeout(Duration::from_millis(100));
        let (mut event_loop, addr) = listening(CountingHandler, config);
        let mut client = connect(addr);

        assert!(tick_until(&mut event_loop, |el| el.registry().len() == 1));
        thread::sleep(Duration::from_millis(150));

        let report = event_loop.run_once().unwrap();
        assert_eq!(report.evicted, 1);
        assert!(event_loop.registry().is_empty());

        let mut buf = [0u8; 8];
        assert_eq!(client.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_activity_does_not_extend_idle_deadline() {
        let timeout = Duration::from_millis(300);
        let config = test_config().with_idle_timeout(timeout);
        let (mut event_loop, addr) = listening(CountingHandler, config);
        let mut client = connect(addr);

        assert!(tick_until(&mut event_loop, |el| el.registry().len() == 1));
        let token = event_loop.registry().tokens()[0];
        let accepted = Instant::now();

        // Keep the connection busy right up to (and past) the deadline
        let mut served = 0;
        while event_loop.registry().contains(token) && accepted.elapsed() < Duration::from_secs(5)
        {
            client.write_all(b"x").unwrap();
            event_loop.run_once().unwrap();
            if let Some(record) = event_loop.registry().get(token) {
                served = *record.state();
            }
        }

        assert!(served > 0, "connection was never dispatched");
        assert!(!event_loop.registry().contains(token));
        assert_eq!(event_loop.stats().evicted(), 1);
        assert!(accepted.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_transient_failure_closes_only_connection() {
        let handler = FailingHandler {
            make: || HandlerError::Io(io::ErrorKind::ConnectionReset.into()),
        };
        let (mut event_loop, addr) = listening(handler, test_config());
        let mut client = connect(addr);

        assert!(tick_until(&mut event_loop, |el| el.registry().len() == 1));
        client.write_all(b"data").unwrap();
        assert!(tick_until(&mut event_loop, |el| el.registry().is_empty()));

        let stats = event_loop.stats();
        assert_eq!(stats.transient_failures.load(Ordering::Relaxed), 1);
        assert_eq!(stats.reported_failures.load(Ordering::Relaxed), 0);
        assert!(event_loop.is_listening());
        assert_eq!(event_loop.state(), LoopState::Listening);
    }

    #[test]
    fn test_unclassified_failure_stops_server() {
        let handler = FailingHandler {
            make: || HandlerError::Failed("corrupt frame".into()),
        };
        let (mut event_loop, addr) = listening(handler, test_config());
        let mut client = connect(addr);
        client.write_all(b"data").unwrap();

        // Bound the test if the fault never stops the loop
        let watchdog = event_loop.shutdown_handle();
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(10));
            watchdog.trigger();
        });

        let err = event_loop.run().unwrap_err();
        match err {
            ServerError::Unclassified { message, .. } => assert_eq!(message, "corrupt frame"),
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(event_loop.state(), LoopState::Stopped);
        assert!(event_loop.registry().is_empty());
        assert!(!event_loop.is_listening());
        assert_eq!(
            event_loop
                .stats()
                .reported_failures
                .load(Ordering::Relaxed),
            1
        );
    }

    #[test]
    fn test_close_connection_policy_keeps_serving() {
        let handler = FailingHandler {
            make: || HandlerError::Failed("corrupt frame".into()),
        };
        let config = test_config().with_fault_policy(FaultPolicy::CloseConnection);
        let (mut event_loop, addr) = listening(handler, config);
        let mut client = connect(addr);

        assert!(tick_until(&mut event_loop, |el| el.registry().len() == 1));
        client.write_all(b"data").unwrap();
        assert!(tick_until(&mut event_loop, |el| el.registry().is_empty()));

        assert!(event_loop.is_listening());
        assert_eq!(event_loop.stats().closed(), 1);

        // Still accepting
        let _second = connect(addr);
        assert!(tick_until(&mut event_loop, |el| el.registry().len() == 1));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut event_loop, addr) = listening(CountingHandler, test_config());
        let mut client = connect(addr);
        assert!(tick_until(&mut event_loop, |el| el.registry().len() == 1));

        event_loop.stop();
        assert!(event_loop.registry().is_empty());
        assert!(!event_loop.is_listening());
        assert_eq!(event_loop.stats().closed(), 1);

        event_loop.stop();
        assert_eq!(event_loop.state(), LoopState::Stopped);
        assert_eq!(event_loop.stats().closed(), 1);

        let mut buf = [0u8; 8];
        assert_eq!(client.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_shutdown_handle_interrupts_run() {
        let config = ServerConfig::new(0).with_poll_timeout(Duration::from_secs(5));
        let (mut event_loop, addr) = listening(CountingHandler, config);
        let _client = connect(addr);

        let handle = event_loop.shutdown_handle();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            handle.trigger();
        });

        let start = Instant::now();
        event_loop.run().unwrap();

        assert!(start.elapsed() < Duration::from_secs(4));
        assert_eq!(event_loop.state(), LoopState::Stopped);
        assert!(event_loop.registry().is_empty());
        assert_eq!(event_loop.metrics().stats(SERVE_TIMER).unwrap().count, 1);
    }

    #[test]
    fn test_dispatch_timer_tracks_handler_calls() {
        let (mut event_loop, addr) = listening(CountingHandler, test_config());
        let mut client = connect(addr);

        assert!(tick_until(&mut event_loop, |el| el.registry().len() == 1));
        client.write_all(b"one").unwrap();
        assert!(tick_until(&mut event_loop, |el| {
            el.metrics().stats(DISPATCH_TIMER).is_some()
        }));

        let dispatches = event_loop
            .stats()
            .dispatches
            .load(Ordering::Relaxed);
        assert_eq!(
            event_loop.metrics().stats(DISPATCH_TIMER).unwrap().count,
            dispatches
        );
    }
}
