use parking_lot::Mutex;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, Protocol};
use crate::engine::dispatch::{Dispatch, Reply};
use crate::engine::receiver::{Receiver, spawn_receiver};
use crate::engine::session::{Session, SessionEnd};
use crate::error::PingError;
use crate::probe::{IcmpTransport, Transport, get_identifier};
use crate::state::Report;

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Unstarted,
    Running,
    Stopped,
}

/// Lifecycle fields guarded together so state transitions are atomic
struct Inner {
    state: State,
    transport: Option<Arc<dyn Transport>>,
    lifetime: Option<CancellationToken>,
    receiver: Option<std::thread::JoinHandle<()>>,
}

/// A concurrent ping engine: one shared socket, any number of sessions.
///
/// `start` opens the socket and launches the receive loop; after that,
/// [`ping`](Pinger::ping) may be called from any number of tasks
/// concurrently, each running its own session against its own target.
/// Replies are routed back to the session that sent the matching request by
/// the tag embedded in every echo payload.
pub struct Pinger {
    protocol: Protocol,
    config: Config,
    identifier: u16,
    dispatch: Dispatch,
    inner: Mutex<Inner>,
}

impl Pinger {
    /// Engine for the given protocol family with default configuration.
    pub fn new(protocol: Protocol) -> Self {
        Self::with_config(protocol, Config::default())
    }

    pub fn with_config(protocol: Protocol, config: Config) -> Self {
        Self {
            protocol,
            config,
            identifier: get_identifier(),
            dispatch: Dispatch::new(),
            inner: Mutex::new(Inner {
                state: State::Unstarted,
                transport: None,
                lifetime: None,
                receiver: None,
            }),
        }
    }

    /// IPv4 engine with defaults.
    pub fn v4() -> Self {
        Self::new(Protocol::V4)
    }

    /// IPv6 engine with defaults.
    pub fn v6() -> Self {
        Self::new(Protocol::V6)
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Open the ICMP socket and launch the receive loop.
    ///
    /// The engine runs until `stop`, or until `cancel` is canceled. Fails
    /// with the underlying socket error when the transport cannot be opened
    /// (typically insufficient privilege), leaving the engine unstarted.
    pub fn start(&self, cancel: &CancellationToken) -> Result<(), PingError> {
        let mut inner = self.inner.lock();
        if inner.state == State::Running {
            return Err(PingError::AlreadyStarted);
        }

        let transport = Arc::new(IcmpTransport::open(
            self.protocol,
            self.config.read_timeout,
        )?);
        self.launch(&mut inner, cancel, transport);
        Ok(())
    }

    /// Launch the engine over a caller-supplied transport.
    ///
    /// This is the collaborator seam: anything implementing [`Transport`]
    /// will do, including the in-memory mock used by the tests.
    pub fn start_with_transport(
        &self,
        cancel: &CancellationToken,
        transport: Arc<dyn Transport>,
    ) -> Result<(), PingError> {
        let mut inner = self.inner.lock();
        if inner.state == State::Running {
            return Err(PingError::AlreadyStarted);
        }

        self.launch(&mut inner, cancel, transport);
        Ok(())
    }

    fn launch(&self, inner: &mut Inner, cancel: &CancellationToken, transport: Arc<dyn Transport>) {
        let lifetime = cancel.child_token();
        let receiver = Receiver::new(
            transport.clone(),
            self.dispatch.clone(),
            lifetime.clone(),
            self.protocol,
        );

        inner.receiver = Some(spawn_receiver(receiver));
        inner.transport = Some(transport);
        inner.lifetime = Some(lifetime);
        inner.state = State::Running;
    }

    /// Tear down the receive loop and release the transport. Idempotent;
    /// subsequent `ping` calls fail with `NotStarted` until a new `start`.
    pub fn stop(&self) {
        let (lifetime, receiver) = {
            let mut inner = self.inner.lock();
            if inner.state != State::Running {
                return;
            }
            inner.state = State::Stopped;
            inner.transport = None;
            (inner.lifetime.take(), inner.receiver.take())
        };

        if let Some(lifetime) = lifetime {
            lifetime.cancel();
        }
        if let Some(handle) = receiver {
            let _ = handle.join();
        }
    }

    /// Run one ping session: `count` probes to `target`, waiting up to
    /// `interval` for each reply.
    ///
    /// Safe to call from many tasks concurrently; sessions never observe
    /// each other's replies. Cancellation (of `cancel`, or of the engine
    /// itself) stops the sequence early and returns
    /// [`PingError::Canceled`] carrying the statistics accumulated so far.
    pub async fn ping(
        &self,
        cancel: &CancellationToken,
        target: IpAddr,
        count: u32,
        interval: Duration,
    ) -> Result<Report, PingError> {
        if count == 0 {
            return Err(PingError::InvalidCount(count));
        }
        if !self.protocol.matches(&target) {
            return Err(PingError::FamilyMismatch {
                target,
                protocol: self.protocol,
            });
        }

        // Snapshot the running engine; the lock is never held across an await
        let (transport, lifetime) = {
            let inner = self.inner.lock();
            match (inner.state, &inner.transport, &inner.lifetime) {
                (State::Running, Some(transport), Some(lifetime)) => {
                    (transport.clone(), lifetime.clone())
                }
                _ => return Err(PingError::NotStarted),
            }
        };

        let (probe_id, rx) = self.register()?;
        let mut report = Report::new(target, count as u64);

        let session = Session {
            transport,
            protocol: self.protocol,
            identifier: self.identifier,
            probe_id,
            target,
            count,
            interval,
            payload_size: self.config.effective_payload_size(),
            rx,
        };
        let end = session.run(cancel, &lifetime, &mut report).await;

        self.dispatch.unregister(probe_id);
        report.finalize();

        match end {
            SessionEnd::Completed => Ok(report),
            SessionEnd::Canceled => Err(PingError::Canceled { partial: report }),
        }
    }

    /// Allocate a probe id unique among live sessions.
    fn register(&self) -> Result<(u32, mpsc::Receiver<Reply>), PingError> {
        for _ in 0..self.config.register_attempts {
            let probe_id: u32 = rand::random();
            match self.dispatch.register(probe_id) {
                Ok(rx) => return Ok((probe_id, rx)),
                Err(PingError::DuplicateProbe(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(PingError::Exhausted)
    }
}

impl Drop for Pinger {
    fn drop(&mut self) {
        // Unblock the receiver thread; no join, drop must not stall
        if let Some(lifetime) = self.inner.get_mut().lifetime.take() {
            lifetime.cancel();
        }
    }
}
