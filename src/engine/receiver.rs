use std::io;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::config::Protocol;
use crate::engine::dispatch::Dispatch;
use crate::probe::{Transport, parse_echo_reply};

/// Maximum consecutive errors before the receiver gives up on the socket
const MAX_CONSECUTIVE_ERRORS: u32 = 50;

/// Large enough for any echo reply this engine can provoke
const RECV_BUFFER_SIZE: usize = 1500;

/// The receiver reads inbound frames and routes echo replies to sessions.
///
/// Runs on a dedicated thread because the transport blocks; the short read
/// timeout bounds how long cancellation takes to observe.
pub(crate) struct Receiver {
    transport: Arc<dyn Transport>,
    dispatch: Dispatch,
    cancel: CancellationToken,
    protocol: Protocol,
    consecutive_errors: u32,
}

impl Receiver {
    pub fn new(
        transport: Arc<dyn Transport>,
        dispatch: Dispatch,
        cancel: CancellationToken,
        protocol: Protocol,
    ) -> Self {
        Self {
            transport,
            dispatch,
            cancel,
            protocol,
            consecutive_errors: 0,
        }
    }

    /// Run until canceled or the socket fails for good.
    ///
    /// Individual read errors and malformed frames are non-fatal; only a
    /// sustained error streak (socket closed, fd revoked) ends the loop, at
    /// which point the engine lifetime token is canceled so in-flight
    /// sessions resolve instead of hanging.
    fn run_blocking(mut self) {
        let includes_ip_header = self.transport.includes_ip_header();
        let mut buffer = [0u8; RECV_BUFFER_SIZE];

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.transport.recv_from(&mut buffer) {
                Ok((len, _source)) => {
                    self.consecutive_errors = 0;
                    let received_at = Instant::now();

                    // Anything that is not a well-formed echo reply for our
                    // family is dropped here
                    if let Some(tag) =
                        parse_echo_reply(&buffer[..len], self.protocol, includes_ip_header)
                    {
                        self.dispatch.deliver(tag, received_at);
                    }
                }
                Err(e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut =>
                {
                    // Socket is idle, loop back to the cancellation check
                    self.consecutive_errors = 0;
                }
                Err(e) => {
                    self.consecutive_errors += 1;
                    warn!(
                        error = %e,
                        streak = self.consecutive_errors,
                        "receive error"
                    );

                    if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        error!(
                            streak = self.consecutive_errors,
                            "receiver stopping after sustained socket errors"
                        );
                        self.cancel.cancel();
                        break;
                    }
                }
            }
        }
    }
}

/// Spawn the receiver on a dedicated OS thread.
///
/// A panic in the loop must not strand sessions waiting forever, so it is
/// caught and converted into an engine shutdown.
pub(crate) fn spawn_receiver(receiver: Receiver) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let cancel = receiver.cancel.clone();
        let result =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| receiver.run_blocking()));
        if result.is_err() {
            error!("receiver panicked, stopping engine");
            cancel.cancel();
        }
    })
}
