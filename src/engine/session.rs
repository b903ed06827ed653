use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Protocol;
use crate::engine::dispatch::Reply;
use crate::probe::{Tag, Transport, build_echo_request};
use crate::state::Report;

/// How a session's probe loop ended
pub(crate) enum SessionEnd {
    /// All probes resolved (reply or timeout)
    Completed,
    /// Caller token or engine lifetime canceled mid-sequence
    Canceled,
}

/// One `ping` invocation: sends `count` probes to one target, sequentially,
/// and waits on its delivery channel between sends.
pub(crate) struct Session {
    pub transport: Arc<dyn Transport>,
    pub protocol: Protocol,
    pub identifier: u16,
    pub probe_id: u32,
    pub target: IpAddr,
    pub count: u32,
    pub interval: Duration,
    pub payload_size: usize,
    pub rx: mpsc::Receiver<Reply>,
}

impl Session {
    /// Drive the probe sequence, feeding every outcome into `report`.
    ///
    /// Probes go out in increasing sequence-id order, one at a time; each
    /// probe's wait ends on the matching reply or the interval elapsing,
    /// whichever is sooner. Replies carrying any other sequence id are stale
    /// and discarded without ending the wait. A failed transmit skips the
    /// sent counter but still consumes the probe's interval slot, so the
    /// session keeps its pacing.
    ///
    /// The caller finalizes the report and unregisters the probe id; this
    /// function only accumulates.
    pub async fn run(
        mut self,
        cancel: &CancellationToken,
        lifetime: &CancellationToken,
        report: &mut Report,
    ) -> SessionEnd {
        // Random starting point so sequence ids double as a nonce against
        // replies from an earlier session that reused this probe id
        let mut sequence_id: u32 = rand::random();

        for _ in 0..self.count {
            sequence_id = sequence_id.wrapping_add(1);
            let tag = Tag::new(self.probe_id, sequence_id);
            let packet =
                build_echo_request(self.protocol, self.identifier, tag, self.payload_size);

            let sent_at = Instant::now();
            match self.transport.send_to(&packet, self.target) {
                Ok(_) => report.record_sent(),
                Err(e) => {
                    // Non-fatal: surfaces only as loss in the final report
                    debug!(addr = %self.target, error = %e, "probe transmit failed");
                }
            }

            let deadline =
                tokio::time::sleep_until(tokio::time::Instant::from_std(sent_at + self.interval));
            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return SessionEnd::Canceled,
                    _ = lifetime.cancelled() => return SessionEnd::Canceled,
                    _ = &mut deadline => break,
                    reply = self.rx.recv() => match reply {
                        Some(reply) if reply.sequence_id == sequence_id => {
                            report.record_reply(reply.received_at.duration_since(sent_at));
                            break;
                        }
                        Some(stale) => {
                            debug!(
                                probe_id = self.probe_id,
                                sequence_id = stale.sequence_id,
                                "stale reply discarded"
                            );
                        }
                        None => {
                            // Channel gone (engine teardown); nothing more
                            // can arrive, so just sit out the interval
                            tokio::select! {
                                _ = cancel.cancelled() => return SessionEnd::Canceled,
                                _ = lifetime.cancelled() => return SessionEnd::Canceled,
                                _ = &mut deadline => {}
                            }
                            break;
                        }
                    }
                }
            }
        }

        SessionEnd::Completed
    }
}
