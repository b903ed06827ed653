use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Statistics for one ping session.
///
/// Owned exclusively by the session that created it: the driver feeds it
/// through [`record_sent`](Report::record_sent) and
/// [`record_reply`](Report::record_reply) while probes are in flight, then
/// derives the aggregate fields once with [`finalize`](Report::finalize).
/// Returned to the caller only after finalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Address the session pinged
    pub target: IpAddr,
    /// When the session started
    pub started_at: DateTime<Utc>,
    /// Probe count requested by the caller
    pub expected: u64,
    /// Probes actually written to the socket
    pub sent: u64,
    /// Replies received
    pub recv: u64,
    /// Probes with no reply, counted against `expected` (not `sent`), so a
    /// probe that failed to transmit is indistinguishable from a timeout
    pub loss: u64,
    #[serde(with = "duration_serde")]
    pub min_rtt: Duration,
    #[serde(with = "duration_serde")]
    pub max_rtt: Duration,
    #[serde(with = "duration_serde")]
    pub avg_rtt: Duration,

    /// Observed round-trip times in receipt order
    #[serde(skip)]
    rtts: Vec<Duration>,
}

impl Report {
    pub(crate) fn new(target: IpAddr, expected: u64) -> Self {
        Self {
            target,
            started_at: Utc::now(),
            expected,
            sent: 0,
            recv: 0,
            loss: 0,
            min_rtt: Duration::ZERO,
            max_rtt: Duration::ZERO,
            avg_rtt: Duration::ZERO,
            rtts: Vec::with_capacity(expected as usize),
        }
    }

    /// Record one successful transmission
    pub(crate) fn record_sent(&mut self) {
        self.sent += 1;
    }

    /// Record one matched reply
    pub(crate) fn record_reply(&mut self, rtt: Duration) {
        self.rtts.push(rtt);
    }

    /// Derive `recv`, `loss` and the RTT aggregates from the accumulated
    /// samples. Idempotent. The average truncates toward zero at nanosecond
    /// granularity.
    pub(crate) fn finalize(&mut self) {
        self.recv = self.rtts.len() as u64;
        self.loss = self.expected.saturating_sub(self.recv);

        if self.rtts.is_empty() {
            self.min_rtt = Duration::ZERO;
            self.max_rtt = Duration::ZERO;
            self.avg_rtt = Duration::ZERO;
            return;
        }

        let mut min = Duration::MAX;
        let mut max = Duration::ZERO;
        let mut total = Duration::ZERO;
        for &rtt in &self.rtts {
            min = min.min(rtt);
            max = max.max(rtt);
            total += rtt;
        }

        self.min_rtt = min;
        self.max_rtt = max;
        self.avg_rtt = total / self.rtts.len() as u32;
    }

    /// Round-trip times in receipt order
    pub fn rtts(&self) -> &[Duration] {
        &self.rtts
    }
}

/// Serde helper for Duration
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_micros().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let micros = u64::deserialize(deserializer)?;
        Ok(Duration::from_micros(micros))
    }
}
