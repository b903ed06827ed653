//! Concurrent ICMP echo engine.
//!
//! One raw socket, shared by any number of concurrent ping sessions. Each
//! session sends its own probe sequence to its own target and gets back its
//! own statistics; a tag embedded in every echo payload routes replies to
//! the session that sent the matching request.
//!
//! ```no_run
//! use pingmux::Pinger;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), pingmux::PingError> {
//! let pinger = Pinger::v4();
//!
//! // The token plays the role of a context: cancel it to abort, or wire a
//! // timer to it for a deadline
//! let cancel = CancellationToken::new();
//!
//! // Acquire the socket and launch the receive loop before pinging
//! pinger.start(&cancel)?;
//!
//! let target = "127.0.0.1".parse().unwrap();
//! let report = pinger
//!     .ping(&cancel, target, 4, Duration::from_millis(100))
//!     .await?;
//!
//! println!("sent {} packets and received {}", report.sent, report.recv);
//! println!(
//!     "RTT: min={:?} / avg={:?} / max={:?}",
//!     report.min_rtt, report.avg_rtt, report.max_rtt
//! );
//! # Ok(())
//! # }
//! ```
//!
//! Sessions run independently, so pinging many targets is just many
//! concurrent `ping` calls on one engine:
//!
//! ```no_run
//! # use pingmux::Pinger;
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! # use tokio_util::sync::CancellationToken;
//! # #[tokio::main]
//! # async fn main() -> Result<(), pingmux::PingError> {
//! let pinger = Arc::new(Pinger::v4());
//! let cancel = CancellationToken::new();
//! pinger.start(&cancel)?;
//!
//! let mut sessions = Vec::new();
//! for target in ["127.0.0.1", "127.0.0.2", "127.0.0.3"] {
//!     let pinger = pinger.clone();
//!     let cancel = cancel.clone();
//!     let target = target.parse().unwrap();
//!     sessions.push(tokio::spawn(async move {
//!         pinger.ping(&cancel, target, 4, Duration::from_millis(100)).await
//!     }));
//! }
//! for session in sessions {
//!     let report = session.await.unwrap()?;
//!     println!("{}: loss {}/{}", report.target, report.loss, report.expected);
//! }
//! # Ok(())
//! # }
//! ```

// Public API - engine, results, configuration, errors
pub mod config;
pub mod engine;
pub mod error;
pub mod probe;
pub mod state;

pub use config::{Config, Protocol};
pub use engine::Pinger;
pub use error::PingError;
pub use state::Report;
