//! Integration tests for the send→receive→report pipeline
//!
//! These tests run whole ping sessions over the in-memory mock transport,
//! without requiring raw sockets or network access. The mock's remote end
//! plays the network: it sees every frame the engine sends and injects the
//! replies a real target would produce.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use pingmux::probe::{MockRemote, MockTransport};
use pingmux::{PingError, Pinger};

const INTERVAL: Duration = Duration::from_millis(500);

fn addr(last: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, last))
}

/// Started IPv4 engine over a fresh mock link
fn started_pinger(cancel: &CancellationToken) -> (Pinger, MockRemote) {
    let (transport, remote) = MockTransport::pair();
    let pinger = Pinger::v4();
    pinger
        .start_with_transport(cancel, Arc::new(transport))
        .expect("engine starts");
    (pinger, remote)
}

/// Echo every request back from its destination until the link closes
fn spawn_responder(remote: MockRemote) {
    std::thread::spawn(move || {
        while let Some((packet, target)) = remote.next_request(Duration::from_millis(500)) {
            remote.echo(&packet, target);
        }
    });
}

#[tokio::test(flavor = "multi_thread")]
async fn test_session_collects_all_replies() {
    let cancel = CancellationToken::new();
    let (pinger, remote) = started_pinger(&cancel);
    spawn_responder(remote);

    let report = pinger
        .ping(&cancel, addr(1), 4, INTERVAL)
        .await
        .expect("session completes");

    assert_eq!(report.target, addr(1));
    assert_eq!(report.expected, 4);
    assert_eq!(report.sent, 4);
    assert_eq!(report.recv, 4);
    assert_eq!(report.loss, 0);
    assert_eq!(report.rtts().len(), 4);
    assert!(report.min_rtt <= report.avg_rtt);
    assert!(report.avg_rtt <= report.max_rtt);

    pinger.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_parallel_sessions_do_not_cross() {
    let cancel = CancellationToken::new();
    let (pinger, remote) = started_pinger(&cancel);
    spawn_responder(remote);

    let pinger = Arc::new(pinger);
    let mut sessions = Vec::new();
    for last in 1..=3u8 {
        let pinger = pinger.clone();
        let cancel = cancel.clone();
        sessions.push(tokio::spawn(async move {
            pinger.ping(&cancel, addr(last), 3, INTERVAL).await
        }));
    }

    for (i, session) in sessions.into_iter().enumerate() {
        let report = session
            .await
            .expect("task completes")
            .expect("session completes");

        // Every session sees exactly its own replies: all probes answered,
        // nothing borrowed from a sibling session
        assert_eq!(report.target, addr(i as u8 + 1));
        assert_eq!(report.sent, 3);
        assert_eq!(report.recv, 3);
        assert_eq!(report.loss, 0);
        assert_eq!(report.rtts().len(), 3);
    }

    pinger.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancellation_returns_partial_report() {
    let engine_cancel = CancellationToken::new();
    // Remote kept alive but silent: every probe would time out
    let (pinger, remote) = started_pinger(&engine_cancel);

    let session_cancel = CancellationToken::new();
    let trigger = session_cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let err = pinger
        .ping(&session_cancel, addr(1), 5, Duration::from_secs(5))
        .await
        .expect_err("canceled session returns an error");

    match &err {
        PingError::Canceled { partial } => {
            assert!(partial.sent >= 1);
            assert!(partial.sent <= 5);
            assert_eq!(partial.recv, 0);
            assert!(partial.recv <= partial.sent);
            assert_eq!(partial.recv + partial.loss, partial.expected);
        }
        other => panic!("expected Canceled, got {other:?}"),
    }

    // The engine survives a canceled session: a fresh session over the same
    // receive loop and dispatch table still works
    spawn_responder(remote);
    let report = pinger
        .ping(&engine_cancel, addr(1), 2, INTERVAL)
        .await
        .expect("engine still usable after cancellation");
    assert_eq!(report.recv, 2);

    pinger.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stale_sequence_reply_not_counted() {
    let cancel = CancellationToken::new();
    let (pinger, remote) = started_pinger(&cancel);

    // Responder that corrupts the payload sequence id before echoing, so
    // every reply looks like it belongs to some other probe
    std::thread::spawn(move || {
        while let Some((mut packet, target)) = remote.next_request(Duration::from_millis(500)) {
            // Payload starts after the 8-byte ICMP header; sequence id is
            // payload bytes 4..8
            for byte in &mut packet[12..16] {
                *byte ^= 0xFF;
            }
            remote.echo(&packet, target);
        }
    });

    let report = pinger
        .ping(&cancel, addr(1), 2, Duration::from_millis(300))
        .await
        .expect("session completes");

    assert_eq!(report.sent, 2);
    assert_eq!(report.recv, 0);
    assert_eq!(report.loss, 2);

    pinger.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ping_requires_started_engine() {
    let pinger = Pinger::v4();
    let cancel = CancellationToken::new();

    let err = pinger
        .ping(&cancel, addr(1), 1, INTERVAL)
        .await
        .expect_err("unstarted engine rejects ping");
    assert!(matches!(err, PingError::NotStarted));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_start_twice_is_rejected() {
    let cancel = CancellationToken::new();
    let (pinger, _remote) = started_pinger(&cancel);

    let (transport, _second_remote) = MockTransport::pair();
    let err = pinger
        .start_with_transport(&cancel, Arc::new(transport))
        .expect_err("second start rejected");
    assert!(matches!(err, PingError::AlreadyStarted));

    pinger.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_then_ping_fails() {
    let cancel = CancellationToken::new();
    let (pinger, _remote) = started_pinger(&cancel);

    pinger.stop();
    // Idempotent
    pinger.stop();

    let err = pinger
        .ping(&cancel, addr(1), 1, INTERVAL)
        .await
        .expect_err("stopped engine rejects ping");
    assert!(matches!(err, PingError::NotStarted));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_restart_after_stop() {
    let cancel = CancellationToken::new();
    let (pinger, _first_remote) = started_pinger(&cancel);
    pinger.stop();

    let (transport, remote) = MockTransport::pair();
    pinger
        .start_with_transport(&cancel, Arc::new(transport))
        .expect("stopped engine restarts");
    spawn_responder(remote);

    let report = pinger
        .ping(&cancel, addr(1), 2, INTERVAL)
        .await
        .expect("session completes after restart");
    assert_eq!(report.recv, 2);

    pinger.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_argument_validation() {
    let cancel = CancellationToken::new();
    let (pinger, _remote) = started_pinger(&cancel);

    let err = pinger
        .ping(&cancel, addr(1), 0, INTERVAL)
        .await
        .expect_err("zero count rejected");
    assert!(matches!(err, PingError::InvalidCount(0)));

    let v6_target: IpAddr = "::1".parse().unwrap();
    let err = pinger
        .ping(&cancel, v6_target, 1, INTERVAL)
        .await
        .expect_err("IPv6 target rejected on an IPv4 engine");
    assert!(matches!(err, PingError::FamilyMismatch { .. }));

    pinger.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_report_serialization_roundtrip() {
    let cancel = CancellationToken::new();
    let (pinger, remote) = started_pinger(&cancel);
    spawn_responder(remote);

    let report = pinger
        .ping(&cancel, addr(1), 2, INTERVAL)
        .await
        .expect("session completes");
    pinger.stop();

    let json = serde_json::to_string(&report).expect("serialize");
    let loaded: pingmux::Report = serde_json::from_str(&json).expect("deserialize");

    assert_eq!(loaded.target, report.target);
    assert_eq!(loaded.expected, report.expected);
    assert_eq!(loaded.sent, report.sent);
    assert_eq!(loaded.recv, report.recv);
    assert_eq!(loaded.loss, report.loss);
    // Durations serialize at microsecond granularity
    assert_eq!(
        loaded.min_rtt,
        Duration::from_micros(report.min_rtt.as_micros() as u64)
    );
    assert_eq!(
        loaded.max_rtt,
        Duration::from_micros(report.max_rtt.as_micros() as u64)
    );
}
