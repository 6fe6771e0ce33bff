//! Session-level protocol behaviour against scripted device bytes.

#![allow(clippy::unwrap_used, clippy::panic, clippy::missing_docs_in_private_items)]

mod common;

use std::io::ErrorKind;
use std::time::Duration;

use common::{Behavior, MockPort, read_at_least, run_device};
use mpflash::{Control, Error, Phase, Session, SessionConfig};
use tokio::io::AsyncWriteExt;
use tokio::time::{Instant, sleep};

const TWO_SECS: Duration = Duration::from_millis(2000);

fn session() -> (Session<MockPort>, tokio::io::DuplexStream, std::sync::Arc<common::Log>) {
    let (port, device, log) = MockPort::pair();
    (Session::from_port(port, SessionConfig::default()), device, log)
}

#[tokio::test(start_paused = true)]
async fn marker_in_first_read() {
    let (mut s, mut dev, _log) = session();
    dev.write_all(b"abcMARKxyz").await.unwrap();

    let before = s.wait_for_bytes(b"MARK", TWO_SECS).await.unwrap();
    assert_eq!(before, b"abc");
    assert_eq!(s.buffered().as_bytes(), b"xyz");
}

#[tokio::test(start_paused = true)]
async fn earliest_marker_wins() {
    let (mut s, mut dev, _log) = session();
    dev.write_all(b"1>>> 2>>> 3").await.unwrap();

    assert_eq!(s.wait_for_string(">>> ", TWO_SECS).await.unwrap(), "1");
    assert_eq!(s.buffered().as_bytes(), b"2>>> 3");
}

#[tokio::test(start_paused = true)]
async fn idle_window_resets_while_data_flows() {
    let (mut s, mut dev, _log) = session();
    tokio::spawn(async move {
        dev.write_all(b"a").await.unwrap();
        sleep(Duration::from_millis(1500)).await;
        dev.write_all(b"bMA").await.unwrap();
        sleep(Duration::from_millis(1500)).await;
        dev.write_all(b"RK").await.unwrap();
        // Keep the link open until the host is done.
        sleep(Duration::from_secs(60)).await;
    });

    let start = Instant::now();
    let before = s.wait_for_bytes(b"MARK", TWO_SECS).await.unwrap();
    assert_eq!(before, b"ab");
    assert!(start.elapsed() >= Duration::from_millis(3000));
}

#[tokio::test(start_paused = true)]
async fn silence_times_out_after_window() {
    let (mut s, _dev, _log) = session();
    s.set_phase(Phase::RawModeEntering);

    let start = Instant::now();
    let err = s.wait_for_bytes(b">", TWO_SECS).await.unwrap_err();
    let elapsed = start.elapsed();

    assert!(elapsed >= TWO_SECS, "returned early: {elapsed:?}");
    assert!(elapsed < TWO_SECS + Duration::from_millis(50), "too late: {elapsed:?}");
    match err {
        Error::Timeout { phase, marker, waited } => {
            assert_eq!(phase, Phase::RawModeEntering);
            assert_eq!(marker, ">");
            assert_eq!(waited, TWO_SECS);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn late_bytes_land_in_next_wait() {
    let (mut s, mut dev, _log) = session();
    assert!(s.wait_for_bytes(b">", TWO_SECS).await.unwrap_err().is_timeout());

    dev.write_all(b"late>").await.unwrap();
    assert_eq!(s.wait_for_bytes(b">", TWO_SECS).await.unwrap(), b"late");
}

#[tokio::test(start_paused = true)]
async fn end_of_stream_is_transport_error() {
    let (mut s, dev, _log) = session();
    drop(dev);

    match s.wait_for_bytes(b">", TWO_SECS).await.unwrap_err() {
        Error::Transport(e) => assert_eq!(e.kind(), ErrorKind::UnexpectedEof),
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn control_bytes_on_the_wire() {
    let (mut s, mut dev, _log) = session();
    s.send_control(Control::Interrupt).await.unwrap();
    s.send_control(Control::EnterRaw).await.unwrap();
    s.send_control(Control::ExitRaw).await.unwrap();
    s.send_control(Control::Execute).await.unwrap();

    let sent = read_at_least(&mut dev, 8).await;
    assert_eq!(sent, [0x0d, 0x03, 0x03, 0x0d, 0x01, 0x0d, 0x02, 0x04]);
}

#[tokio::test(start_paused = true)]
async fn commands_are_chunked_and_paced() {
    let (mut s, mut dev, log) = session();
    let text: String = (0..1000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();

    let start = Instant::now();
    s.send_command(&text).await.unwrap();
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(40) && elapsed < Duration::from_millis(50));

    let writes = log.writes.lock().unwrap().clone();
    assert_eq!(writes.len(), 4);
    assert!(writes.iter().all(|w| w.len() <= 256));
    assert_eq!(writes.concat(), text.as_bytes());
    assert_eq!(read_at_least(&mut dev, 1000).await, text.as_bytes());
}

#[tokio::test(start_paused = true)]
async fn chunk_size_is_configurable() {
    let (port, _dev, log) = MockPort::pair();
    let config = SessionConfig::default()
        .chunk_size(100)
        .chunk_delay(Duration::ZERO);
    let mut s = Session::from_port(port, config);

    s.send_command(&"x".repeat(250)).await.unwrap();
    let sizes: Vec<usize> = log.writes.lock().unwrap().iter().map(Vec::len).collect();
    assert_eq!(sizes, [100, 100, 50]);
}

#[tokio::test(start_paused = true)]
async fn execute_waits_for_marker() {
    let (port, dev, log) = MockPort::pair();
    tokio::spawn(run_device(dev, Behavior::default(), log.clone()));
    let mut s = Session::from_port(port, SessionConfig::default());

    s.send_control(Control::EnterRaw).await.unwrap();
    s.wait_for_string(">", TWO_SECS).await.unwrap();

    let out = s.execute("print(\"hello\")").await.unwrap();
    assert_eq!(out, "OKhello\r\n");
    assert_eq!(
        log.commands(),
        ["print(\"hello\")\nprint(\"CGLI5wxheI\")\n"]
    );
}

#[tokio::test(start_paused = true)]
async fn execute_with_custom_marker() {
    let (port, dev, log) = MockPort::pair();
    tokio::spawn(run_device(dev, Behavior::default(), log.clone()));
    let mut s = Session::from_port(port, SessionConfig::default().marker("ZZdoneZZ"));

    s.send_control(Control::EnterRaw).await.unwrap();
    s.wait_for_string(">", TWO_SECS).await.unwrap();

    // Output containing the default marker no longer ends the wait early.
    let out = s.execute("print(\"CGLI5wxheI\")").await.unwrap();
    assert!(out.contains("CGLI5wxheI"));
    assert!(log.commands()[0].ends_with("print(\"ZZdoneZZ\")\n"));
}

#[tokio::test(start_paused = true)]
async fn exec_splits_output_from_traceback() {
    let (port, dev, log) = MockPort::pair();
    tokio::spawn(run_device(dev, Behavior::default(), log));
    let mut s = Session::from_port(port, SessionConfig::default());

    s.send_control(Control::EnterRaw).await.unwrap();
    s.wait_for_string(">", TWO_SECS).await.unwrap();

    let ok = s.exec("print(\"one\")\nprint(\"two\")\n", TWO_SECS).await.unwrap();
    assert_eq!(ok.stdout, "one\r\ntwo\r\n");
    assert!(!ok.failed());

    let bad = s.exec("print(\"x\")\nraise ValueError('boom')\n", TWO_SECS).await.unwrap();
    assert_eq!(bad.stdout, "x\r\n");
    assert!(bad.failed());
    assert!(bad.stderr.contains("ValueError"));
}

#[tokio::test(start_paused = true)]
async fn close_is_idempotent() {
    let (mut s, _dev, log) = session();
    s.close().await.unwrap();
    s.close().await.unwrap();

    assert!(s.is_closed());
    assert_eq!(log.shutdowns(), 1);
    assert!(matches!(
        s.send_control(Control::Interrupt).await,
        Err(Error::Closed)
    ));
}
