//! Queueing, correlation and recovery through a started toy.

mod common;

use std::time::Duration;

use common::{started_toy, FakePeripheral, CONTROL};
use sphero_transport::{QueueError, TransportError};
use sphero_toy::ToyError;

#[tokio::test]
async fn one_command_in_flight_fifo() {
    let fake = FakePeripheral::sphero();
    let toy = started_toy(&fake).await;
    fake.set_auto_respond(false);

    let a = toy.roll(10, 0, &[]).unwrap();
    let b = toy.roll(20, 0, &[]).unwrap();
    let c = toy.sleep().unwrap();
    assert_eq!((a.sequence(), b.sequence(), c.sequence()), (1, 2, 3));

    // Only the first is written until it is answered
    fake.wait_for_control_writes(2).await;
    tokio::task::yield_now().await;
    assert_eq!(fake.writes_to(CONTROL).len(), 2);

    fake.respond(0x16, 0x07, 1, &[0x00]);
    fake.wait_for_control_writes(3).await;
    fake.respond(0x16, 0x07, 2, &[0x00]);
    fake.wait_for_control_writes(4).await;
    fake.respond(0x13, 0x01, 3, &[0x00]);

    assert_eq!(a.await.unwrap().sequence, 1);
    assert_eq!(b.await.unwrap().sequence, 2);
    assert_eq!(c.await.unwrap().command_id, 0x01);

    let sequences: Vec<u8> = fake.control_packets().iter().map(|p| p.sequence).collect();
    assert_eq!(sequences, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn mismatched_response_fails_and_advances() {
    let fake = FakePeripheral::sphero();
    let toy = started_toy(&fake).await;
    fake.set_auto_respond(false);

    let x = toy.roll(10, 0, &[]).unwrap();
    let y = toy.sleep().unwrap();
    fake.wait_for_control_writes(2).await;

    fake.respond(0x16, 0x07, 42, &[0x00]);
    match x.await {
        Err(QueueError::Mismatch { expected, actual }) => {
            assert_eq!(expected.sequence, 1);
            assert_eq!(actual.sequence, 42);
        }
        other => panic!("expected mismatch, got {other:?}"),
    }

    // y is written without further prompting
    fake.wait_for_control_writes(3).await;
    assert_eq!(fake.control_packets()[2].sequence, 2);
    fake.respond(0x13, 0x01, 2, &[0x00]);
    assert!(y.await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn timeout_fails_and_advances() {
    let fake = FakePeripheral::sphero();
    let toy = started_toy(&fake).await;
    fake.set_auto_respond(false);

    let x = toy.roll(10, 0, &[]).unwrap();
    let y = toy.sleep().unwrap();

    assert_eq!(x.await, Err(QueueError::Timeout(Duration::from_secs(5))));
    fake.wait_for_control_writes(3).await;

    // y is executing now
    assert_eq!(fake.control_packets()[2].sequence, 2);
    fake.respond(0x13, 0x01, 2, &[0x00]);
    assert_eq!(y.await.unwrap().sequence, 2);
}

#[tokio::test]
async fn failed_write_fails_only_that_command() {
    let fake = FakePeripheral::sphero();
    let toy = started_toy(&fake).await;

    fake.fail_writes_to(CONTROL);
    let err = toy.roll(10, 0, &[]).unwrap().await.unwrap_err();
    assert!(matches!(
        err,
        QueueError::Transport(TransportError::Write { .. })
    ));

    fake.clear_failures();
    assert!(toy.sleep().unwrap().await.is_ok());
}

#[tokio::test]
async fn malformed_bytes_do_not_break_the_session() {
    let fake = FakePeripheral::sphero();
    let toy = started_toy(&fake).await;
    fake.set_auto_respond(false);

    let pending = toy.sleep().unwrap();
    fake.wait_for_control_writes(2).await;

    // Bad checksum, stray end marker, then the real answer
    fake.read(&[0x8D, 0x09, 0x13, 0x01, 0x01, 0x00, 0x00, 0xD8]);
    fake.read(&[0xD8, 0x42]);
    fake.respond(0x13, 0x01, 1, &[0x00]);

    assert_eq!(pending.await.unwrap().sequence, 1);
}

#[tokio::test]
async fn byte_at_a_time_responses() {
    let fake = FakePeripheral::sphero();
    let toy = started_toy(&fake).await;
    fake.set_chunked(true);

    for _ in 0..3 {
        toy.roll(30, 180, &[]).unwrap().await.unwrap();
    }
    assert_eq!(fake.control_packets().len(), 4);
}

#[tokio::test]
async fn unsolicited_packet_is_ignored() {
    let fake = FakePeripheral::sphero();
    let toy = started_toy(&fake).await;

    fake.respond(0x13, 0x0D, 77, &[0x00]);
    // Let the worker see it while the queue is idle
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(toy.sleep().unwrap().await.is_ok());
}

#[tokio::test]
async fn error_code_reaches_typed_queries() {
    let fake = FakePeripheral::sphero();
    let toy = started_toy(&fake).await;
    fake.set_auto_respond(false);

    let toy = std::sync::Arc::new(toy);
    let query = {
        let toy = toy.clone();
        tokio::spawn(async move { toy.battery_voltage().await })
    };
    fake.wait_for_control_writes(2).await;
    fake.respond(0x13, 0x03, 1, &[0x08]);

    let err = query.await.unwrap().unwrap_err();
    assert!(matches!(err, ToyError::Response(_)));
}
