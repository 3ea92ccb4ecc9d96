//! Notification side effects and typed queries.

mod common;

use std::time::Duration;

use common::{started_toy, FakePeripheral, CONTROL, DFU_CONTROL, DFU_INFO};

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn dfu_control_notification_is_acknowledged() {
    let fake = FakePeripheral::sphero();
    let _toy = started_toy(&fake).await;
    // Subscribing already produced one
    assert_eq!(fake.writes_to(DFU_CONTROL).len(), 1);

    fake.notify(DFU_CONTROL);
    settle().await;
    assert_eq!(fake.writes_to(DFU_CONTROL), vec![vec![0x30], vec![0x30]]);
}

#[tokio::test]
async fn failed_dfu_ack_is_not_fatal() {
    let fake = FakePeripheral::sphero();
    let toy = started_toy(&fake).await;

    fake.fail_writes_to(DFU_CONTROL);
    fake.notify(DFU_CONTROL);
    settle().await;
    assert!(toy.sleep().unwrap().await.is_ok());
}

#[tokio::test]
async fn control_notification_wakes_again() {
    let fake = FakePeripheral::sphero();
    let toy = started_toy(&fake).await;

    fake.notify(CONTROL);
    fake.wait_for_control_writes(2).await;

    let packets = fake.control_packets();
    assert_eq!((packets[1].device_id, packets[1].command_id), (0x13, 0x0D));
    assert_eq!(packets[1].sequence, 1);

    // The re-wake used a sequence number from the same counter
    settle().await;
    assert_eq!(toy.sleep().unwrap().sequence(), 2);
}

#[tokio::test]
async fn other_notifications_are_ignored() {
    let fake = FakePeripheral::sphero();
    let _toy = started_toy(&fake).await;

    fake.notify(DFU_INFO);
    fake.notify("0000ffff00001000800000805f9b34fb");
    settle().await;
    assert_eq!(fake.writes_to(CONTROL).len(), 1);
    assert!(fake.writes_to(DFU_INFO).is_empty());
}

#[tokio::test]
async fn battery_voltage() {
    let fake = FakePeripheral::sphero();
    fake.set_reply(0x13, 0x03, &[0x01, 0x9A]);
    let toy = started_toy(&fake).await;

    let battery = toy.battery_voltage().await.unwrap();
    assert_eq!(battery.centivolts, 410);
}

#[tokio::test]
async fn firmware_versions() {
    let fake = FakePeripheral::sphero();
    fake.set_reply(0x11, 0x00, &[0x00, 0x05, 0x00, 0x02, 0x00, 0x11]);
    fake.set_reply(0x11, 0x01, &[0x00, 0x04, 0x00, 0x00, 0x00, 0x01]);
    let toy = started_toy(&fake).await;

    assert_eq!(toy.main_app_version().await.unwrap().to_string(), "5.2.17");
    assert_eq!(toy.bootloader_version().await.unwrap().to_string(), "4.0.1");
}

#[tokio::test]
async fn echo_round_trip() {
    let fake = FakePeripheral::sphero();
    // Reserved bytes exercise escaping both ways
    fake.set_reply(0x10, 0x00, &[0x8D, 0xAB, 0xD8]);
    let toy = started_toy(&fake).await;

    assert_eq!(
        toy.echo(&[0x8D, 0xAB, 0xD8]).await.unwrap(),
        vec![0x8D, 0xAB, 0xD8]
    );
    assert_eq!(fake.control_packets()[1].payload, vec![0x8D, 0xAB, 0xD8]);
}

#[tokio::test]
async fn deep_sleep_command() {
    let fake = FakePeripheral::sphero();
    let toy = started_toy(&fake).await;

    toy.deep_sleep().unwrap().await.unwrap();
    let packet = fake.control_packets().pop().unwrap();
    assert_eq!((packet.device_id, packet.command_id), (0x13, 0x00));
}
