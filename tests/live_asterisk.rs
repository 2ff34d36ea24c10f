//! Integration tests against a live Asterisk instance.
//!
//! These tests require AMI on 127.0.0.1:5038 with a manager user
//! `admin` / `amp111` allowed to read `system,call` events.
//! Run with: cargo test --test live_asterisk -- --ignored

use asterisk_ami_tokio::{AmiAction, AmiConfig, AmiSession, ReachabilityProbe};
use std::time::Duration;

const AMI_HOST: &str = "127.0.0.1";
const AMI_PORT: u16 = 5038;
const AMI_USER: &str = "admin";
const AMI_SECRET: &str = "amp111";

fn live_config() -> AmiConfig {
    AmiConfig {
        probe: ReachabilityProbe::Disabled,
        confirm_login: true,
        ..AmiConfig::new(AMI_HOST, AMI_PORT, AMI_USER, AMI_SECRET)
    }
}

#[tokio::test]
#[ignore]
async fn live_login_and_ping() {
    let session = AmiSession::new(live_config()).unwrap();
    session
        .connect()
        .await
        .expect("failed to log in to Asterisk");
    assert!(session.is_connected());

    let mut dispatcher = session
        .dispatcher()
        .await
        .unwrap();
    session
        .send(
            &AmiAction::ping()
                .action_id("live-ping")
                .unwrap(),
        )
        .await
        .unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = dispatcher
            .next()
            .await
        {
            if event.action_id() == Some("live-ping") {
                return Some(event);
            }
        }
        None
    })
    .await
    .expect("timeout waiting for PING reply")
    .expect("session closed");

    assert_eq!(reply.response(), Some("Success"));

    session
        .shutdown()
        .await;
}

#[tokio::test]
#[ignore]
async fn live_core_status_response() {
    let session = AmiSession::new(live_config()).unwrap();
    session
        .connect()
        .await
        .unwrap();
    let mut dispatcher = session
        .dispatcher()
        .await
        .unwrap();

    session
        .send_action("Action: CoreStatus\r\nActionID: core-1")
        .await
        .unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = dispatcher
                .next()
                .await?;
            if event.action_id() == Some("core-1") {
                return Some(event);
            }
        }
    })
    .await
    .expect("timeout waiting for CoreStatus")
    .expect("session closed");

    assert!(reply
        .header("CoreCurrentCalls")
        .is_some());

    session
        .shutdown()
        .await;
}

#[tokio::test]
#[ignore]
async fn live_wrong_secret_rejected() {
    let mut config = live_config();
    config.secret = "definitely-wrong".to_string();
    let session = AmiSession::new(config).unwrap();

    let err = session
        .connect()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        asterisk_ami_tokio::AmiError::AuthFailed { .. }
    ));

    session
        .shutdown()
        .await;
}
