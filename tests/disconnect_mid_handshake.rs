//! Scenario 5 (`SPEC_FULL.md` §8): the host calls `disconnect()` between the
//! version read and the security-type write. The worker must surface exactly
//! one `ConnectResult{UserInterruption}` then one `Disconnected`, and close
//! the socket.

mod common;

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use rustvncclient::context::{Context, ConnectionConfigBuilder, EventDelivery};
use rustvncclient::Event;

#[tokio::test]
async fn disconnect_between_version_and_security_type() {
    let (listener, port) = common::listen().await;

    let server = tokio::spawn(async move {
        let mut stream = common::accept(listener).await;
        stream.write_all(b"RFB 003.008\n").await.unwrap();
        let _client_version = common::read_n(&mut stream, 12).await;
        // Hold the socket open without sending the security-type list; the
        // client's next read is where the disconnect must be observed.
        let mut scratch = [0u8; 1];
        let _ = stream.read(&mut scratch).await;
    });

    let context = Context::new(EventDelivery::Polling);
    let config = ConnectionConfigBuilder::new("127.0.0.1", port)
        .connect_timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    context.connect(&config).unwrap();

    // Give the worker time to read the version line before interrupting it.
    tokio::time::sleep(Duration::from_millis(50)).await;
    context.disconnect();

    let connect_result = common::wait_for_event(&context, Duration::from_secs(2), |e| {
        matches!(e, Event::ConnectResult { .. })
    })
    .await;
    match connect_result {
        Event::ConnectResult { result: Err(message), .. } => {
            assert!(message.contains("interrupted"));
        }
        other => panic!("expected a failed ConnectResult, got {other:?}"),
    }

    common::wait_for_event(&context, Duration::from_secs(2), |e| matches!(e, Event::Disconnected { .. })).await;

    assert!(!context.is_connected());
    drop(server);
    context.destroy().await;
}
