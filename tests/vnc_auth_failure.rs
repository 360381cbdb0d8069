//! Scenario 2 (`SPEC_FULL.md` §8): VNC auth failure on RFB 3.8. The server
//! offers VNC Authentication, runs the DES challenge/response, then reports
//! `SecurityResult = failed` with a reason string.

mod common;

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use rustvncclient::context::{Context, ConnectionConfigBuilder, EventDelivery};
use rustvncclient::Event;

#[tokio::test]
async fn auth_failure_surfaces_as_connect_result_and_disconnect() {
    let (listener, port) = common::listen().await;

    let server = tokio::spawn(async move {
        let mut stream = common::accept(listener).await;
        stream.write_all(b"RFB 003.008\n").await.unwrap();
        let _client_version = common::read_n(&mut stream, 12).await;

        // One security type: VNC Authentication (2).
        stream.write_all(&[1u8, 2u8]).await.unwrap();
        let mut chosen = [0u8; 1];
        stream.read_exact(&mut chosen).await.unwrap();
        assert_eq!(chosen[0], 2);

        let challenge = [0x11u8; 16];
        stream.write_all(&challenge).await.unwrap();
        let _response = common::read_n(&mut stream, 16).await;

        let reason = "Authentication failed";
        stream.write_all(&1u32.to_be_bytes()).await.unwrap();
        stream.write_all(&(reason.len() as u32).to_be_bytes()).await.unwrap();
        stream.write_all(reason.as_bytes()).await.unwrap();
    });

    let context = Context::new(EventDelivery::Polling);
    let config = ConnectionConfigBuilder::new("127.0.0.1", port)
        .password("wrongpass")
        .connect_timeout(Duration::from_secs(2))
        .build()
        .unwrap();
    context.connect(&config).unwrap();

    let connect_result = common::wait_for_event(&context, Duration::from_secs(2), |e| {
        matches!(e, Event::ConnectResult { .. })
    })
    .await;
    match connect_result {
        Event::ConnectResult { result: Err(message), .. } => {
            assert!(message.contains("Authentication failed"));
        }
        other => panic!("expected a failed ConnectResult, got {other:?}"),
    }

    let disconnected = common::wait_for_event(&context, Duration::from_secs(2), |e| {
        matches!(e, Event::Disconnected { .. })
    })
    .await;
    match disconnected {
        Event::Disconnected { graceful, error, .. } => {
            assert!(!graceful);
            assert!(error.is_some());
        }
        other => panic!("expected Disconnected, got {other:?}"),
    }

    assert!(!context.is_connected());
    server.await.unwrap();
    context.destroy().await;
}
