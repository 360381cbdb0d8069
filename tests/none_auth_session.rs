//! Scenario 1 (`SPEC_FULL.md` §8): plain `None`-auth session. A 2x1 Raw
//! rectangle is requested and decoded into the framebuffer.

mod common;

use std::time::Duration;

use rustvncclient::context::{Context, ConnectionConfigBuilder, EventDelivery};
use rustvncclient::Event;

#[tokio::test]
async fn connects_and_decodes_one_raw_rectangle() {
    let (listener, port) = common::listen().await;

    let server = tokio::spawn(async move {
        let mut stream = common::accept(listener).await;
        common::run_none_auth_handshake_3_8(&mut stream, 2, 1, "x").await;

        // FramebufferUpdateRequest: type(1) + incremental(1) + x,y,w,h (u16 each).
        let _request = common::read_n(&mut stream, 10).await;

        // Two pixels in the negotiated 32bpp XRGB8888 format: red then green.
        let body = [0x00, 0x00, 0xFF, 0x00, 0x00, 0xFF, 0x00, 0x00];
        common::write_framebuffer_update(&mut stream, 0, 0, 2, 1, 0, &body).await;
    });

    let context = Context::new(EventDelivery::Polling);
    let config = ConnectionConfigBuilder::new("127.0.0.1", port)
        .connect_timeout(Duration::from_secs(2))
        .build()
        .unwrap();
    context.connect(&config).unwrap();

    let connect_result = common::wait_for_event(&context, Duration::from_secs(2), |e| {
        matches!(e, Event::ConnectResult { .. })
    })
    .await;
    match connect_result {
        Event::ConnectResult { result: Ok(info), .. } => {
            assert_eq!(info.framebuffer_width, 2);
            assert_eq!(info.framebuffer_height, 1);
            assert_eq!(info.desktop_name, "x");
        }
        other => panic!("expected a successful ConnectResult, got {other:?}"),
    }

    context.request_framebuffer_update(0, 0, 2, 1, false);

    let updated = common::wait_for_event(&context, Duration::from_secs(2), |e| {
        matches!(e, Event::FramebufferUpdated { .. })
    })
    .await;
    assert!(matches!(updated, Event::FramebufferUpdated { x: 0, y: 0, width: 2, height: 1 }));

    common::wait_for_event(&context, Duration::from_secs(2), |e| {
        matches!(e, Event::FramebufferUpdateRequestFinished)
    })
    .await;

    {
        let fb = context.acquire_framebuffer();
        assert_eq!(&fb.bytes()[..6], &[0xFF, 0x00, 0x00, 0x00, 0xFF, 0x00]);
    }

    server.await.unwrap();
    context.destroy().await;
}
