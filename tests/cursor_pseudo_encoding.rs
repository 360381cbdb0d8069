//! Scenario 6 (`SPEC_FULL.md` §8): the Rich Cursor pseudo-encoding. A 4x4
//! all-white cursor at hotspot (1,1) with a per-row mask pattern must decode
//! to the expected per-pixel alpha values.

mod common;

use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tokio::io::AsyncWriteExt;

use rustvncclient::context::{Context, ConnectionConfigBuilder, EventDelivery};
use rustvncclient::Event;

#[tokio::test]
async fn cursor_rectangle_decodes_mask_into_alpha() {
    let (listener, port) = common::listen().await;

    let server = tokio::spawn(async move {
        let mut stream = common::accept(listener).await;
        common::run_none_auth_handshake_3_8(&mut stream, 64, 64, "cursor").await;

        let _request = common::read_n(&mut stream, 10).await;

        let mut msg = BytesMut::with_capacity(4 + 12 + 16 * 4 + 4);
        msg.put_u8(0);
        msg.put_u8(0);
        msg.put_u16(1);
        msg.put_u16(1); // hotspot x
        msg.put_u16(1); // hotspot y
        msg.put_u16(4); // width
        msg.put_u16(4); // height
        msg.put_i32(-239); // pseudo-encoding: Cursor

        // 16 all-white pixels, XRGB8888.
        for _ in 0..16 {
            msg.put_u8(0xFF);
            msg.put_u8(0xFF);
            msg.put_u8(0xFF);
            msg.put_u8(0);
        }

        // One mask byte per row (width=4 rounds up to 1 byte/row).
        for row in [0b1111_0000u8, 0b1111_0000, 0b0000_1111, 0b0000_1111] {
            msg.put_u8(row);
        }

        stream.write_all(&msg).await.unwrap();
    });

    let context = Context::new(EventDelivery::Polling);
    let config = ConnectionConfigBuilder::new("127.0.0.1", port)
        .connect_timeout(Duration::from_secs(2))
        .build()
        .unwrap();
    context.connect(&config).unwrap();

    common::wait_for_event(&context, Duration::from_secs(2), |e| {
        matches!(e, Event::ConnectResult { result: Ok(_), .. })
    })
    .await;

    context.request_framebuffer_update(0, 0, 64, 64, false);

    common::wait_for_event(&context, Duration::from_secs(2), |e| matches!(e, Event::CursorUpdated)).await;

    let cursor = context.acquire_cursor();
    assert!(cursor.valid());
    assert_eq!(cursor.hotspot(), (1, 1));

    let alpha: Vec<u8> = cursor.rgba().chunks_exact(4).map(|px| px[3]).collect();
    assert_eq!(
        alpha,
        vec![
            0xFF, 0xFF, 0xFF, 0xFF, //
            0xFF, 0xFF, 0xFF, 0xFF, //
            0x00, 0x00, 0x00, 0x00, //
            0x00, 0x00, 0x00, 0x00, //
        ],
        "rows 0..3 expected per SPEC_FULL.md scenario 6"
    );

    server.await.unwrap();
    context.destroy().await;
}
