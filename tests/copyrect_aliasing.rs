//! Scenario 4 (`SPEC_FULL.md` §8): CopyRect aliasing. Starting from
//! `fb = [A B; C D]`, `CopyRect(src=(0,0), dst=(1,1), size=(1,1))` must
//! produce `fb = [A B; C A]`, copying from the *pre-copy* source pixel even
//! though source and destination overlap within the same framebuffer.

mod common;

use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use rustvncclient::context::{Context, ConnectionConfigBuilder, EventDelivery};
use rustvncclient::Event;

const A: [u8; 3] = [0xAA, 0x00, 0x00];
const B: [u8; 3] = [0x00, 0xBB, 0x00];
const C: [u8; 3] = [0x00, 0x00, 0xCC];
const D: [u8; 3] = [0xDD, 0xDD, 0x00];

async fn write_raw_fill(stream: &mut TcpStream) {
    let mut body = BytesMut::with_capacity(2 * 2 * 4);
    // Pixel order: row-major, (0,0)=A (0,1)=B (1,0)=C (1,1)=D, XRGB8888.
    for (r, g, b) in [A, B, C, D] {
        body.put_u8(b);
        body.put_u8(g);
        body.put_u8(r);
        body.put_u8(0);
    }
    common::write_framebuffer_update(stream, 0, 0, 2, 2, 0, &body).await;
}

async fn write_copy_rect(stream: &mut TcpStream) {
    let mut msg = BytesMut::with_capacity(4 + 12 + 4);
    msg.put_u8(0);
    msg.put_u8(0);
    msg.put_u16(1);
    msg.put_u16(1); // x
    msg.put_u16(1); // y
    msg.put_u16(1); // width
    msg.put_u16(1); // height
    msg.put_i32(1); // ENCODING_COPYRECT
    msg.put_u16(0); // src_x
    msg.put_u16(0); // src_y
    stream.write_all(&msg).await.unwrap();
}

#[tokio::test]
async fn copy_rect_reads_the_pre_copy_source_pixel() {
    let (listener, port) = common::listen().await;

    let server = tokio::spawn(async move {
        let mut stream = common::accept(listener).await;
        common::run_none_auth_handshake_3_8(&mut stream, 2, 2, "copyrect").await;

        let _first_request = common::read_n(&mut stream, 10).await;
        write_raw_fill(&mut stream).await;

        let _second_request = common::read_n(&mut stream, 10).await;
        write_copy_rect(&mut stream).await;
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

    context.request_framebuffer_update(0, 0, 2, 2, false);
    common::wait_for_event(&context, Duration::from_secs(2), |e| {
        matches!(e, Event::FramebufferUpdated { x: 0, y: 0, width: 2, height: 2 })
    })
    .await;

    {
        let fb = context.acquire_framebuffer();
        let stride = 2 * 3;
        assert_eq!(&fb.bytes()[0..3], &A);
        assert_eq!(&fb.bytes()[3..6], &B);
        assert_eq!(&fb.bytes()[stride..stride + 3], &C);
        assert_eq!(&fb.bytes()[stride + 3..stride + 6], &D);
    }

    context.request_framebuffer_update(0, 0, 2, 2, false);
    common::wait_for_event(&context, Duration::from_secs(2), |e| {
        matches!(e, Event::FramebufferUpdated { x: 1, y: 1, width: 1, height: 1 })
    })
    .await;

    {
        let fb = context.acquire_framebuffer();
        let stride = 2 * 3;
        assert_eq!(&fb.bytes()[0..3], &A, "top-left unchanged");
        assert_eq!(&fb.bytes()[3..6], &B, "top-right unchanged");
        assert_eq!(&fb.bytes()[stride..stride + 3], &C, "bottom-left unchanged");
        assert_eq!(
            &fb.bytes()[stride + 3..stride + 6],
            &A,
            "bottom-right now holds the pre-copy source pixel A"
        );
    }

    server.await.unwrap();
    context.destroy().await;
}
