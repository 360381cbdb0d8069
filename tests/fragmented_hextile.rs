//! Scenario 3 (`SPEC_FULL.md` §8): a 48x32 Hextile rectangle (six 16x16 Raw
//! tiles) delivered across several socket writes whose boundaries fall in
//! the middle of tiles, with short pauses between writes. The decoder must
//! assemble the same framebuffer contents as if the bytes had arrived whole.

mod common;

use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tokio::io::AsyncWriteExt;

use rustvncclient::context::{Context, ConnectionConfigBuilder, EventDelivery};
use rustvncclient::Event;

const HEXTILE_RAW: u8 = 1 << 0;

/// The colour assigned to tile `i` (0..6, row-major across a 3x2 tile grid).
fn tile_colour(i: u8) -> (u8, u8, u8) {
    (i * 40, (5 - i) * 40, 10 + i)
}

/// Builds the full Hextile rectangle body: six 16x16 tiles, each a flat Raw
/// fill in XRGB8888 (4 bytes per pixel, little-endian, byte0=blue).
fn build_hextile_body() -> Vec<u8> {
    let mut body = BytesMut::with_capacity(6 * (1 + 16 * 16 * 4));
    for i in 0..6u8 {
        let (r, g, b) = tile_colour(i);
        body.put_u8(HEXTILE_RAW);
        for _ in 0..(16 * 16) {
            body.put_u8(b);
            body.put_u8(g);
            body.put_u8(r);
            body.put_u8(0);
        }
    }
    body.to_vec()
}

#[tokio::test]
async fn fragmented_hextile_rectangle_decodes_identically() {
    let (listener, port) = common::listen().await;

    let server = tokio::spawn(async move {
        let mut stream = common::accept(listener).await;
        common::run_none_auth_handshake_3_8(&mut stream, 48, 32, "hex").await;

        let _request = common::read_n(&mut stream, 10).await;

        let mut header = BytesMut::with_capacity(16);
        header.put_u8(0);
        header.put_u8(0);
        header.put_u16(1);
        header.put_u16(0);
        header.put_u16(0);
        header.put_u16(48);
        header.put_u16(32);
        header.put_i32(5); // ENCODING_HEXTILE
        stream.write_all(&header).await.unwrap();

        // Chunk boundaries deliberately fall inside tiles (tile stride is
        // 1025 bytes: 1 subencoding byte + 1024 raw pixel bytes).
        let body = build_hextile_body();
        assert_eq!(body.len(), 6150);
        let chunk_sizes = [100usize, 1200, 900, 2000, 950, 1000];
        let mut offset = 0;
        for size in chunk_sizes {
            stream.write_all(&body[offset..offset + size]).await.unwrap();
            offset += size;
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        assert_eq!(offset, body.len());
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

    context.request_framebuffer_update(0, 0, 48, 32, false);

    common::wait_for_event(&context, Duration::from_secs(5), |e| {
        matches!(e, Event::FramebufferUpdated { x: 0, y: 0, width: 48, height: 32 })
    })
    .await;

    {
        let fb = context.acquire_framebuffer();
        let stride = 48 * 3;
        for ty in 0..2u16 {
            for tx in 0..3u16 {
                let i = (ty * 3 + tx) as u8;
                let (r, g, b) = tile_colour(i);
                // Sample the tile's top-left and bottom-right pixel.
                for (px, py) in [(tx * 16, ty * 16), (tx * 16 + 15, ty * 16 + 15)] {
                    let offset = usize::from(py) * stride + usize::from(px) * 3;
                    assert_eq!(
                        &fb.bytes()[offset..offset + 3],
                        &[r, g, b],
                        "tile {i} pixel ({px},{py}) mismatch"
                    );
                }
            }
        }
    }

    server.await.unwrap();
    context.destroy().await;
}
