//! Shared loopback fake-server harness for the scenario tests in `SPEC_FULL.md`
//! §8. Each test binds its own `127.0.0.1:0` listener, spawns a handler task
//! that speaks just enough of the wire protocol to drive one scenario, and
//! drives a real [`rustvncclient::Context`] against it.

use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use rustvncclient::protocol::PixelFormat;

/// Binds a loopback listener and returns its port plus the accepted stream,
/// once a client connects.
pub async fn listen() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback listener");
    let port = listener.local_addr().expect("local addr").port();
    (listener, port)
}

pub async fn accept(listener: TcpListener) -> TcpStream {
    let (stream, _) = listener.accept().await.expect("accept loopback connection");
    stream
}

/// Reads exactly `n` bytes.
pub async fn read_n(stream: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    stream.read_exact(&mut buf).await.expect("read from client");
    buf
}

/// Performs the version + `None`-security (RFB 3.8) handshake as the server
/// side, then writes `ServerInit` for a `width x height` 32bpp desktop. Reads
/// and discards the client's `SetPixelFormat` + `SetEncodings`. Returns the
/// stream positioned right after the handshake, ready for message-loop bytes.
pub async fn run_none_auth_handshake_3_8(stream: &mut TcpStream, width: u16, height: u16, name: &str) {
    stream.write_all(b"RFB 003.008\n").await.unwrap();
    let _client_version = read_n(stream, 12).await;

    // security type count + list: one type, None.
    stream.write_all(&[1u8, 1u8]).await.unwrap();
    let mut chosen = [0u8; 1];
    stream.read_exact(&mut chosen).await.unwrap();
    assert_eq!(chosen[0], 1, "client must choose security type None");

    // 3.8 always sends a SecurityResult, even for None.
    stream.write_all(&0u32.to_be_bytes()).await.unwrap();

    let mut client_init = [0u8; 1];
    stream.read_exact(&mut client_init).await.unwrap();

    let mut init = BytesMut::with_capacity(24 + name.len());
    init.put_u16(width);
    init.put_u16(height);
    PixelFormat::xrgb8888().write_to(&mut init);
    init.put_u32(name.len() as u32);
    init.put_slice(name.as_bytes());
    stream.write_all(&init).await.unwrap();

    // SetPixelFormat: type(1) + pad(3) + format(16).
    let _set_pixel_format = read_n(stream, 20).await;
    // SetEncodings: type(1) + pad(1) + count(2) + count*4 bytes. The
    // preference list is fixed at 7 entries (see `handshake.rs`).
    let header = read_n(stream, 4).await;
    let count = u16::from_be_bytes([header[2], header[3]]) as usize;
    let _encodings = read_n(stream, count * 4).await;
}

/// Writes a single-rectangle `FramebufferUpdate` message with a 12-byte
/// rectangle header followed by `body`.
pub async fn write_framebuffer_update(stream: &mut TcpStream, x: u16, y: u16, w: u16, h: u16, encoding: i32, body: &[u8]) {
    let mut msg = BytesMut::with_capacity(4 + 12 + body.len());
    msg.put_u8(0); // SERVER_MSG_FRAMEBUFFER_UPDATE
    msg.put_u8(0); // padding
    msg.put_u16(1); // one rectangle
    msg.put_u16(x);
    msg.put_u16(y);
    msg.put_u16(w);
    msg.put_u16(h);
    msg.put_i32(encoding);
    msg.put_slice(body);
    stream.write_all(&msg).await.unwrap();
}

/// Polls `context.poll_event()` until `predicate` matches an event or
/// `timeout` elapses, returning the matched event.
pub async fn wait_for_event<F>(context: &rustvncclient::Context, timeout: Duration, mut predicate: F) -> rustvncclient::Event
where
    F: FnMut(&rustvncclient::Event) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(event) = context.poll_event() {
            if predicate(&event) {
                return event;
            }
        } else if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for expected event");
        } else {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
