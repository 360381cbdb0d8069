//! Minimal polling VNC client.
//!
//! Connects to a server, requests framebuffer updates in a loop, and prints
//! a summary of each update and any other event received, until the server
//! disconnects or Ctrl+C is pressed.
//!
//! Usage:
//!   cargo run --example poll_client -- <host> <port> [password]

use std::env;
use std::error::Error;
use std::time::Duration;

use rustvncclient::context::{Context, ConnectionConfigBuilder, EventDelivery};
use rustvncclient::Event;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let mut args = env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "localhost".to_string());
    let port: u16 = args.next().and_then(|p| p.parse().ok()).unwrap_or(5900);
    let password = args.next().unwrap_or_default();

    let context = Context::new(EventDelivery::Polling);
    let config = ConnectionConfigBuilder::new(host.clone(), port)
        .password(password)
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    println!("connecting to {host}:{port}...");
    context.connect(&config)?;

    loop {
        match context.poll_event() {
            Some(Event::ConnectResult { result: Ok(info), .. }) => {
                println!(
                    "connected: {}x{} \"{}\"",
                    info.framebuffer_width, info.framebuffer_height, info.desktop_name
                );
                context.request_framebuffer_update_full();
            }
            Some(Event::ConnectResult { result: Err(message), .. }) => {
                eprintln!("connect failed: {message}");
                break;
            }
            Some(Event::FramebufferUpdated { x, y, width, height }) => {
                println!("updated rect {x},{y} {width}x{height}");
            }
            Some(Event::FramebufferUpdateRequestFinished) => {
                // Ask for the next incremental update once this one lands.
                let (width, height) = {
                    let fb = context.acquire_framebuffer();
                    (fb.width(), fb.height())
                };
                context.request_framebuffer_update(0, 0, width, height, true);
            }
            Some(Event::CursorUpdated) => println!("cursor updated"),
            Some(Event::Bell) => println!("bell"),
            Some(Event::CutText(text)) => println!("clipboard: {text}"),
            Some(Event::Disconnected { graceful, error, .. }) => {
                println!("disconnected (graceful={graceful}, error={error:?})");
                break;
            }
            Some(_) => {}
            None => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }

    context.destroy().await;
    Ok(())
}
