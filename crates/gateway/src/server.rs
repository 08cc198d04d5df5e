//! TCP accept loop and per-connection frame pump.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::codec::LineCodec;
use crate::error::Result;
use crate::frames::Frame;
use crate::session::Session;

/// Accept connections forever, one session task per client.
pub async fn serve(listener: TcpListener) -> Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        info!(%peer, "client connected");
        tokio::spawn(async move {
            if let Err(e) = run_session(stream).await {
                warn!(%peer, "session ended with error: {}", e);
            }
            debug!(%peer, "client disconnected");
        });
    }
}

async fn run_session(mut stream: TcpStream) -> Result<()> {
    let mut session = Session::new();
    let mut codec = LineCodec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        codec.extend(&chunk[..n]);

        while let Some(line) = codec.next_frame() {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(frame) = session.handle_text(&line) {
                send_frame(&mut stream, &frame).await?;
            }
        }
    }
}

async fn send_frame(stream: &mut TcpStream, frame: &Frame) -> Result<()> {
    let mut payload = serde_json::to_vec(frame)?;
    payload.push(b'\n');
    stream.write_all(&payload).await?;
    Ok(())
}
