use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};

/// TCP connect bounded by `timeout`. Returns the stream and the handshake latency.
pub async fn connect_timed(addr: SocketAddr, timeout: Duration) -> io::Result<(TcpStream, Duration)> {
    let start = Instant::now();
    match time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok((stream, start.elapsed())),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("connect to {addr} timed out"),
        )),
    }
}

/// Try to read up to 1 KiB from the stream with a short timeout and convert to a lossy UTF-8 string.
pub async fn read_banner(stream: &mut TcpStream, timeout: Duration) -> Option<String> {
    let mut buf = vec![0u8; 1024];
    match time::timeout(timeout, stream.read(&mut buf)).await {
        Ok(Ok(n)) if n > 0 => {
            buf.truncate(n);
            Some(String::from_utf8_lossy(&buf).into_owned())
        }
        _ => None,
    }
}

/// Connect and grab whatever the service sends first.
pub async fn grab_banner(addr: SocketAddr, timeout: Duration) -> Option<String> {
    let (mut stream, _) = connect_timed(addr, timeout).await.ok()?;
    read_banner(&mut stream, timeout).await
}
