use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use anyhow::{Context, Result};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
};
use tracing::{debug, info, warn};

use crate::{cli::ClientArgs, connection::READ_CHUNK_SIZE, error::ConnectionError};

pub const DISCONNECTED_NOTICE: &str = "Disconnected from server";

const LINE_ENDINGS: &[char] = &['\n', '\r'];

pub async fn run(args: ClientArgs) -> Result<()> {
    let stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;

    info!("connected to {}", args.server);

    let stdin = BufReader::new(tokio::io::stdin());
    run_session(stream, stdin, tokio::io::stdout()).await
}

/// Drives one chat session over an already connected stream.
///
/// A spawned receiver task copies server data to `output`; this task reads
/// lines from `input` and sends them. The two share a `closed` flag: once the
/// receiver sees the server go away, the next send ends the session cleanly
/// instead of writing into a dead socket.
pub async fn run_session<I, O>(stream: TcpStream, mut input: I, output: O) -> Result<()>
where
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Send + Unpin + 'static,
{
    let (reader, mut writer) = stream.into_split();
    let closed = Arc::new(AtomicBool::new(false));

    let receiver = tokio::spawn(receive_messages(reader, output, Arc::clone(&closed)));

    let result = send_loop(&mut input, &mut writer, &closed).await;

    shutdown_connection(&mut writer).await;
    receiver.abort();
    result
}

async fn send_loop<I, W>(input: &mut I, writer: &mut W, closed: &AtomicBool) -> Result<()>
where
    I: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = input
            .read_line(&mut line)
            .await
            .context("failed to read user input")?;
        if bytes_read == 0 {
            debug!("input closed, ending session");
            return Ok(());
        }

        let text = line.trim_end_matches(LINE_ENDINGS);
        if text.is_empty() {
            continue;
        }

        if let Err(err) = send_message(writer, text.as_bytes(), closed).await {
            // Whichever side notices first raises the flag for the other.
            if closed.swap(true, Ordering::AcqRel) {
                debug!("connection already closed, dropping input");
            } else {
                warn!(error = %err, "failed to send message");
            }
            return Ok(());
        }
    }
}

async fn send_message<W>(
    writer: &mut W,
    payload: &[u8],
    closed: &AtomicBool,
) -> Result<(), ConnectionError>
where
    W: AsyncWrite + Unpin,
{
    if closed.load(Ordering::Acquire) {
        return Err(ConnectionError::Closed);
    }
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

async fn receive_messages<O>(mut reader: OwnedReadHalf, mut output: O, closed: Arc<AtomicBool>)
where
    O: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK_SIZE];

    let reason = loop {
        match reader.read(&mut buf).await {
            Ok(0) => break ConnectionError::PeerClosed,
            Ok(n) => {
                let text = String::from_utf8_lossy(&buf[..n]);
                if let Err(err) = write_line(&mut output, &text).await {
                    warn!(error = ?err, "failed to render message");
                }
            }
            Err(err) => break ConnectionError::from(err),
        }
    };

    closed.store(true, Ordering::Release);
    debug!(reason = %reason, "receiver stopped");
    if let Err(err) = write_line(&mut output, DISCONNECTED_NOTICE).await {
        warn!(error = ?err, "failed to report disconnect");
    }
}

async fn shutdown_connection(writer: &mut OwnedWriteHalf) {
    if let Err(error) = writer.shutdown().await {
        debug!(?error, "failed to shutdown client writer cleanly");
    }
}

async fn write_line<O>(output: &mut O, line: &str) -> std::io::Result<()>
where
    O: AsyncWrite + Unpin,
{
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_failure_raises_closed_flag_and_stops_reading_input() {
        let (mut writer, peer) = tokio::io::duplex(64);
        drop(peer);
        let closed = AtomicBool::new(false);
        let mut input = BufReader::new(&b"hello\nworld\n"[..]);

        send_loop(&mut input, &mut writer, &closed)
            .await
            .expect("send loop should end cleanly");

        assert!(closed.load(Ordering::Acquire));
        let mut rest = String::new();
        input.read_line(&mut rest).await.expect("remaining input");
        assert_eq!(rest, "world\n", "input after the failed send stays unread");
    }

    #[tokio::test]
    async fn raised_flag_skips_the_write() {
        let (mut writer, mut peer) = tokio::io::duplex(64);
        let closed = AtomicBool::new(true);
        let mut input = BufReader::new(&b"hello\n"[..]);

        send_loop(&mut input, &mut writer, &closed)
            .await
            .expect("send loop should end cleanly");

        drop(writer);
        let mut sent = Vec::new();
        peer.read_to_end(&mut sent).await.expect("read peer");
        assert!(sent.is_empty(), "nothing may be written once closed");
    }
}
