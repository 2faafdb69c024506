//! 🚰 The pipe — a garden hose between the compressor and the uploader.
//!
//! The compressor pushes chunks in one end, the upload pulls them out the other.
//! The hose holds exactly one chunk. If the uploader is slow, the compressor waits.
//! If the compressor is slow, the uploader waits. Nobody hoards a whole object in RAM.
//! Backpressure: it's like a polite queue at a British bus stop, but for bytes.
//!
//! 🧠 Knowledge graph:
//! - `PipeWriter` → owned by the copy stage, closed exactly once (`close` or `close_with_error`)
//! - `PipeReader` → borrowed by `ObjectStore::upload`, closed by the bridge after upload returns
//! - An `Err` chunk poisons the stream: the upload sees an error instead of a clean EOF,
//!   which is how a failed copy stops a truncated object from being committed.
//! - Closing the reader makes any pending or future `send` fail with `BrokenPipe`,
//!   which is how a failed upload unblocks a compressor stuck mid-send.

use std::io;

use async_channel::{Receiver, Sender};
use bytes::Bytes;

/// 📏 One chunk in flight, tops. Synchronous-ish handoff.
const PIPE_CAPACITY_CHUNKS: usize = 1;

type Chunk = io::Result<Bytes>;

/// 🔧 Build a fresh pipe. Two ends, one hose, zero buffering ambitions.
pub(crate) fn pipe() -> (PipeWriter, PipeReader) {
    let (tx, rx) = async_channel::bounded(PIPE_CAPACITY_CHUNKS);
    (PipeWriter { tx }, PipeReader { rx })
}

/// ✍️ The write end. Belongs to the copy stage.
#[derive(Debug)]
pub(crate) struct PipeWriter {
    tx: Sender<Chunk>,
}

impl PipeWriter {
    /// 📤 Hand a chunk to the reader. Waits while the hose is full.
    /// Empty chunks are skipped; the reader would only mistake them for nothing.
    pub(crate) async fn send(&self, chunk: Bytes) -> io::Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.tx.send(Ok(chunk)).await.map_err(|_| broken_pipe())
    }

    /// 🏁 Signal end-of-stream. Whatever is still in the hose can still be read.
    pub(crate) fn close(self) {
        self.tx.close();
    }

    /// ☠️ Poison the stream, then close. The reader gets `error` instead of EOF.
    /// Fails only when the reader already hung up, in which case there is nobody
    /// left to warn.
    pub(crate) async fn close_with_error(self, error: io::Error) -> io::Result<()> {
        let sent = self.tx.send(Err(error)).await.map_err(|_| broken_pipe());
        self.tx.close();
        sent
    }
}

/// 📥 The read end. Upload implementations pull from it until `None`.
#[derive(Debug)]
pub struct PipeReader {
    rx: Receiver<Chunk>,
}

impl PipeReader {
    /// 📄 The next compressed chunk, `None` at end-of-stream, `Err` if the writer
    /// poisoned the stream.
    pub async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        match self.rx.recv().await {
            Ok(Ok(chunk)) => Ok(Some(chunk)),
            Ok(Err(error)) => Err(error),
            // -- 🏁 closed and drained: the writer said goodbye properly
            Err(_) => Ok(None),
        }
    }

    /// 🚪 Hang up. Any writer waiting on a send gets `BrokenPipe` instead of waiting forever.
    pub(crate) fn close(&self) {
        self.rx.close();
    }
}

fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn the_one_where_chunks_arrive_in_order_and_then_eof() {
        let (writer, mut reader) = pipe();

        let the_producer = tokio::spawn(async move {
            for chunk in ["squeeze", "", "the", "bytes"] {
                writer.send(Bytes::from(chunk)).await?;
            }
            writer.close();
            io::Result::Ok(())
        });

        let mut the_received = Vec::new();
        while let Some(chunk) = reader.next_chunk().await.expect("no poison expected") {
            the_received.push(chunk);
        }

        the_producer
            .await
            .expect("producer task panicked")
            .expect("producer send failed");
        // -- 🕳️ the empty chunk never made it into the hose
        assert_eq!(
            the_received,
            vec![
                Bytes::from("squeeze"),
                Bytes::from("the"),
                Bytes::from("bytes")
            ]
        );
    }

    #[tokio::test]
    async fn the_one_where_a_full_hose_makes_the_writer_wait() {
        let (writer, mut reader) = pipe();

        writer
            .send(Bytes::from("first"))
            .await
            .expect("the first chunk fits");

        // -- ⏳ hose is full: the second send has to wait for the reader
        let the_second_send = tokio::time::timeout(
            Duration::from_millis(50),
            writer.send(Bytes::from("second")),
        )
        .await;
        assert!(the_second_send.is_err(), "backpressure went missing");

        assert_eq!(
            reader.next_chunk().await.expect("clean read"),
            Some(Bytes::from("first"))
        );
        writer
            .send(Bytes::from("second"))
            .await
            .expect("room again after a read");
    }

    #[tokio::test]
    async fn the_one_where_the_reader_hangs_up_and_the_writer_notices() {
        let (writer, reader) = pipe();
        writer.send(Bytes::from("fills the hose")).await.expect("fits");

        let the_blocked_send = tokio::spawn(async move {
            let result = writer.send(Bytes::from("stuck")).await;
            (writer, result)
        });

        reader.close();

        let (writer, result) = the_blocked_send.await.expect("send task panicked");
        assert_eq!(
            result.expect_err("a closed reader must fail the send").kind(),
            io::ErrorKind::BrokenPipe
        );
        assert!(writer.close_with_error(io::Error::other("late")).await.is_err());
    }

    #[tokio::test]
    async fn the_one_where_poison_reaches_the_reader_instead_of_eof() {
        let (writer, mut reader) = pipe();

        let the_producer = tokio::spawn(async move {
            writer.send(Bytes::from("partial")).await?;
            writer
                .close_with_error(io::Error::other("source went away"))
                .await
        });

        assert_eq!(
            reader.next_chunk().await.expect("first chunk is fine"),
            Some(Bytes::from("partial"))
        );
        let the_poison = reader
            .next_chunk()
            .await
            .expect_err("the stream should be poisoned");
        assert!(the_poison.to_string().contains("source went away"));

        the_producer
            .await
            .expect("producer panicked")
            .expect("poison delivery failed");
    }
}
