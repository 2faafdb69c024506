//! 🎬 *[a source object, uncompressed and proud of it, steps into the bridge]*
//! *[it comes out the other side 80% lighter. it does not remember what happened.]*
//!
//! 🗜️ The compression bridge. Bytes go in raw, bytes come out gzipped, and at no
//! point does anyone hold the whole object in memory.
//!
//! 🧠 Knowledge graph:
//! ```text
//!   source reader ──read──▶ GzEncoder ──drain──▶ PipeWriter ═══▶ PipeReader ──▶ upload
//!   └──────────── copy stage (spawned, always joined) ────────┘   └── current task ──┘
//! ```
//!
//! 🚪 Closing order, on every exit path, happy or otherwise:
//! 1. drop the source reader
//! 2. finish the compressor (clean copy: trailer goes into the pipe) or discard it
//!    and poison the pipe (failed copy: the upload must abort, not commit a
//!    truncated-but-technically-valid gzip)
//! 3. close the pipe's write end
//! 4. the upload returns
//! 5. close the pipe's read end, then join the copy stage
//!
//! Step 5 is what stops a failed upload from leaving the copy stage blocked
//! on a send forever. 🦆

use std::io::{self, Write};

use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use tokio::io::AsyncReadExt;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::JoinSet;
use tracing::trace;

use crate::backends::{ObjectReader, ObjectStore, StoreBackend};
use crate::error::{BridgeError, StageError};
use crate::pipe::{PipeWriter, pipe};

/// 📊 What made it across.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct BridgeStats {
    /// 📥 Uncompressed bytes pulled from the source.
    pub(crate) bytes_read: u64,
    /// 📤 Compressed bytes pushed into the pipe, gzip header and trailer included.
    pub(crate) bytes_written: u64,
}

/// 🧾 The copy stage's report card. Failures travel back to the bridge instead of
/// escaping the task, so the bridge can line them up in one composite error.
#[derive(Debug, Default)]
struct CopyReport {
    stats: BridgeStats,
    failures: Vec<StageError>,
}

/// 🚀 Stream `source` through gzip into `destination_key`.
///
/// Returns the byte counts, or a `BridgeError` listing every failure in the order
/// it was recorded: copy-stage failures first, then the upload's.
pub(crate) async fn compress_and_upload(
    source: ObjectReader,
    destination: &StoreBackend,
    destination_key: &str,
    chunk_size: usize,
) -> Result<BridgeStats, BridgeError> {
    let (writer, mut reader) = pipe();

    // -- 🧵 JoinSet aborts on drop, so the copy stage can't outlive us even if we're cancelled
    let mut copy_stage = JoinSet::new();
    copy_stage.spawn(copy_compressed(source, writer, chunk_size));

    let uploaded = destination.upload(destination_key, &mut reader).await;
    reader.close();

    let mut stats = BridgeStats::default();
    let mut failures = Vec::new();
    while let Some(joined) = copy_stage.join_next().await {
        match joined {
            Ok(report) => {
                stats = report.stats;
                failures.extend(report.failures);
            }
            Err(join_error) => failures.push(StageError::Join(join_error)),
        }
    }
    if let Err(error) = uploaded {
        failures.push(StageError::Write(error));
    }

    if failures.is_empty() {
        Ok(stats)
    } else {
        Err(BridgeError { failures })
    }
}

/// 🗜️ The copy stage. Owns the source reader, the compressor and the pipe's write
/// end, and closes all three before it returns.
async fn copy_compressed(mut source: ObjectReader, writer: PipeWriter, chunk_size: usize) -> CopyReport {
    let mut report = CopyReport::default();
    let mut encoder = GzEncoder::new(Vec::with_capacity(chunk_size), Compression::default());

    let copied = pump(&mut source, &mut encoder, &writer, chunk_size, &mut report.stats).await;
    drop(source);

    match copied {
        Ok(()) => match encoder.finish() {
            Ok(trailer) => {
                report.stats.bytes_written += trailer.len() as u64;
                match writer.send(Bytes::from(trailer)).await {
                    Ok(()) => writer.close(),
                    Err(error) => {
                        report.failures.push(StageError::Write(error.into()));
                        poison(writer).await;
                    }
                }
            }
            Err(error) => {
                report.failures.push(StageError::Close {
                    resource: "compressor",
                    error: error.into(),
                });
                poison(writer).await;
            }
        },
        Err(failure) => {
            // -- 🗑️ no finish(): a trailer now would bless a truncated stream as valid gzip
            drop(encoder);
            report.failures.push(failure);
            poison(writer).await;
        }
    }

    trace!(
        "🗜️ copy stage done: {} bytes in, {} bytes out, {} failure(s)",
        report.stats.bytes_read,
        report.stats.bytes_written,
        report.failures.len()
    );
    report
}

/// 🔥 DEFLATE is CPU work. On the multi-threaded runtime the worker thread is
/// handed over to it and other tasks (this object's upload, for one) move
/// elsewhere. A current-thread runtime has nowhere to move them to.
fn compress_chunk(encoder: &mut GzEncoder<Vec<u8>>, chunk: &[u8]) -> io::Result<()> {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => {
            tokio::task::block_in_place(|| encoder.write_all(chunk))
        }
        _ => encoder.write_all(chunk),
    }
}

async fn pump(
    source: &mut ObjectReader,
    encoder: &mut GzEncoder<Vec<u8>>,
    writer: &PipeWriter,
    chunk_size: usize,
    stats: &mut BridgeStats,
) -> Result<(), StageError> {
    let mut buffer = vec![0u8; chunk_size];
    loop {
        let read = source
            .read(&mut buffer)
            .await
            .map_err(|error| StageError::Read(error.into()))?;
        if read == 0 {
            return Ok(());
        }
        stats.bytes_read += read as u64;

        compress_chunk(encoder, &buffer[..read])
            .map_err(|error| StageError::Compress(error.into()))?;

        // -- 🚰 whatever the encoder produced so far goes down the hose right now
        let compressed = std::mem::take(encoder.get_mut());
        stats.bytes_written += compressed.len() as u64;
        writer
            .send(Bytes::from(compressed))
            .await
            .map_err(|error| StageError::Write(error.into()))?;
    }
}

/// ☠️ Tell the upload this stream is garbage. If the reader already hung up there
/// is nobody to tell, which is fine.
async fn poison(writer: PipeWriter) {
    let _ = writer
        .close_with_error(io::Error::other("compressed stream aborted by the copy stage"))
        .await;
}
