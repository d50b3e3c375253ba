//! Resumable chunked upload used by the panorama host.
//!
//! A session is opened with a `start` command, the file is sent in
//! [`CHUNK_SIZE`] pieces with `upload` commands, and the stream is closed
//! by a final `upload, finalize` command carrying the remainder (possibly
//! empty). Each chunk is retried on transient failure with exponential
//! backoff; the attempt counter restarts for every chunk.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::Result;

/// Size of every chunk except the last.
pub const CHUNK_SIZE: u64 = 3 * 1024 * 1024;

pub const HEADER_PROTOCOL: &str = "X-Goog-Upload-Protocol";
pub const HEADER_COMMAND: &str = "X-Goog-Upload-Command";
pub const HEADER_OFFSET: &str = "X-Goog-Upload-Offset";
pub const HEADER_TOTAL_LENGTH: &str = "X-Goog-Upload-Header-Content-Length";
pub const HEADER_TOTAL_TYPE: &str = "X-Goog-Upload-Header-Content-Type";
/// Response header carrying the session URL chunks are sent to.
pub const HEADER_SESSION_URL: &str = "X-Goog-Upload-URL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadCommand {
    Start,
    Upload,
    Finalize,
}

impl UploadCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadCommand::Start => "start",
            UploadCommand::Upload => "upload",
            UploadCommand::Finalize => "upload, finalize",
        }
    }
}

/// One planned chunk transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub offset: u64,
    pub len: u64,
    pub command: UploadCommand,
}

/// Split `total` bytes into full `chunk_size` uploads followed by one
/// finalize chunk holding the remainder.
pub fn plan_chunks(total: u64, chunk_size: u64) -> Vec<Chunk> {
    let full = total / chunk_size;
    let mut chunks: Vec<Chunk> = (0..full)
        .map(|i| Chunk {
            offset: i * chunk_size,
            len: chunk_size,
            command: UploadCommand::Upload,
        })
        .collect();
    chunks.push(Chunk {
        offset: full * chunk_size,
        len: total % chunk_size,
        command: UploadCommand::Finalize,
    });
    chunks
}

/// Headers of the request that opens an upload session.
pub fn start_headers(total: u64, content_type: &str) -> Vec<(&'static str, String)> {
    vec![
        ("Content-Length", "0".to_string()),
        (HEADER_PROTOCOL, "resumable".to_string()),
        (HEADER_TOTAL_LENGTH, total.to_string()),
        (HEADER_TOTAL_TYPE, content_type.to_string()),
        (HEADER_COMMAND, UploadCommand::Start.as_str().to_string()),
    ]
}

/// Headers of a single chunk transmission.
pub fn chunk_headers(chunk: &Chunk) -> Vec<(&'static str, String)> {
    vec![
        ("Content-Length", chunk.len.to_string()),
        (HEADER_COMMAND, chunk.command.as_str().to_string()),
        (HEADER_OFFSET, chunk.offset.to_string()),
    ]
}

/// MIME type announced for an image file, from its extension.
pub fn content_type_for(path: &Path) -> String {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg".to_string(),
        "tif" | "tiff" => "image/tiff".to_string(),
        "" => "application/octet-stream".to_string(),
        other => format!("image/{other}"),
    }
}

/// Wire side of the protocol.
pub trait UploadTransport {
    /// Open a session for `total` bytes at `upload_url`; returns the session URL.
    fn start(&mut self, upload_url: &str, total: u64, content_type: &str) -> Result<String>;

    /// Send one chunk to the session URL.
    fn send_chunk(&mut self, session_url: &str, chunk: &Chunk, body: Vec<u8>) -> Result<()>;
}

/// Blocking wait between retries.
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

/// Sleeps the current thread.
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Wait before retry number `attempt` (0-based): `2^attempt` seconds.
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt))
}

/// Drives one file through the start/upload/finalize sequence.
pub struct ResumableUpload<'a, T: UploadTransport, S: Sleeper> {
    transport: &'a mut T,
    sleeper: &'a mut S,
    chunk_size: u64,
}

impl<'a, T: UploadTransport, S: Sleeper> ResumableUpload<'a, T, S> {
    pub fn new(transport: &'a mut T, sleeper: &'a mut S) -> Self {
        Self {
            transport,
            sleeper,
            chunk_size: CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Upload `path` to the session reference `upload_url`.
    ///
    /// Transient failures are retried forever; any other error ends the
    /// upload and is returned unchanged.
    pub fn run(&mut self, upload_url: &str, path: &Path) -> Result<()> {
        let mut file = File::open(path)?;
        let total = file.metadata()?.len();
        let content_type = content_type_for(path);

        let session_url = self.transport.start(upload_url, total, &content_type)?;
        debug!(path = %path.display(), total, "upload session opened");

        for chunk in plan_chunks(total, self.chunk_size) {
            let body = read_chunk(&mut file, &chunk)?;
            self.send_with_retry(&session_url, &chunk, body)?;
        }
        Ok(())
    }

    fn send_with_retry(&mut self, session_url: &str, chunk: &Chunk, body: Vec<u8>) -> Result<()> {
        let mut attempt: u32 = 0;
        loop {
            match self.transport.send_chunk(session_url, chunk, body.clone()) {
                Ok(()) => return Ok(()),
                Err(err) if err.is_transient() => {
                    let delay = backoff_delay(attempt);
                    warn!(
                        offset = chunk.offset,
                        attempt,
                        wait_secs = delay.as_secs(),
                        error = %err,
                        "network error, retrying chunk"
                    );
                    self.sleeper.sleep(delay);
                    attempt = attempt.saturating_add(1);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn read_chunk(file: &mut File, chunk: &Chunk) -> Result<Vec<u8>> {
    file.seek(SeekFrom::Start(chunk.offset))?;
    let mut body = Vec::with_capacity(chunk.len as usize);
    file.by_ref().take(chunk.len).read_to_end(&mut body)?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Backend;
    use crate::error::Error;

    const MIB: u64 = 1024 * 1024;

    #[derive(Default)]
    struct RecordingTransport {
        started: Vec<(String, u64, String)>,
        sent: Vec<(Chunk, usize)>,
        /// Scripted failures, consumed front to back on each send.
        failures: Vec<Error>,
    }

    impl UploadTransport for RecordingTransport {
        fn start(&mut self, upload_url: &str, total: u64, content_type: &str) -> Result<String> {
            self.started
                .push((upload_url.to_string(), total, content_type.to_string()));
            Ok("https://upload.example/session/1".to_string())
        }

        fn send_chunk(&mut self, session_url: &str, chunk: &Chunk, body: Vec<u8>) -> Result<()> {
            assert_eq!(session_url, "https://upload.example/session/1");
            if !self.failures.is_empty() {
                return Err(self.failures.remove(0));
            }
            self.sent.push((*chunk, body.len()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSleeper {
        waits: Vec<Duration>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&mut self, duration: Duration) {
            self.waits.push(duration);
        }
    }

    fn write_file(dir: &Path, name: &str, len: u64) -> std::path::PathBuf {
        let path = dir.join(name);
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn test_plan_seven_mib() {
        let chunks = plan_chunks(7 * MIB, CHUNK_SIZE);
        assert_eq!(
            chunks,
            vec![
                Chunk { offset: 0, len: 3 * MIB, command: UploadCommand::Upload },
                Chunk { offset: 3_145_728, len: 3 * MIB, command: UploadCommand::Upload },
                Chunk { offset: 6_291_456, len: MIB, command: UploadCommand::Finalize },
            ]
        );
    }

    #[test]
    fn test_plan_exact_multiple_ends_with_empty_finalize() {
        let chunks = plan_chunks(6 * MIB, CHUNK_SIZE);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], Chunk { offset: 6 * MIB, len: 0, command: UploadCommand::Finalize });
    }

    #[test]
    fn test_plan_small_file_is_single_finalize() {
        let chunks = plan_chunks(10, CHUNK_SIZE);
        assert_eq!(chunks, vec![Chunk { offset: 0, len: 10, command: UploadCommand::Finalize }]);
    }

    #[test]
    fn test_upload_seven_mib_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_file(tmp.path(), "pano.JPG", 7 * MIB);

        let mut transport = RecordingTransport::default();
        let mut sleeper = RecordingSleeper::default();
        ResumableUpload::new(&mut transport, &mut sleeper)
            .run("https://upload.example/ref", &path)
            .unwrap();

        assert_eq!(
            transport.started,
            vec![("https://upload.example/ref".to_string(), 7 * MIB, "image/jpeg".to_string())]
        );
        let offsets: Vec<u64> = transport.sent.iter().map(|(c, _)| c.offset).collect();
        assert_eq!(offsets, vec![0, 3_145_728, 6_291_456]);
        let commands: Vec<&str> = transport.sent.iter().map(|(c, _)| c.command.as_str()).collect();
        assert_eq!(commands, vec!["upload", "upload", "upload, finalize"]);
        let sizes: Vec<usize> = transport.sent.iter().map(|(_, n)| *n).collect();
        assert_eq!(sizes, vec![3 * MIB as usize, 3 * MIB as usize, MIB as usize]);
        assert!(sleeper.waits.is_empty());
    }

    #[test]
    fn test_transient_failures_back_off_exponentially() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_file(tmp.path(), "pano.jpg", 25);

        let mut transport = RecordingTransport {
            failures: vec![
                Error::Transient("connection reset".into()),
                Error::Transient("connection reset".into()),
                Error::Transient("connection reset".into()),
            ],
            ..Default::default()
        };
        let mut sleeper = RecordingSleeper::default();
        ResumableUpload::new(&mut transport, &mut sleeper)
            .with_chunk_size(10)
            .run("ref", &path)
            .unwrap();

        assert_eq!(
            sleeper.waits,
            vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)]
        );
        assert_eq!(transport.sent.len(), 3);
    }

    #[test]
    fn test_attempt_counter_resets_per_chunk() {
        struct FlakyEveryChunk {
            pending_failure: bool,
            sent: usize,
        }
        impl UploadTransport for FlakyEveryChunk {
            fn start(&mut self, _: &str, _: u64, _: &str) -> Result<String> {
                Ok("s".to_string())
            }
            fn send_chunk(&mut self, _: &str, _: &Chunk, _: Vec<u8>) -> Result<()> {
                if self.pending_failure {
                    self.pending_failure = false;
                    return Err(Error::Transient("timeout".into()));
                }
                self.pending_failure = true;
                self.sent += 1;
                Ok(())
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let path = write_file(tmp.path(), "pano.jpg", 25);
        let mut transport = FlakyEveryChunk { pending_failure: true, sent: 0 };
        let mut sleeper = RecordingSleeper::default();
        ResumableUpload::new(&mut transport, &mut sleeper)
            .with_chunk_size(10)
            .run("ref", &path)
            .unwrap();

        assert_eq!(transport.sent, 3);
        assert_eq!(sleeper.waits, vec![Duration::from_secs(1); 3]);
    }

    #[test]
    fn test_rejection_is_not_retried() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_file(tmp.path(), "pano.jpg", 25);

        let mut transport = RecordingTransport {
            failures: vec![Error::Rejected {
                backend: Backend::PanoramaHost,
                status: 400,
                message: "bad offset".into(),
            }],
            ..Default::default()
        };
        let mut sleeper = RecordingSleeper::default();
        let err = ResumableUpload::new(&mut transport, &mut sleeper)
            .with_chunk_size(10)
            .run("ref", &path)
            .unwrap_err();

        assert!(matches!(err, Error::Rejected { status: 400, .. }));
        assert!(sleeper.waits.is_empty());
        assert!(transport.sent.is_empty());
    }

    #[test]
    fn test_request_headers() {
        let start = start_headers(7 * MIB, "image/jpeg");
        assert!(start.contains(&(HEADER_COMMAND, "start".to_string())));
        assert!(start.contains(&(HEADER_TOTAL_LENGTH, "7340032".to_string())));
        assert!(start.contains(&(HEADER_PROTOCOL, "resumable".to_string())));

        let last = chunk_headers(&Chunk { offset: 6_291_456, len: MIB, command: UploadCommand::Finalize });
        assert_eq!(
            last,
            vec![
                ("Content-Length", "1048576".to_string()),
                (HEADER_COMMAND, "upload, finalize".to_string()),
                (HEADER_OFFSET, "6291456".to_string()),
            ]
        );
    }

    #[test]
    fn test_backoff_delay() {
        assert_eq!(backoff_delay(0), Duration::from_secs(1));
        assert_eq!(backoff_delay(5), Duration::from_secs(32));
    }
}
