//! Streaming transfer of a resolved stream to disk.

use std::path::Path;

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::UnboundedSender;

use crate::error::DownloadError;
use crate::model::{DownloadEvent, DownloadJob};
use crate::progress::ProgressTracker;

/// Downloads `job` and reports through `events`. Always ends with exactly one
/// `Completed` or `Failed` event.
pub async fn run(
    client: reqwest::Client,
    job: DownloadJob,
    chunk_size: usize,
    events: UnboundedSender<DownloadEvent>,
) {
    let path = job.destination();
    let stream = &job.stream;
    tracing::info!(
        url = %stream.url,
        container = %stream.container,
        codec = %stream.codec,
        bitrate_kbps = ?stream.bitrate_kbps,
        height = ?stream.height,
        size_hint = ?stream.size_hint,
        path = %path.display(),
        "download started"
    );

    let mut file_created = false;
    let result: Result<u64, DownloadError> = async {
        let response = client.get(&job.stream.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus(status.as_u16()));
        }
        let total = response.content_length().filter(|len| *len > 0);
        if total.is_none() {
            tracing::debug!("no content-length, progress will be indeterminate");
        }

        let file = File::create(&path).await?;
        file_created = true;

        let body = response
            .bytes_stream()
            .map(|piece| piece.map_err(DownloadError::from));
        transfer(body, total, file, chunk_size, &events).await
    }
    .await;

    let event = match result {
        Ok(bytes) => {
            tracing::info!(bytes, path = %path.display(), "download completed");
            DownloadEvent::Completed { path }
        }
        Err(err) => {
            tracing::error!(path = %path.display(), "download failed: {err}");
            if file_created {
                remove_partial(&path).await;
            }
            DownloadEvent::Failed {
                category: err.category(),
                message: err.to_string(),
            }
        }
    };
    let _ = events.send(event);
}

async fn remove_partial(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        tracing::warn!(path = %path.display(), "could not remove partial file: {err}");
    }
}

/// Copies `body` into `sink` in chunks of exactly `chunk_size` bytes (the
/// last one may be shorter), emitting progress and throughput after each
/// written chunk. Returns the number of bytes written.
pub async fn transfer<S, W>(
    mut body: S,
    total: Option<u64>,
    mut sink: W,
    chunk_size: usize,
    events: &UnboundedSender<DownloadEvent>,
) -> Result<u64, DownloadError>
where
    S: Stream<Item = Result<Bytes, DownloadError>> + Unpin,
    W: AsyncWrite + Unpin,
{
    let chunk_size = chunk_size.max(1);
    let mut tracker = ProgressTracker::new(total);
    let mut buffer = BytesMut::with_capacity(chunk_size);

    while let Some(piece) = body.next().await {
        let mut piece = piece?;
        while !piece.is_empty() {
            let take = (chunk_size - buffer.len()).min(piece.len());
            buffer.extend_from_slice(&piece.split_to(take));
            if buffer.len() == chunk_size {
                write_chunk(&mut sink, &mut buffer, &mut tracker, events).await?;
            }
        }
    }
    if !buffer.is_empty() {
        write_chunk(&mut sink, &mut buffer, &mut tracker, events).await?;
    }
    sink.flush().await?;

    Ok(tracker.bytes())
}

async fn write_chunk<W>(
    sink: &mut W,
    buffer: &mut BytesMut,
    tracker: &mut ProgressTracker,
    events: &UnboundedSender<DownloadEvent>,
) -> Result<(), DownloadError>
where
    W: AsyncWrite + Unpin,
{
    sink.write_all(&buffer[..]).await?;
    tracker.record(buffer.len());
    buffer.clear();

    let _ = events.send(DownloadEvent::Progress(tracker.progress()));
    if let Some(rate) = tracker.throughput() {
        let _ = events.send(DownloadEvent::Throughput(rate));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CHUNK_SIZE;
    use crate::error::FailureCategory;
    use crate::model::{MediaKind, Progress, StreamDescriptor};
    use futures_util::stream;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

    fn pieces(total: usize, piece: usize) -> Vec<Result<Bytes, DownloadError>> {
        let mut out = Vec::new();
        let mut left = total;
        while left > 0 {
            let n = piece.min(left);
            out.push(Ok(Bytes::from(vec![7u8; n])));
            left -= n;
        }
        out
    }

    fn drain(rx: &mut UnboundedReceiver<DownloadEvent>) -> Vec<DownloadEvent> {
        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        events
    }

    fn percents(events: &[DownloadEvent]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|ev| match ev {
                DownloadEvent::Progress(Progress::Percent(p)) => Some(*p),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn ten_mebibytes_yield_ten_progress_events() {
        let total = 10 * CHUNK_SIZE;
        let (tx, mut rx) = unbounded_channel();
        let mut sink = Vec::new();

        let written = transfer(
            stream::iter(pieces(total, 100_000)),
            Some(total as u64),
            &mut sink,
            CHUNK_SIZE,
            &tx,
        )
        .await
        .unwrap();

        assert_eq!(written, total as u64);
        assert_eq!(sink.len(), total);
        let pcts = percents(&drain(&mut rx));
        assert_eq!(pcts, vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
    }

    #[tokio::test]
    async fn final_progress_is_100_for_any_split() {
        for (total, piece) in [(1usize, 1usize), (999, 10), (4096, 4096), (5000, 333)] {
            let (tx, mut rx) = unbounded_channel();
            transfer(
                stream::iter(pieces(total, piece)),
                Some(total as u64),
                tokio::io::sink(),
                1024,
                &tx,
            )
            .await
            .unwrap();
            let pcts = percents(&drain(&mut rx));
            assert!(pcts.windows(2).all(|w| w[0] <= w[1]));
            assert_eq!(pcts.last(), Some(&100), "total={total} piece={piece}");
        }
    }

    #[tokio::test]
    async fn unknown_size_reports_bytes() {
        let (tx, mut rx) = unbounded_channel();
        transfer(stream::iter(pieces(2500, 700)), None, tokio::io::sink(), 1000, &tx)
            .await
            .unwrap();
        let progress: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|ev| match ev {
                DownloadEvent::Progress(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(
            progress,
            vec![
                Progress::Indeterminate { bytes: 1000 },
                Progress::Indeterminate { bytes: 2000 },
                Progress::Indeterminate { bytes: 2500 },
            ]
        );
    }

    fn is_rate(text: &str) -> bool {
        let Some(number) = text.strip_suffix(" MB/s") else {
            return false;
        };
        let Some((whole, frac)) = number.split_once('.') else {
            return false;
        };
        !whole.is_empty()
            && whole.chars().all(|c| c.is_ascii_digit())
            && frac.len() == 2
            && frac.chars().all(|c| c.is_ascii_digit())
    }

    #[tokio::test]
    async fn throughput_follows_every_chunk() {
        let (tx, mut rx) = unbounded_channel();
        let body = Box::pin(stream::iter(pieces(3000, 1000)).then(|piece| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            piece
        }));

        transfer(body, Some(3000), tokio::io::sink(), 1000, &tx)
            .await
            .unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 6);
        for pair in events.chunks(2) {
            assert!(matches!(pair[0], DownloadEvent::Progress(Progress::Percent(_))));
            match &pair[1] {
                DownloadEvent::Throughput(rate) => assert!(is_rate(rate), "bad rate {rate:?}"),
                other => panic!("expected throughput, got {other:?}"),
            }
        }
    }

    #[test]
    fn rate_format_check() {
        assert!(is_rate("0.19 MB/s"));
        assert!(is_rate("12.00 MB/s"));
        assert!(!is_rate("1.2 MB/s"));
        assert!(!is_rate("1.20 Mbps"));
    }

    #[tokio::test]
    async fn mid_stream_error_stops_the_transfer() {
        let (tx, _rx) = unbounded_channel();
        let mut body = pieces(2048, 1024);
        body.push(Err(DownloadError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ))));
        body.extend(pieces(1024, 1024));

        let err = transfer(stream::iter(body), Some(4096), tokio::io::sink(), 1024, &tx)
            .await
            .unwrap_err();
        assert_eq!(err.category(), FailureCategory::Storage);
    }

    /// Serves one canned HTTP response on a local port.
    async fn serve_once(head: String, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&body).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/media")
    }

    fn job(url: String, dir: &Path) -> DownloadJob {
        DownloadJob {
            stream: StreamDescriptor {
                url,
                kind: MediaKind::Audio,
                container: "m4a".into(),
                codec: "mp4a.40.2".into(),
                label: "128 kbps".into(),
                bitrate_kbps: Some(128),
                height: None,
                fps: None,
                size_hint: None,
            },
            directory: dir.to_path_buf(),
            filename: "Song_20240101_000000.mp3".into(),
        }
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    #[tokio::test]
    async fn downloads_to_disk_and_completes() {
        let dir = tempfile::tempdir().unwrap();
        let body = vec![1u8; 3000];
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let url = serve_once(head, body.clone()).await;
        let job = job(url, dir.path());
        let (tx, mut rx) = unbounded_channel();

        run(client(), job.clone(), 1000, tx).await;

        let events = drain(&mut rx);
        assert_eq!(percents(&events), vec![33, 66, 100]);
        assert_eq!(
            events.last(),
            Some(&DownloadEvent::Completed { path: job.destination() })
        );
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert_eq!(std::fs::read(job.destination()).unwrap(), body);
    }

    #[tokio::test]
    async fn truncated_body_fails_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let head = "HTTP/1.1 200 OK\r\nContent-Length: 5000\r\nConnection: close\r\n\r\n".to_string();
        let url = serve_once(head, vec![1u8; 1500]).await;
        let job = job(url, dir.path());
        let (tx, mut rx) = unbounded_channel();

        run(client(), job.clone(), 1000, tx).await;

        let events = drain(&mut rx);
        assert!(matches!(
            events.last(),
            Some(DownloadEvent::Failed { category: FailureCategory::Network, .. })
        ));
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(!job.destination().exists());
    }

    #[tokio::test]
    async fn http_error_status_fails_without_creating_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let head = "HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string();
        let url = serve_once(head, Vec::new()).await;
        let job = job(url, dir.path());
        let (tx, mut rx) = unbounded_channel();

        run(client(), job.clone(), 1000, tx).await;

        let events = drain(&mut rx);
        assert!(matches!(
            events.as_slice(),
            [DownloadEvent::Failed { category: FailureCategory::HttpStatus, .. }]
        ));
        assert!(!job.destination().exists());
    }

    #[tokio::test]
    async fn unwritable_destination_is_a_storage_failure() {
        let dir = tempfile::tempdir().unwrap();
        let head = "HTTP/1.1 200 OK\r\nContent-Length: 10\r\nConnection: close\r\n\r\n".to_string();
        let url = serve_once(head, vec![0u8; 10]).await;
        let job = job(url, &dir.path().join("missing"));
        let (tx, mut rx) = unbounded_channel();

        run(client(), job, 1000, tx).await;

        assert!(matches!(
            drain(&mut rx).as_slice(),
            [DownloadEvent::Failed { category: FailureCategory::Storage, .. }]
        ));
    }
}
