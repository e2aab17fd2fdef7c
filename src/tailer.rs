/// Tails the client event feed, emitting new lines as they are appended.
///
/// Uses the `notify` crate to wake on file modifications, then reads from the
/// last known byte offset. A poll timeout covers platforms where change
/// notifications are coalesced or dropped.
///
/// The client truncates the feed when it restarts. If the file shrinks below
/// our offset we start again from byte 0; the engine sees a fresh login.
use anyhow::Result;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;
use tokio::sync::mpsc::Sender;

const POLL_INTERVAL: Duration = Duration::from_millis(600);

pub struct FeedTailer {
    path:     PathBuf,
    position: u64,
    /// Bytes of an unterminated last line, held until its newline arrives.
    partial:  Vec<u8>,
}

impl FeedTailer {
    pub fn new(path: PathBuf) -> Self {
        Self { path, position: 0, partial: Vec::new() }
    }

    /// Read everything appended since the last call. Returns complete lines.
    pub fn read_new_lines(&mut self) -> Result<Vec<String>> {
        let file_len = match std::fs::metadata(&self.path) {
            Ok(m) => m.len(),
            Err(_) => return Ok(Vec::new()), // not created yet
        };

        if file_len < self.position {
            tracing::info!("Event feed truncated, restarting from byte 0");
            self.position = 0;
            self.partial.clear();
        }
        if file_len == self.position {
            return Ok(Vec::new());
        }

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.position))?;
        let mut reader = BufReader::new(file);

        let mut lines = Vec::new();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let n = match reader.read_until(b'\n', &mut buf) {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!("Feed read error at byte {}: {}", self.position, e);
                    break;
                }
            };
            if n == 0 {
                break;
            }
            self.position += n as u64;
            if buf.last() != Some(&b'\n') {
                self.partial.extend_from_slice(&buf);
                continue;
            }

            let mut raw = std::mem::take(&mut self.partial);
            raw.extend_from_slice(&buf);
            match String::from_utf8(raw) {
                Ok(line) => {
                    let line = line.trim_end_matches(['\r', '\n']);
                    if !line.is_empty() {
                        lines.push(line.to_owned());
                    }
                }
                Err(e) => tracing::warn!(
                    "Skipping non-UTF-8 feed line ending at byte {}: {}",
                    self.position,
                    e.utf8_error()
                ),
            }
        }
        Ok(lines)
    }
}

/// Blocking tail loop; run it on a blocking thread.
pub fn run_blocking(path: PathBuf, tx: Sender<String>) -> Result<()> {
    tracing::info!("Tailing event feed: {:?}", path);
    let mut tailer = FeedTailer::new(path.clone());

    let watch_dir = path.parent().map(|p| p.to_path_buf()).unwrap_or_else(|| PathBuf::from("."));
    let (fs_tx, fs_rx) = std_mpsc::channel::<notify::Result<Event>>();
    let mut watcher = RecommendedWatcher::new(fs_tx, notify::Config::default())?;
    watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;

    loop {
        match tailer.read_new_lines() {
            Ok(lines) => {
                for line in lines {
                    if tx.blocking_send(line).is_err() {
                        return Ok(()); // pipeline shutting down
                    }
                }
            }
            Err(e) => tracing::warn!("Event feed unreadable, retrying: {}", e),
        }

        match fs_rx.recv_timeout(POLL_INTERVAL) {
            Ok(Ok(Event { kind: EventKind::Modify(_) | EventKind::Create(_), .. })) => {}
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!("Feed watcher error: {}", e),
            Err(std_mpsc::RecvTimeoutError::Timeout) => {}
            Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    Ok(())
}

pub async fn run(path: PathBuf, tx: Sender<String>) -> Result<()> {
    tokio::task::spawn_blocking(move || run_blocking(path, tx)).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn reads_appended_lines_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feed.jsonl");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "one").unwrap();
        writeln!(f, "two").unwrap();

        let mut t = FeedTailer::new(path.clone());
        assert_eq!(t.read_new_lines().unwrap(), vec!["one", "two"]);
        assert!(t.read_new_lines().unwrap().is_empty());

        writeln!(f, "three").unwrap();
        assert_eq!(t.read_new_lines().unwrap(), vec!["three"]);
    }

    #[test]
    fn holds_partial_line_until_newline() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feed.jsonl");
        let mut f = File::create(&path).unwrap();
        write!(f, "{{\"event\":").unwrap();
        f.flush().unwrap();

        let mut t = FeedTailer::new(path.clone());
        assert!(t.read_new_lines().unwrap().is_empty());

        writeln!(f, "\"tick\",\"tick\":1}}").unwrap();
        assert_eq!(t.read_new_lines().unwrap(), vec![r#"{"event":"tick","tick":1}"#]);
    }

    #[test]
    fn restarts_after_truncation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feed.jsonl");
        std::fs::write(&path, "a long first line\n").unwrap();

        let mut t = FeedTailer::new(path.clone());
        assert_eq!(t.read_new_lines().unwrap().len(), 1);

        std::fs::write(&path, "b\n").unwrap();
        assert_eq!(t.read_new_lines().unwrap(), vec!["b"]);
    }

    #[test]
    fn skips_invalid_utf8_line_and_keeps_neighbours() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feed.jsonl");
        let mut f = File::create(&path).unwrap();
        f.write_all(b"{\"event\":\"tick\",\"tick\":1}\n").unwrap();
        f.write_all(b"\xff\xfe garbage\n").unwrap();
        f.write_all(b"{\"event\":\"tick\",\"tick\":2}\n").unwrap();
        f.flush().unwrap();

        let mut t = FeedTailer::new(path.clone());
        assert_eq!(
            t.read_new_lines().unwrap(),
            vec![r#"{"event":"tick","tick":1}"#, r#"{"event":"tick","tick":2}"#]
        );

        writeln!(f, "{{\"event\":\"tick\",\"tick\":3}}").unwrap();
        assert_eq!(t.read_new_lines().unwrap(), vec![r#"{"event":"tick","tick":3}"#]);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempdir().unwrap();
        let mut t = FeedTailer::new(dir.path().join("absent.jsonl"));
        assert!(t.read_new_lines().unwrap().is_empty());
    }
}
