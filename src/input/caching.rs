//! `Caching` input variant: composes a primary input (normally `Http`) with a local disk cache
//! keyed by a stable digest of the URL string.
//!
//! Cache miss: stream through the underlying input, mirroring bytes into a temp file; on `End`,
//! persist the temp file and write a completion marker. Cache hit (marker present): serve bytes
//! straight from disk, no network round-trip. A failed/aborted download never gets a marker, so
//! the next attempt re-downloads rather than serving a truncated file.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::input::{InputEvent, InputStream, StreamPosition};

enum Mode {
    /// Serving bytes from a previously completed cache entry.
    Hit { file: File },
    /// Streaming through the underlying input, mirroring bytes to a temp file.
    Miss {
        write_buf: fs::File,
        temp_path: PathBuf,
    },
    Idle,
}

pub struct CachingInput<I: InputStream> {
    inner: I,
    cache_dir: PathBuf,
    cache_path: PathBuf,
    marker_path: PathBuf,
    max_disk_cache_bytes: u64,
    mode: Mode,
    content_length: u64,
    chunk_size: usize,
    position: StreamPosition,
    scheduled: bool,
}

/// Stable digest over the URL string, used as the cache filename stem.
pub fn cache_key(url: &str) -> String {
    blake3::hash(url.as_bytes()).to_hex().to_string()
}

impl<I: InputStream> CachingInput<I> {
    pub fn new(
        inner: I,
        cache_dir: impl Into<PathBuf>,
        url: &str,
        max_disk_cache_bytes: u64,
        chunk_size: usize,
    ) -> Self {
        let cache_dir = cache_dir.into();
        let key = cache_key(url);
        Self {
            inner,
            cache_path: cache_dir.join(format!("{key}.bin")),
            marker_path: cache_dir.join(format!("{key}.complete")),
            cache_dir,
            max_disk_cache_bytes,
            mode: Mode::Idle,
            content_length: 0,
            chunk_size,
            position: StreamPosition::default(),
            scheduled: true,
        }
    }

    fn is_cache_hit(&self) -> bool {
        self.marker_path.exists() && self.cache_path.exists()
    }

    /// Oldest-first deletion of complete cache entries until the directory is back under
    /// budget. Runs at cache-open time (not only reactively), so a directory that grew past
    /// budget (e.g. after a config change lowering the cap) is brought back under it before the
    /// new entry is written.
    fn sweep_if_over_budget(&self) -> Result<()> {
        fs::create_dir_all(&self.cache_dir)?;

        let mut entries: Vec<(PathBuf, u64, std::time::SystemTime)> = Vec::new();
        let mut total: u64 = 0;

        for entry in fs::read_dir(&self.cache_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("bin") {
                continue;
            }
            let marker = path.with_extension("complete");
            if !marker.exists() {
                continue;
            }
            let metadata = entry.metadata()?;
            total += metadata.len();
            entries.push((path, metadata.len(), metadata.modified()?));
        }

        if total <= self.max_disk_cache_bytes {
            return Ok(());
        }

        entries.sort_by_key(|(_, _, modified)| *modified);
        for (path, size, _) in entries {
            if total <= self.max_disk_cache_bytes {
                break;
            }
            let marker = path.with_extension("complete");
            let _ = fs::remove_file(&marker);
            let _ = fs::remove_file(&path);
            total = total.saturating_sub(size);
        }

        Ok(())
    }

    fn finalize_cache_write(&mut self) -> Result<()> {
        if let Mode::Miss { write_buf, temp_path } = &mut self.mode {
            write_buf.flush()?;
            fs::rename(temp_path, &self.cache_path)?;
            File::create(&self.marker_path)?;
        }
        Ok(())
    }

    fn abandon_cache_write(&mut self) {
        if let Mode::Miss { temp_path, .. } = &self.mode {
            let _ = fs::remove_file(temp_path);
        }
    }
}

impl<I: InputStream> InputStream for CachingInput<I> {
    fn open(&mut self, range: Option<StreamPosition>) -> Result<bool> {
        self.sweep_if_over_budget()?;

        if self.is_cache_hit() {
            let file = File::open(&self.cache_path)?;
            self.content_length = file.metadata()?.len();
            self.mode = Mode::Hit { file };
            self.position = StreamPosition {
                start: 0,
                end: self.content_length,
            };
            return Ok(true);
        }

        let opened = self.inner.open(range)?;
        if !opened {
            return Ok(false);
        }

        let temp = tempfile::NamedTempFile::new_in(&self.cache_dir)?;
        let (write_buf, temp_path) = temp.keep().map_err(|e| Error::network(e.to_string()))?;
        self.mode = Mode::Miss { write_buf, temp_path };
        Ok(true)
    }

    fn close(&mut self) {
        self.abandon_cache_write();
        self.inner.close();
        self.mode = Mode::Idle;
    }

    fn set_scheduled(&mut self, scheduled: bool) {
        self.scheduled = scheduled;
        self.inner.set_scheduled(scheduled);
    }

    fn content_type(&self) -> Option<&str> {
        match &self.mode {
            Mode::Hit { .. } => Some("application/octet-stream"),
            _ => self.inner.content_type(),
        }
    }

    fn content_length(&self) -> u64 {
        self.content_length.max(self.inner.content_length())
    }

    fn position(&self) -> StreamPosition {
        self.position
    }

    fn poll(&mut self) -> Option<InputEvent> {
        if !self.scheduled {
            return None;
        }

        match &mut self.mode {
            Mode::Hit { file } => {
                let mut buf = vec![0u8; self.chunk_size];
                match file.read(&mut buf) {
                    Ok(0) => Some(InputEvent::End),
                    Ok(n) => {
                        buf.truncate(n);
                        self.position.start += n as u64;
                        Some(InputEvent::BytesAvailable(buf))
                    }
                    Err(e) => Some(InputEvent::Error(Error::from(e).to_string())),
                }
            }
            Mode::Miss { .. } => {
                let event = self.inner.poll()?;
                match &event {
                    InputEvent::BytesAvailable(bytes) => {
                        if let Mode::Miss { write_buf, .. } = &mut self.mode {
                            let _ = write_buf.write_all(bytes);
                        }
                        self.position = self.inner.position();
                    }
                    InputEvent::End => {
                        let _ = self.finalize_cache_write();
                    }
                    InputEvent::Error(_) => {
                        self.abandon_cache_write();
                    }
                    _ => {}
                }
                Some(event)
            }
            Mode::Idle => None,
        }
    }
}

pub fn is_path_complete(cache_dir: &Path, url: &str) -> bool {
    let key = cache_key(url);
    cache_dir.join(format!("{key}.complete")).exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::file::FileInput;
    use std::io::Write as _;

    #[test]
    fn cache_key_is_stable_for_same_url() {
        assert_eq!(cache_key("http://a.example/stream"), cache_key("http://a.example/stream"));
        assert_ne!(cache_key("http://a.example/stream"), cache_key("http://b.example/stream"));
    }

    #[test]
    fn miss_then_hit_serves_identical_bytes_without_rereading_source() {
        let tmp_source = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp_source.path(), b"hello cache world").unwrap();

        let cache_dir = tempfile::tempdir().unwrap();
        let url = "http://example.invalid/track.mp3";

        // First run: miss, streams from the file source and writes to the cache.
        {
            let source = FileInput::new(tmp_source.path(), 4);
            let mut input =
                CachingInput::new(source, cache_dir.path(), url, 10 * 1024 * 1024, 4);
            assert!(input.open(None).unwrap());
            let mut collected = Vec::new();
            loop {
                match input.poll() {
                    Some(InputEvent::BytesAvailable(bytes)) => collected.extend(bytes),
                    Some(InputEvent::End) => break,
                    Some(InputEvent::Error(e)) => panic!("unexpected error: {e}"),
                    None => continue,
                    _ => {}
                }
            }
            assert_eq!(collected, b"hello cache world");
        }

        assert!(is_path_complete(cache_dir.path(), url));

        // Second run: hit, serves from disk even though the source file is now gone.
        std::fs::remove_file(tmp_source.path()).ok();
        let source = FileInput::new("/nonexistent/path/should-not-be-opened", 4);
        let mut input = CachingInput::new(source, cache_dir.path(), url, 10 * 1024 * 1024, 4);
        assert!(input.open(None).unwrap());
        let mut collected = Vec::new();
        loop {
            match input.poll() {
                Some(InputEvent::BytesAvailable(bytes)) => collected.extend(bytes),
                Some(InputEvent::End) => break,
                Some(InputEvent::Error(e)) => panic!("unexpected error: {e}"),
                None => continue,
                _ => {}
            }
        }
        assert_eq!(collected, b"hello cache world");
    }

    #[test]
    fn sweep_removes_oldest_complete_entries_over_budget() {
        let cache_dir = tempfile::tempdir().unwrap();
        for i in 0..3 {
            let bin = cache_dir.path().join(format!("{i}.bin"));
            let marker = cache_dir.path().join(format!("{i}.complete"));
            let mut f = File::create(&bin).unwrap();
            f.write_all(&vec![0u8; 100]).unwrap();
            File::create(&marker).unwrap();
        }

        let source = FileInput::new("/nonexistent", 4);
        let input = CachingInput::new(source, cache_dir.path(), "http://x", 150, 4);
        input.sweep_if_over_budget().unwrap();

        let remaining: Vec<_> = fs::read_dir(cache_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("bin"))
            .collect();
        assert!(remaining.len() <= 1);
    }
}
