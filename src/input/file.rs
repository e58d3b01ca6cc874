//! `File` input variant: reads a local resource in bounded chunks per poll, no metadata.

use std::fs::File as StdFile;
use std::io::{Read, Seek, SeekFrom};

use crate::error::{Error, Result};
use crate::input::{InputEvent, InputStream, StreamPosition};

pub struct FileInput {
    path: std::path::PathBuf,
    chunk_size: usize,
    file: Option<StdFile>,
    content_length: u64,
    position: StreamPosition,
    scheduled: bool,
    ended: bool,
}

impl FileInput {
    pub fn new(path: impl Into<std::path::PathBuf>, chunk_size: usize) -> Self {
        Self {
            path: path.into(),
            chunk_size,
            file: None,
            content_length: 0,
            position: StreamPosition::default(),
            scheduled: true,
            ended: false,
        }
    }
}

impl InputStream for FileInput {
    fn open(&mut self, range: Option<StreamPosition>) -> Result<bool> {
        let mut file = StdFile::open(&self.path)?;
        self.content_length = file.metadata()?.len();

        let position = range.unwrap_or(StreamPosition {
            start: 0,
            end: self.content_length,
        });
        if position.start > 0 {
            file.seek(SeekFrom::Start(position.start))?;
        }

        self.position = position;
        self.file = Some(file);
        self.ended = false;
        Ok(true)
    }

    fn close(&mut self) {
        self.file = None;
    }

    fn set_scheduled(&mut self, scheduled: bool) {
        self.scheduled = scheduled;
    }

    fn content_type(&self) -> Option<&str> {
        None
    }

    fn content_length(&self) -> u64 {
        self.content_length
    }

    fn position(&self) -> StreamPosition {
        self.position
    }

    fn poll(&mut self) -> Option<InputEvent> {
        if !self.scheduled || self.ended {
            return None;
        }
        let file = self.file.as_mut()?;

        let mut buf = vec![0u8; self.chunk_size];
        match file.read(&mut buf) {
            Ok(0) => {
                self.ended = true;
                Some(InputEvent::End)
            }
            Ok(n) => {
                buf.truncate(n);
                self.position.start += n as u64;
                Some(InputEvent::BytesAvailable(buf))
            }
            Err(e) => {
                self.ended = true;
                Some(InputEvent::Error(Error::from(e).to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_file_in_chunks_then_ends() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[1u8, 2, 3, 4, 5]).unwrap();

        let mut input = FileInput::new(tmp.path(), 2);
        assert!(input.open(None).unwrap());
        assert_eq!(input.content_length(), 5);

        let mut collected = Vec::new();
        loop {
            match input.poll() {
                Some(InputEvent::BytesAvailable(bytes)) => collected.extend(bytes),
                Some(InputEvent::End) => break,
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(collected, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn set_scheduled_false_stops_delivery_without_losing_bytes() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[9u8; 4]).unwrap();

        let mut input = FileInput::new(tmp.path(), 2);
        input.open(None).unwrap();
        input.set_scheduled(false);
        assert!(input.poll().is_none());

        input.set_scheduled(true);
        let Some(InputEvent::BytesAvailable(bytes)) = input.poll() else {
            panic!("expected bytes after resuming schedule");
        };
        assert_eq!(bytes, vec![9, 9]);
    }
}
