//! A single discovered file, and the buffered reader serving its content.

use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, ReadBuf};

use crate::error::CloseFailure;
use crate::weight::ContainerKind;

/// What a [`FileStream`] reads from: the opened file, or, if opening it failed,
/// a description of that failure.
#[derive(Debug)]
pub(crate) enum Source {
    File(File),
    Failed(Cursor<Vec<u8>>),
}

impl AsyncRead for Source {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> task::Poll<io::Result<()>> {
        match self.get_mut() {
            Source::File(file) => Pin::new(file).poll_read(cx, buf),
            Source::Failed(message) => Pin::new(message).poll_read(cx, buf),
        }
    }
}

/// Per-file reader state. Created once, the first time its file is seen, and
/// never reopened: once it hits end-of-file it only yields more if the file
/// itself grows.
#[derive(Debug)]
pub(crate) struct FileStream {
    name: String,
    path: PathBuf,
    kind: ContainerKind,
    reader: BufReader<Source>,
}

impl FileStream {
    /// Opens `path` for reading. Failure to open is not an error: the stream
    /// serves a one-line diagnostic in place of the file content.
    pub async fn open(name: String, path: PathBuf, kind: ContainerKind) -> Self {
        let source = match File::open(&path).await {
            Ok(file) => Source::File(file),
            Err(e) => {
                log::error!("Open log file {} error: {}", path.display(), e);
                Source::Failed(Cursor::new(open_failure_message(&path, &e)))
            }
        };

        FileStream {
            name,
            path,
            kind,
            reader: BufReader::new(source),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    #[cfg(test)]
    pub fn is_failed(&self) -> bool {
        matches!(self.reader.get_ref(), Source::Failed(_))
    }

    pub fn reader_mut(&mut self) -> Pin<&mut BufReader<Source>> {
        Pin::new(&mut self.reader)
    }

    pub async fn read_until(&mut self, delim: u8, buf: &mut Vec<u8>) -> io::Result<usize> {
        self.reader.read_until(delim, buf).await
    }

    /// Releases the file handle, if there is one.
    ///
    /// A handle with a blocking operation still in flight cannot be handed back
    /// and is reported; it is dropped regardless and closes once that
    /// operation finishes.
    pub fn close(self) -> Result<(), CloseFailure> {
        let FileStream { path, reader, .. } = self;

        match reader.into_inner() {
            Source::Failed(_) => Ok(()),
            Source::File(file) => match file.try_into_std() {
                Ok(std_file) => {
                    drop(std_file);
                    Ok(())
                }
                Err(_busy) => Err(CloseFailure {
                    path,
                    error: io::Error::new(
                        io::ErrorKind::WouldBlock,
                        "file has an operation in flight",
                    ),
                }),
            },
        }
    }
}

fn open_failure_message(path: &Path, e: &io::Error) -> Vec<u8> {
    format!("Failed to open log file {}, error: {}\n", path.display(), e).into_bytes()
}
