//! Everything related to reading the folder as one stream.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task;
use std::time::Duration;

use futures_util::stream::Stream as FuturesStream;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;

use crate::config::Builder;
use crate::error::{CloseError, Error};
use crate::scanner::Scanner;
use crate::stream::FileStream;
use crate::watcher::{Batch, Triggers, WatchHandle};

/// A delimiter-terminated piece of one file, or that file's unterminated tail.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Chunk {
    /// The path from where the bytes were read.
    source: PathBuf,
    /// The bytes, including the delimiter if one was found.
    bytes: Vec<u8>,
}

impl Chunk {
    /// Returns a reference to the file from where the bytes were read.
    pub fn source(&self) -> &Path {
        self.source.as_path()
    }

    pub fn bytes(&self) -> &[u8] {
        self.bytes.as_slice()
    }

    /// Returns the internal components that make up a `Chunk`.
    pub fn into_inner(self) -> (PathBuf, Vec<u8>) {
        let Chunk { source, bytes } = self;

        (source, bytes)
    }
}

/// Reads every matching file of a folder as if it was one file.
///
/// ## Read order
///
/// Files are discovered in batches: one when the reader is built, and one per
/// watch loop scan which finds something new. Within a batch files are read
/// input containers first (`i1`, `i2`, ...), then workload containers in name
/// order, then output containers (`o1`, `o2`, ...). A later batch is always
/// read after every file of the earlier ones.
///
/// Every read starts over at the first file and returns data from the first
/// one that has any, so a file that grows after reaching its end is picked
/// up again.
///
/// ## End of stream
///
/// Reaching the end of every known file is not final: with a watch loop
/// running, or files still being written, a later read may return more.
///
/// [`FolderReader`] implements [`tokio::io::AsyncRead`] for raw bytes;
/// [`read_until`](FolderReader::read_until) and
/// [`next_chunk`](FolderReader::next_chunk) read delimited pieces which never
/// span two files.
#[derive(Debug)]
pub struct FolderReader {
    folder: PathBuf,
    streams: Vec<FileStream>,
    batches: mpsc::UnboundedReceiver<Batch>,
    /// Handed to the watch loop when it starts.
    batch_tx: Option<mpsc::UnboundedSender<Batch>>,
    /// Owned here until the watch loop takes it over.
    scanner: Option<Scanner>,
    watch: Option<WatchHandle>,
    /// Stream a pending `poll_read` resumes at, instead of the first one.
    read_cursor: Option<usize>,
    closed: bool,
}

impl FolderReader {
    /// Builds a reader over `folder`, reading files whose name starts with
    /// `prefix` and which are not in `exclusions`.
    ///
    /// Files present now are discovered before this returns. A non-zero
    /// `poll_interval` also starts a watch loop rescanning at that interval.
    pub async fn new<I, S>(
        folder: impl Into<PathBuf>,
        prefix: impl Into<String>,
        exclusions: I,
        poll_interval: Duration,
    ) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Builder::new(folder)
            .prefix(prefix)
            .exclusions(exclusions)
            .poll_interval(poll_interval)
            .build()
            .await
    }

    /// Returns a [`Builder`] for more options.
    pub fn builder(folder: impl Into<PathBuf>) -> Builder {
        Builder::new(folder)
    }

    pub(crate) async fn open(
        folder: PathBuf,
        prefix: String,
        exclusions: HashSet<String>,
        triggers: Triggers,
    ) -> Result<Self, Error> {
        let mut scanner = Scanner::new(folder.clone(), prefix, exclusions);
        let streams = scanner.scan().await.map_err(|source| Error::Scan {
            path: folder.clone(),
            source,
        })?;

        let (batch_tx, batches) = mpsc::unbounded_channel();
        let mut reader = FolderReader {
            folder,
            streams,
            batches,
            batch_tx: Some(batch_tx),
            scanner: Some(scanner),
            watch: None,
            read_cursor: None,
            closed: false,
        };

        if !triggers.is_empty() {
            reader.start_watch(triggers)?;
        }

        Ok(reader)
    }

    pub fn folder(&self) -> &Path {
        self.folder.as_path()
    }

    /// Starts rescanning the folder every `interval`, if not already doing so.
    ///
    /// A zero `interval` starts nothing.
    pub fn watch(&mut self, interval: Duration) -> Result<(), Error> {
        if interval.is_zero() {
            return Ok(());
        }

        self.start_watch(Triggers {
            interval: Some(interval),
            notify: false,
        })
    }

    fn start_watch(&mut self, triggers: Triggers) -> Result<(), Error> {
        if self.closed {
            return Err(Error::Closed);
        }
        self.reclaim_discovery();
        if self.watch.is_some() {
            return Err(Error::AlreadyWatching);
        }

        // Both are present whenever there's no watch loop and not closed
        let (scanner, batch_tx) = match (self.scanner.take(), self.batch_tx.take()) {
            (Some(scanner), Some(batch_tx)) => (scanner, batch_tx),
            _ => return Err(Error::Closed),
        };

        self.watch = Some(WatchHandle::spawn(scanner, triggers, batch_tx)?);

        Ok(())
    }

    pub fn is_watching(&self) -> bool {
        self.watch.as_ref().map_or(false, |w| !w.is_stopped())
    }

    /// Takes discovery back from a watch loop which exited on its own.
    fn reclaim_discovery(&mut self) {
        let reclaimed = match self.watch.as_mut() {
            Some(watch) if watch.is_stopped() => watch.reclaim(),
            _ => return,
        };

        self.watch = None;
        if let Some((scanner, batch_tx)) = reclaimed {
            self.scanner = Some(scanner);
            self.batch_tx = Some(batch_tx);
        }
    }

    /// Runs one discovery pass now, returning the number of new files.
    ///
    /// Only possible while no watch loop is running, as that loop owns
    /// discovery.
    pub async fn rescan(&mut self) -> Result<usize, Error> {
        if self.closed {
            return Err(Error::Closed);
        }

        self.reclaim_discovery();
        let scanner = self.scanner.as_mut().ok_or(Error::AlreadyWatching)?;
        let batch = scanner.scan().await.map_err(|source| Error::Scan {
            path: self.folder.clone(),
            source,
        })?;

        let found = batch.len();
        self.streams.extend(batch);

        Ok(found)
    }

    /// Paths of all files known so far, in read order.
    pub fn sources(&mut self) -> impl Iterator<Item = &Path> + '_ {
        self.take_batches();
        self.streams.iter().map(|s| s.path())
    }

    fn take_batches(&mut self) {
        if self.closed {
            return;
        }
        while let Ok(batch) = self.batches.try_recv() {
            self.streams.extend(batch);
        }
    }

    /// Reads one delimited piece into `buf`, from the first file that has
    /// anything left.
    ///
    /// Returns the number of bytes read, `0` once every file is at its end.
    /// The piece ends with `delim`, or is the unterminated tail of a file;
    /// it never continues into the next file. On error, bytes read so far are
    /// left in `buf` and later files are not tried.
    pub async fn read_until(&mut self, delim: u8, buf: &mut Vec<u8>) -> io::Result<usize> {
        Ok(self
            .read_chunk(delim, buf)
            .await?
            .map_or(0, |(_, read)| read))
    }

    /// Like [`read_until`](FolderReader::read_until), but returns the piece
    /// along with its source, or `None` once every file is at its end.
    ///
    /// On error, bytes read so far are dropped; use
    /// [`read_until`](FolderReader::read_until) to keep them.
    pub async fn next_chunk(&mut self, delim: u8) -> io::Result<Option<Chunk>> {
        let mut bytes = Vec::new();
        let found = self.read_chunk(delim, &mut bytes).await?;

        Ok(found.map(|(index, _)| Chunk {
            source: self.streams[index].path().to_path_buf(),
            bytes,
        }))
    }

    async fn read_chunk(
        &mut self,
        delim: u8,
        buf: &mut Vec<u8>,
    ) -> io::Result<Option<(usize, usize)>> {
        self.take_batches();

        for (index, stream) in self.streams.iter_mut().enumerate() {
            let read = stream.read_until(delim, buf).await?;
            if read > 0 {
                return Ok(Some((index, read)));
            }
        }

        Ok(None)
    }

    /// Turns the reader into a stream of chunks, ending whenever every file is
    /// at its end.
    pub fn chunks(self, delim: u8) -> Chunks {
        Chunks {
            delim,
            state: ChunksState::Idle(self),
        }
    }

    /// Stops the watch loop and releases every file handle.
    ///
    /// All files are released even if some fail; those failures are reported
    /// together as [`Error::Close`]. Afterwards reads only report end of
    /// stream, and closing again does nothing.
    pub async fn close(&mut self) -> Result<(), Error> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Some(mut watch) = self.watch.take() {
            watch.stop().await;
        }
        self.scanner = None;
        self.batch_tx = None;
        self.read_cursor = None;

        // Delivered but never read, still holding open files
        while let Ok(batch) = self.batches.try_recv() {
            self.streams.extend(batch);
        }

        let failures = self
            .streams
            .drain(..)
            .filter_map(|stream| stream.close().err())
            .collect();

        match CloseError::new(failures) {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

impl AsyncRead for FolderReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> task::Poll<io::Result<()>> {
        let this = self.get_mut();
        this.take_batches();

        if buf.remaining() == 0 {
            return task::Poll::Ready(Ok(()));
        }

        // A read starts at the first file, but once a file is pending it
        // resumes there rather than polling the drained ones before it again
        let start = this.read_cursor.take().unwrap_or(0);

        for (index, stream) in this.streams.iter_mut().enumerate().skip(start) {
            let before = buf.filled().len();
            match stream.reader_mut().poll_read(cx, buf) {
                task::Poll::Pending => {
                    this.read_cursor = Some(index);
                    return task::Poll::Pending;
                }
                task::Poll::Ready(res) => res?,
            }

            // Nothing filled means this file is at its end, try the next
            if buf.filled().len() > before {
                return task::Poll::Ready(Ok(()));
            }
        }

        task::Poll::Ready(Ok(()))
    }
}

type ChunkFuture = Pin<Box<dyn Future<Output = (FolderReader, io::Result<Option<Chunk>>)> + Send>>;

enum ChunksState {
    Idle(FolderReader),
    Reading(ChunkFuture),
    Empty,
}

/// Stream of [`Chunk`]s, see [`FolderReader::chunks`].
///
/// Yields `None` whenever every file is at its end; polling again afterwards
/// picks up anything written or discovered since.
pub struct Chunks {
    delim: u8,
    state: ChunksState,
}

impl Chunks {
    /// Returns the reader, unless a read is in progress.
    pub fn into_inner(self) -> Option<FolderReader> {
        match self.state {
            ChunksState::Idle(reader) => Some(reader),
            _ => None,
        }
    }
}

impl fmt::Debug for Chunks {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        let state = match &self.state {
            ChunksState::Idle(_) => "Idle",
            ChunksState::Reading(_) => "Reading(<elided>)",
            ChunksState::Empty => "Empty",
        };

        f.debug_struct("Chunks")
            .field("delim", &self.delim)
            .field("state", &state)
            .finish()
    }
}

impl FuturesStream for Chunks {
    type Item = io::Result<Chunk>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            match std::mem::replace(&mut this.state, ChunksState::Empty) {
                ChunksState::Idle(mut reader) => {
                    // Move the reader into the future, it comes back with the result
                    let delim = this.delim;
                    this.state = ChunksState::Reading(Box::pin(async move {
                        let res = reader.next_chunk(delim).await;
                        (reader, res)
                    }));
                }
                ChunksState::Reading(mut fut) => match fut.as_mut().poll(cx) {
                    task::Poll::Pending => {
                        this.state = ChunksState::Reading(fut);
                        return task::Poll::Pending;
                    }
                    task::Poll::Ready((reader, res)) => {
                        this.state = ChunksState::Idle(reader);
                        return task::Poll::Ready(res.transpose());
                    }
                },
                ChunksState::Empty => return task::Poll::Ready(None),
            }
        }
    }
}
