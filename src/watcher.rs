//! The background task picking up files created after construction.

use std::future;
use std::time::Duration;

use futures_util::FutureExt;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use crate::error::Error;
use crate::scanner::Scanner;
use crate::stream::FileStream;

/// Streams discovered by one scan, already in read order.
pub(crate) type Batch = Vec<FileStream>;

type Wakes = mpsc::UnboundedReceiver<Result<notify::Event, notify::Error>>;

/// What the watch loop owns while running, handed back once it exits.
pub(crate) type Discovery = (Scanner, mpsc::UnboundedSender<Batch>);

/// What makes the watch loop rescan.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct Triggers {
    pub interval: Option<Duration>,
    pub notify: bool,
}

impl Triggers {
    pub fn is_empty(&self) -> bool {
        self.interval.is_none() && !self.notify
    }
}

/// Handle to a running watch loop. Stopping is one-shot; stopping again, or
/// dropping the handle, is harmless.
#[derive(Debug)]
pub(crate) struct WatchHandle {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Discovery>>,
}

impl WatchHandle {
    /// Starts the loop on the current Tokio runtime. `scanner` moves into the
    /// task, and each non-empty scan result is sent through `batches`.
    pub fn spawn(
        scanner: Scanner,
        triggers: Triggers,
        batches: mpsc::UnboundedSender<Batch>,
    ) -> Result<Self, Error> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_e| Error::NoRuntime)?;

        let ticker = triggers.interval.filter(|d| !d.is_zero()).map(|period| {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        let (watcher, wakes) = if triggers.notify {
            let (watcher, wakes) = fs_events(&scanner)?;
            (Some(watcher), Some(wakes))
        } else {
            (None, None)
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = runtime.spawn(run(scanner, ticker, watcher, wakes, batches, stop_rx));

        Ok(WatchHandle {
            stop: Some(stop_tx),
            task: Some(task),
        })
    }

    /// Signals the loop and waits for it to exit, returning what it owned.
    pub async fn stop(&mut self) -> Option<Discovery> {
        if let Some(stop) = self.stop.take() {
            // Loop may have exited on its own already
            let _ = stop.send(());
        }

        match self.task.take()?.await {
            Ok(discovery) => Some(discovery),
            Err(e) => {
                log::warn!("Folder watcher task failed: {}", e);
                None
            }
        }
    }

    /// Stopped on request, or exited on its own.
    pub fn is_stopped(&self) -> bool {
        self.stop.is_none() || self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Takes back what the loop owned, if it has already exited.
    pub fn reclaim(&mut self) -> Option<Discovery> {
        if !self.task.as_ref()?.is_finished() {
            return None;
        }

        match self.task.take()?.now_or_never()? {
            Ok(discovery) => Some(discovery),
            Err(e) => {
                log::warn!("Folder watcher task failed: {}", e);
                None
            }
        }
    }
}

fn fs_events(scanner: &Scanner) -> Result<(RecommendedWatcher, Wakes), Error> {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        // The receiver only goes away with the watch loop, which also owns
        // this watcher.
        let _ = tx.send(res);
    })?;

    watcher.watch(scanner.folder(), RecursiveMode::NonRecursive)?;

    Ok((watcher, rx))
}

async fn run(
    mut scanner: Scanner,
    mut ticker: Option<Interval>,
    _watcher: Option<RecommendedWatcher>,
    mut wakes: Option<Wakes>,
    batches: mpsc::UnboundedSender<Batch>,
    mut stop: oneshot::Receiver<()>,
) -> Discovery {
    loop {
        tokio::select! {
            biased;

            // A dropped sender means the reader is gone, so stop as well
            _ = &mut stop => break,
            _ = tick(&mut ticker) => {}
            wake = next_wake(&mut wakes) => match wake {
                Some(Ok(event)) => log::trace!("{:?}", event),
                Some(Err(e)) => log::warn!("Folder event error: {}", e),
                None => {
                    wakes = None;
                    if ticker.is_none() {
                        // Nothing left that could trigger a scan
                        break;
                    }
                    continue;
                }
            },
        }

        match scanner.scan().await {
            Ok(batch) if batch.is_empty() => {}
            Ok(batch) => {
                log::debug!(
                    "Found {} new file(s) in {}",
                    batch.len(),
                    scanner.folder().display()
                );
                if batches.send(batch).is_err() {
                    break;
                }
            }
            Err(e) => log::warn!(
                "Failed to rescan folder {}: {}",
                scanner.folder().display(),
                e
            ),
        }
    }

    log::info!("Stopped folder watcher: {}", scanner.folder().display());

    (scanner, batches)
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => future::pending().await,
    }
}

async fn next_wake(wakes: &mut Option<Wakes>) -> Option<Result<notify::Event, notify::Error>> {
    match wakes {
        Some(wakes) => wakes.recv().await,
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;
    use tokio::time::timeout;

    fn scanner(folder: &Path) -> Scanner {
        Scanner::new(folder.to_path_buf(), "p-".to_string(), Default::default())
    }

    #[tokio::test]
    async fn test_ticks_deliver_batches() {
        let dir = tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let triggers = Triggers {
            interval: Some(Duration::from_millis(20)),
            notify: false,
        };
        std::fs::write(dir.path().join("p-o1"), b"x").unwrap();
        std::fs::write(dir.path().join("p-i1"), b"x").unwrap();

        let mut handle = WatchHandle::spawn(scanner(dir.path()), triggers, tx).unwrap();

        let batch = timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let names: Vec<_> = batch.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["p-i1", "p-o1"]);

        handle.stop().await;
        assert!(handle.is_stopped());

        // Loop exited, so the sender is gone
        assert!(timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .is_none());

        // Second stop is a no-op
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_stops_when_reader_dropped() {
        let dir = tempdir().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        let triggers = Triggers {
            interval: Some(Duration::from_millis(10)),
            notify: false,
        };
        let mut handle = WatchHandle::spawn(scanner(dir.path()), triggers, tx).unwrap();
        drop(rx);

        assert!(!handle.is_stopped());
        assert!(handle.reclaim().is_none());

        std::fs::write(dir.path().join("p-main"), b"x").unwrap();

        // Exits on its own, without being asked to stop
        timeout(Duration::from_secs(2), async {
            while !handle.is_stopped() {
                time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let (mut scanner, _batches) = handle.reclaim().unwrap();
        assert_eq!(scanner.folder(), dir.path());

        // The seen-set comes back too
        std::fs::write(dir.path().join("p-i1"), b"x").unwrap();
        let streams = scanner.scan().await.unwrap();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].name(), "p-i1");

        assert!(handle.reclaim().is_none());
        assert!(handle.stop().await.is_none());
    }

    #[tokio::test]
    async fn test_notify_without_ticker() {
        let dir = tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let triggers = Triggers {
            interval: None,
            notify: true,
        };
        let mut handle = WatchHandle::spawn(scanner(dir.path()), triggers, tx).unwrap();

        std::fs::write(dir.path().join("p-main"), b"x").unwrap();

        let batch = timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].name(), "p-main");

        handle.stop().await;
    }

    #[test]
    fn test_spawn_outside_runtime() {
        let dir = tempdir().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();

        let triggers = Triggers {
            interval: Some(Duration::from_millis(10)),
            notify: false,
        };
        assert!(matches!(
            WatchHandle::spawn(scanner(dir.path()), triggers, tx),
            Err(Error::NoRuntime)
        ));
    }
}
