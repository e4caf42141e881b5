//! Options for building a [`FolderReader`].

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Error;
use crate::reader::FolderReader;
use crate::watcher::Triggers;

/// Configures and builds a [`FolderReader`].
///
/// ```no_run
/// use std::time::Duration;
/// use folderplex::FolderReader;
///
/// # async fn run() -> Result<(), folderplex::Error> {
/// let reader = FolderReader::builder("/var/log/step")
///     .prefix("step-")
///     .exclude("step-debug")
///     .poll_interval(Duration::from_secs(1))
///     .notify(true)
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Builder {
    folder: PathBuf,
    prefix: String,
    exclusions: HashSet<String>,
    poll_interval: Option<Duration>,
    notify: bool,
}

impl Builder {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Builder {
            folder: folder.into(),
            prefix: String::new(),
            exclusions: HashSet::new(),
            poll_interval: None,
            notify: false,
        }
    }

    /// Only files whose name starts with `prefix` are read. The prefix is
    /// stripped before the name is classified as an input, output or
    /// workload container. Empty by default, matching every file.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Never reads the file with this exact name.
    pub fn exclude(mut self, name: impl Into<String>) -> Self {
        self.exclusions.insert(name.into());
        self
    }

    pub fn exclusions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclusions.extend(names.into_iter().map(Into::into));
        self
    }

    /// Rescan the folder for new files at this interval. Zero, the default,
    /// disables polling.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval).filter(|d| !d.is_zero());
        self
    }

    /// Also rescan whenever the folder reports a filesystem event.
    pub fn notify(mut self, enabled: bool) -> Self {
        self.notify = enabled;
        self
    }

    /// Discovers the files present now, then starts the watch loop if polling
    /// or notify is enabled.
    ///
    /// Fails if the folder cannot be read, or the watch loop cannot start.
    pub async fn build(self) -> Result<FolderReader, Error> {
        let triggers = Triggers {
            interval: self.poll_interval,
            notify: self.notify,
        };

        FolderReader::open(self.folder, self.prefix, self.exclusions, triggers).await
    }
}
