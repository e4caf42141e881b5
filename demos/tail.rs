//! Prints the combined logs of a folder, in container order.
//!
//! Usage:
//!     tail /path/to/folder [prefix]
//!
//! New files are picked up every second, and whenever the folder changes.

use std::time::Duration;

use folderplex::FolderReader;

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let folder = args.next().ok_or("missing folder argument")?;
    let prefix = args.next().unwrap_or_default();

    let mut reader = FolderReader::builder(folder)
        .prefix(prefix)
        .poll_interval(Duration::from_secs(1))
        .notify(true)
        .build()
        .await?;

    loop {
        tokio::select! {
            chunk = reader.next_chunk(b'\n') => match chunk? {
                Some(chunk) => {
                    let source = chunk.source().display().to_string();
                    print!("({}) {}", source, String::from_utf8_lossy(chunk.bytes()));
                }
                None => tokio::time::sleep(Duration::from_millis(200)).await,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    reader.close().await?;
    Ok(())
}
