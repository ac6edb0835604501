use chrono::NaiveDate;
use macaw_domain::ExecutionResult;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

/// Persistent trade log: one JSON line per execution result, rotated
/// daily.
///
/// Files are named `trades-YYYY-MM-DD.jsonl` under the configured
/// directory. Archival of rotated files is handled by an external
/// uploader.
#[derive(Debug)]
pub struct TradeLog {
    dir: PathBuf,
    current: Mutex<Option<(NaiveDate, File)>>,
}

impl TradeLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            current: Mutex::new(None),
        }
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("trades-{}.jsonl", date.format("%Y-%m-%d")))
    }

    /// Appends one result, rotating when the UTC date of the result
    /// differs from the open file's.
    pub async fn append(&self, result: &ExecutionResult) -> io::Result<()> {
        let date = result.timestamp.date_naive();
        let mut line = serde_json::to_vec(result).map_err(io::Error::other)?;
        line.push(b'\n');

        let mut current = self.current.lock().await;
        let rotate = !matches!(&*current, Some((open_date, _)) if *open_date == date);
        if rotate {
            let file = self.open(date).await?;
            if current.is_some() {
                info!(path = %self.path_for(date).display(), "trade log rotated");
            }
            *current = Some((date, file));
        }
        let (_, file) = current.as_mut().expect("file opened above");
        file.write_all(&line).await?;
        file.flush().await
    }

    async fn open(&self, date: NaiveDate) -> io::Result<File> {
        if !Path::new(&self.dir).exists() {
            tokio::fs::create_dir_all(&self.dir).await?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(date))
            .await
    }
}
