// Batch feed for cursor-based database sources
//
// The network drivers read a single result set incrementally (a PostgreSQL
// portal, a MySQL or SQL Server row stream). Those readers borrow their
// connection for the whole result set, so each runs in its own task and
// hands finished batches over a bounded channel.

use std::future::Future;

use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::models::{Batch, Row};

/// Cap on the total number of rows read from one result set
#[derive(Debug, Clone, Copy)]
pub struct RowCap {
    remaining: Option<u64>,
}

impl RowCap {
    pub fn new(limit: Option<u64>) -> Self {
        Self { remaining: limit }
    }

    /// Rows the next fetch may ask for, at most `chunk_size`
    pub fn next_fetch(&self, chunk_size: usize) -> usize {
        let chunk_size = chunk_size.max(1);
        match self.remaining {
            Some(remaining) => usize::try_from(remaining).map_or(chunk_size, |r| r.min(chunk_size)),
            None => chunk_size,
        }
    }

    pub fn consume(&mut self, rows: usize) {
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(rows as u64);
        }
    }

    pub fn exhausted(&self) -> bool {
        self.remaining == Some(0)
    }
}

/// Sending half handed to a cursor reader
pub struct BatchSender {
    tx: Sender<Result<Batch>>,
    columns: Vec<String>,
    sent: usize,
}

impl BatchSender {
    pub fn set_columns(&mut self, columns: Vec<String>) {
        self.columns = columns;
    }

    /// Hand one batch to the consumer. Returns `false` once the consumer is
    /// gone, after which the reader should stop.
    pub async fn send(&mut self, rows: Vec<Row>) -> bool {
        self.sent += 1;
        let batch = Batch::try_new(self.columns.clone(), rows);
        self.tx.send(batch).await.is_ok()
    }

    /// Send the trailing rows. A result set without rows still yields one
    /// empty batch so its column names reach the consumer.
    pub async fn finish(&mut self, rows: Vec<Row>) {
        if !rows.is_empty() || self.sent == 0 {
            self.send(rows).await;
        }
    }
}

/// Receiving half, owned by the row source
pub struct BatchFeed {
    rx: Receiver<Result<Batch>>,
    reader: Option<JoinHandle<()>>,
}

impl BatchFeed {
    /// Run `read` in its own task. An error it returns is delivered as the
    /// next batch result.
    pub fn spawn<F, Fut>(read: F) -> Self
    where
        F: FnOnce(BatchSender) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(1);
        let errors = tx.clone();
        let reading = read(BatchSender {
            tx,
            columns: Vec::new(),
            sent: 0,
        });
        let reader = tokio::spawn(async move {
            if let Err(e) = reading.await {
                let _ = errors.send(Err(e)).await;
            }
        });
        Self {
            rx,
            reader: Some(reader),
        }
    }

    pub async fn next(&mut self) -> Result<Option<Batch>> {
        self.rx.recv().await.transpose()
    }

    pub fn stop(&mut self) {
        self.rx.close();
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl Drop for BatchFeed {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConvertError;
    use crate::models::Value;

    #[test]
    fn test_row_cap() {
        let mut cap = RowCap::new(Some(5));
        assert_eq!(cap.next_fetch(4), 4);
        cap.consume(4);
        assert_eq!(cap.next_fetch(4), 1);
        cap.consume(1);
        assert!(cap.exhausted());
        assert_eq!(RowCap::new(None).next_fetch(0), 1);
    }

    #[tokio::test]
    async fn test_feed_delivers_batches_then_ends() {
        let mut feed = BatchFeed::spawn(|mut out| async move {
            out.set_columns(vec!["id".to_string()]);
            out.send(vec![vec![Value::Int(1)], vec![Value::Int(2)]]).await;
            out.finish(vec![vec![Value::Int(3)]]).await;
            Ok(())
        });
        assert_eq!(feed.next().await.unwrap().unwrap().len(), 2);
        assert_eq!(feed.next().await.unwrap().unwrap().len(), 1);
        assert!(feed.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_result_keeps_columns() {
        let mut feed = BatchFeed::spawn(|mut out| async move {
            out.set_columns(vec!["a".to_string(), "b".to_string()]);
            out.finish(Vec::new()).await;
            Ok(())
        });
        let batch = feed.next().await.unwrap().unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.columns().len(), 2);
    }

    #[tokio::test]
    async fn test_reader_error_is_delivered() {
        let mut feed = BatchFeed::spawn(|_| async move {
            Err(ConvertError::SourceRead("connection reset".to_string()))
        });
        assert!(matches!(feed.next().await, Err(ConvertError::SourceRead(_))));
    }

    #[tokio::test]
    async fn test_stop_ends_the_feed() {
        let mut feed = BatchFeed::spawn(|mut out| async move {
            out.set_columns(vec!["n".to_string()]);
            for i in 0.. {
                if !out.send(vec![vec![Value::Int(i)]]).await {
                    break;
                }
            }
            Ok(())
        });
        assert!(feed.next().await.unwrap().is_some());
        feed.stop();
        // at most the one batch already buffered remains
        let mut leftover = 0;
        while feed.next().await.unwrap().is_some() {
            leftover += 1;
        }
        assert!(leftover <= 1);
    }
}
