// JSON document source
//
// A top-level array is streamed element by element; JSON Lines are streamed
// line by line. Any other root value is read whole into a single batch.

use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::thread;

use serde::de::{self, Deserializer as _, SeqAccess, Visitor};
use serde_json::Value as JsonValue;
use tokio::sync::mpsc::{self, Receiver, Sender};

use super::adapter::RowSource;
use super::{batch_from_json, open_reader};
use crate::error::{ConvertError, Result};
use crate::models::Batch;

type Input = BufReader<Box<dyn Read + Send>>;

enum Mode {
    Array(Receiver<Result<JsonValue>>),
    Lines { reader: Input, line_no: usize },
    Whole(Option<JsonValue>),
    Closed,
}

pub struct DocumentSource {
    name: String,
    mode: Mode,
    chunk_size: usize,
    streaming: bool,
}

impl DocumentSource {
    /// Open a `.json` document
    pub fn open(path: &Path, chunk_size: usize) -> Result<Self> {
        Self::from_reader(path.display().to_string(), open_reader(path)?, chunk_size)
    }

    /// Open a JSON Lines file: one JSON value per non-blank line
    pub fn open_lines(path: &Path, chunk_size: usize) -> Result<Self> {
        Ok(Self {
            name: path.display().to_string(),
            mode: Mode::Lines {
                reader: BufReader::new(open_reader(path)?),
                line_no: 0,
            },
            chunk_size: chunk_size.max(1),
            streaming: true,
        })
    }

    pub fn from_reader(name: String, input: Box<dyn Read + Send>, chunk_size: usize) -> Result<Self> {
        let mut reader = BufReader::new(input);
        skip_whitespace(&mut reader)?;

        let chunk_size = chunk_size.max(1);
        let mode = if peek(&mut reader)? == Some(b'[') {
            Mode::Array(spawn_array_reader(name.clone(), reader, chunk_size))
        } else {
            let root: JsonValue = serde_json::from_reader(reader)
                .map_err(|e| ConvertError::SourceRead(format!("invalid JSON in '{}': {}", name, e)))?;
            Mode::Whole(Some(root))
        };
        let streaming = matches!(mode, Mode::Array(_));

        Ok(Self {
            name,
            mode,
            chunk_size,
            streaming,
        })
    }

    async fn next_nodes(&mut self) -> Result<Vec<JsonValue>> {
        let mut nodes = Vec::new();
        match &mut self.mode {
            Mode::Array(elements) => {
                while nodes.len() < self.chunk_size {
                    match elements.recv().await {
                        Some(node) => nodes.push(node?),
                        None => break,
                    }
                }
            }
            Mode::Lines { reader, line_no } => {
                let mut line = String::new();
                while nodes.len() < self.chunk_size {
                    line.clear();
                    if reader.read_line(&mut line)? == 0 {
                        break;
                    }
                    *line_no += 1;
                    if line.trim().is_empty() {
                        continue;
                    }
                    let node = serde_json::from_str(&line).map_err(|e| {
                        ConvertError::SourceRead(format!(
                            "invalid JSON on line {} of '{}': {}",
                            line_no, self.name, e
                        ))
                    })?;
                    nodes.push(node);
                }
            }
            Mode::Whole(root) => {
                if let Some(root) = root.take() {
                    nodes.push(root);
                }
            }
            Mode::Closed => {}
        }
        Ok(nodes)
    }
}

#[async_trait::async_trait]
impl RowSource for DocumentSource {
    fn describe(&self) -> String {
        format!("JSON document '{}'", self.name)
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn next_batch(&mut self) -> Result<Option<Batch>> {
        let nodes = self.next_nodes().await?;
        if nodes.is_empty() {
            self.mode = Mode::Closed;
            return Ok(None);
        }
        tracing::debug!("Read {} JSON records from {}", nodes.len(), self.name);
        Ok(Some(batch_from_json(nodes)))
    }

    async fn close(&mut self) -> Result<()> {
        self.mode = Mode::Closed;
        Ok(())
    }
}

fn peek<R: BufRead>(reader: &mut R) -> Result<Option<u8>> {
    Ok(reader.fill_buf()?.first().copied())
}

fn skip_whitespace<R: BufRead>(reader: &mut R) -> Result<()> {
    while let Some(b) = peek(reader)? {
        if !b.is_ascii_whitespace() {
            break;
        }
        reader.consume(1);
    }
    Ok(())
}

/// Deserializes a top-level JSON array on a reader thread, handing each
/// element over a bounded channel so at most one chunk is buffered ahead.
fn spawn_array_reader(name: String, reader: Input, capacity: usize) -> Receiver<Result<JsonValue>> {
    let (tx, rx) = mpsc::channel(capacity);
    thread::spawn(move || {
        let mut de = serde_json::Deserializer::from_reader(reader);
        let outcome = (&mut de)
            .deserialize_seq(ForwardElements { tx: &tx })
            .and_then(|()| de.end());
        if let Err(e) = outcome {
            if tx.is_closed() {
                return;
            }
            let _ = tx.blocking_send(Err(ConvertError::SourceRead(format!(
                "invalid JSON array in '{}': {}",
                name, e
            ))));
        }
    });
    rx
}

struct ForwardElements<'a> {
    tx: &'a Sender<Result<JsonValue>>,
}

impl<'de> Visitor<'de> for ForwardElements<'_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON array")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<(), A::Error> {
        while let Some(node) = seq.next_element::<JsonValue>()? {
            if self.tx.blocking_send(Ok(node)).is_err() {
                return Err(de::Error::custom("array reader closed"));
            }
        }
        Ok(())
    }
}
