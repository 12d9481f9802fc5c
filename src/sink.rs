use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use tracing::info;

use crate::rules::RuleDocument;

pub const DEFAULT_OUTPUT_FILENAME: &str = "table-mappings.json";

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to serialize table mappings for {destination}")]
    Serialize {
        destination: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write table mappings to {destination}")]
    Write {
        destination: String,
        #[source]
        source: io::Error,
    },
}

/// Somewhere a compiled document can be persisted.
pub trait Sink {
    fn destination(&self) -> String;

    fn write(&mut self, document: &RuleDocument) -> Result<(), SinkError>;

    fn render(&self, document: &RuleDocument) -> Result<String, SinkError> {
        document
            .to_json_pretty()
            .map_err(|source| SinkError::Serialize {
                destination: self.destination(),
                source,
            })
    }
}

#[derive(Clone, Debug)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_err(&self, source: io::Error) -> SinkError {
        SinkError::Write {
            destination: self.destination(),
            source,
        }
    }
}

impl Sink for FileSink {
    fn destination(&self) -> String {
        self.path.display().to_string()
    }

    fn write(&mut self, document: &RuleDocument) -> Result<(), SinkError> {
        let json = self.render(document)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.write_err(e))?;
            }
        }
        fs::write(&self.path, json).map_err(|e| self.write_err(e))?;

        info!(
            path = %self.path.display(),
            rules = document.rules.len(),
            "table mappings written"
        );
        Ok(())
    }
}

/// Writes the document, followed by a newline, to any writer.
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
    name: String,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W, name: impl Into<String>) -> Self {
        Self {
            writer,
            name: name.into(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Sink for WriterSink<W> {
    fn destination(&self) -> String {
        self.name.clone()
    }

    fn write(&mut self, document: &RuleDocument) -> Result<(), SinkError> {
        let json = self.render(document)?;
        writeln!(self.writer, "{}", json)
            .and_then(|()| self.writer.flush())
            .map_err(|source| SinkError::Write {
                destination: self.name.clone(),
                source,
            })
    }
}
