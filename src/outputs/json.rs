//! JSON-lines output of collected articles.
//!
//! Each [`NewsArticle`] is serialised onto its own line and flushed
//! immediately, so a consumer tailing the file (or reading stdout) sees
//! articles as the collector produces them.

use crate::models::NewsArticle;
use std::error::Error;
use std::path::Path;
use tokio::fs::{self, OpenOptions};
use tokio::io::{self, AsyncWrite, AsyncWriteExt};
use tracing::{info, instrument};

pub struct JsonLinesWriter {
    out: Box<dyn AsyncWrite + Unpin + Send>,
    written: usize,
}

impl JsonLinesWriter {
    /// Append to the file at `path`, or write to stdout when `None`.
    #[instrument(level = "info")]
    pub async fn open(path: Option<&Path>) -> Result<Self, Box<dyn Error>> {
        let out: Box<dyn AsyncWrite + Unpin + Send> = match path {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent).await?;
                }
                let file = OpenOptions::new().create(true).append(true).open(path).await?;
                info!(path = %path.display(), "Writing articles as JSON lines");
                Box::new(file)
            }
            None => Box::new(io::stdout()),
        };
        Ok(Self::from_writer(out))
    }

    pub fn from_writer(out: Box<dyn AsyncWrite + Unpin + Send>) -> Self {
        Self { out, written: 0 }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub async fn write(&mut self, article: &NewsArticle) -> Result<(), Box<dyn Error>> {
        let mut line = serde_json::to_vec(article)?;
        line.push(b'\n');
        self.out.write_all(&line).await?;
        self.out.flush().await?;
        self.written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Extracted;

    fn article(text: &str) -> NewsArticle {
        NewsArticle::new(
            "https://example.com/a",
            "Example",
            Extracted {
                title: Some("T".to_string()),
                paragraphs: vec![text.to_string()],
            },
        )
    }

    #[tokio::test]
    async fn test_writes_one_line_per_article() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out").join("articles.jsonl");

        let mut writer = JsonLinesWriter::open(Some(&path)).await.unwrap();
        writer.write(&article("one")).await.unwrap();
        writer.write(&article("two")).await.unwrap();
        assert_eq!(writer.written(), 2);
        drop(writer);

        let raw = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<NewsArticle> = raw
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].content, "T one");
        assert_eq!(lines[1].content, "T two");
    }

    #[tokio::test]
    async fn test_appends_to_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("articles.jsonl");
        std::fs::write(&path, "{}\n").unwrap();

        let mut writer = JsonLinesWriter::open(Some(&path)).await.unwrap();
        writer.write(&article("x")).await.unwrap();
        drop(writer);

        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
    }
}
