//! E-book conversion by shelling out to the kindlegen binary.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

use super::{Article, CollaboratorError, Converter, Document};
use crate::job::JobId;

/// kindlegen exits 1 when it succeeded with warnings.
const WARNINGS_EXIT_CODE: i32 = 1;

pub struct KindlegenConverter {
    binary: String,
    work_root: PathBuf,
}

impl KindlegenConverter {
    pub fn new(binary: String) -> Self {
        Self::with_work_root(binary, std::env::temp_dir().join("kindling"))
    }

    pub fn with_work_root(binary: String, work_root: PathBuf) -> Self {
        Self { binary, work_root }
    }

    async fn run(
        &self,
        dir: &Path,
        id: &JobId,
        article: &Article,
    ) -> Result<Document, CollaboratorError> {
        let fallback = article.url.as_deref().unwrap_or("Article");
        let title = article.title_or(fallback).to_string();

        let html_name = format!("{}.html", id);
        let mobi_name = format!("{}.mobi", id);

        tokio::fs::write(dir.join(&html_name), render_html(&title, article)).await?;

        let output = Command::new(&self.binary)
            .arg(&html_name)
            .arg("-o")
            .arg(&mobi_name)
            .current_dir(dir)
            .output()
            .await?;

        let code = output.status.code();
        if !output.status.success() && code != Some(WARNINGS_EXIT_CODE) {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let tail: String = stdout
                .lines()
                .rev()
                .take(3)
                .collect::<Vec<_>>()
                .join(" | ");
            return Err(CollaboratorError::Conversion(format!(
                "exit code {:?}: {}",
                code, tail
            )));
        }

        let bytes = tokio::fs::read(dir.join(&mobi_name)).await?;

        info!(
            job_id = %id,
            exit_code = ?code,
            size = bytes.len(),
            "kindlegen_convert_complete"
        );

        Ok(Document {
            filename: format!("{}.mobi", file_stem(&title)),
            title,
            bytes,
        })
    }
}

#[async_trait]
impl Converter for KindlegenConverter {
    async fn convert(&self, id: &JobId, article: &Article) -> Result<Document, CollaboratorError> {
        tokio::fs::create_dir_all(&self.work_root).await?;

        // Removed on drop, so a panic or a dropped future cleans up too.
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", id))
            .tempdir_in(&self.work_root)?;

        let result = self.run(dir.path(), id, article).await;

        if let Err(e) = dir.close() {
            warn!(job_id = %id, error = %e, "kindlegen_cleanup_failed");
        }

        result
    }
}

fn render_html(title: &str, article: &Article) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body><h1>{title}</h1>{content}</body></html>\n",
        title = escape_html(title),
        content = article.content.as_deref().unwrap_or(""),
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Attachment-safe file name derived from the title.
fn file_stem(title: &str) -> String {
    let stem: String = title
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    let stem: String = stem.chars().take(64).collect();
    if stem.is_empty() {
        "article".to_string()
    } else {
        stem
    }
}
