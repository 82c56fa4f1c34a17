//! PDF text extraction through poppler's `pdftotext`.
use std::path::Path;
use std::process::Command;

use anyhow::{anyhow, Context};
use tracing::debug;

use crate::traits::TextExtractor;

/// Runs `pdftotext <file> -` and returns its UTF-8 stdout. Pages are separated by form feeds.
#[derive(Debug, Clone)]
pub struct PdfToText {
    binary: String,
}

impl Default for PdfToText {
    fn default() -> Self {
        Self { binary: "pdftotext".to_string() }
    }
}

impl PdfToText {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

impl TextExtractor for PdfToText {
    fn extract(&self, path: &Path) -> anyhow::Result<String> {
        debug!("Extracting {} with {}", path.display(), self.binary);
        let output = Command::new(&self.binary)
            .arg("-enc")
            .arg("UTF-8")
            .arg(path)
            .arg("-")
            .output()
            .with_context(|| format!("failed to run {} (is poppler installed?)", self.binary))?;
        if !output.status.success() {
            return Err(anyhow!(
                "{} failed on {}: {}",
                self.binary,
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
