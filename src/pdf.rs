use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, bail};
use tracing::debug;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TextMode {
    Raw,
    Layout,
}

/// Page texts of one document, index 0 is page 1.
#[derive(Debug, Clone, Default)]
pub struct DocumentText {
    pub pages: Vec<String>,
    pub total_pages: u32,
}

impl DocumentText {
    pub fn from_pages(pages: Vec<String>) -> Self {
        let total_pages = pages.len() as u32;
        Self { pages, total_pages }
    }

    pub fn page(&self, page_number: u32) -> Option<&str> {
        if page_number == 0 {
            return None;
        }
        self.pages
            .get((page_number - 1) as usize)
            .map(String::as_str)
    }
}

pub fn command_available(program: &str) -> bool {
    Command::new(program).arg("-v").output().is_ok()
}

pub fn ensure_tools(programs: &[&str]) -> Result<()> {
    let missing = programs
        .iter()
        .copied()
        .filter(|program| !command_available(program))
        .collect::<Vec<&str>>();
    if !missing.is_empty() {
        bail!("required tools are unavailable: {}", missing.join(", "));
    }
    Ok(())
}

pub fn load_document(pdf_path: &Path, mode: TextMode) -> Result<DocumentText> {
    let total_pages = page_count(pdf_path)?;
    let pages = extract_pages_with_pdftotext(pdf_path, mode)?;

    debug!(path = %pdf_path.display(), pages = total_pages, "loaded document text");
    Ok(DocumentText::from_pages(fit_pages(pages, total_pages)))
}

/// pdftotext can disagree with pdfinfo on the page count; pdfinfo wins.
fn fit_pages(mut pages: Vec<String>, total_pages: u32) -> Vec<String> {
    pages.resize(total_pages as usize, String::new());
    pages
}

pub fn page_count(pdf_path: &Path) -> Result<u32> {
    let output = Command::new("pdfinfo")
        .arg(pdf_path)
        .output()
        .with_context(|| format!("failed to execute pdfinfo for {}", pdf_path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "pdfinfo returned non-zero exit status for {}: {}",
            pdf_path.display(),
            stderr.trim()
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_pdfinfo_pages(&stdout)
        .with_context(|| format!("pdfinfo reported no page count for {}", pdf_path.display()))
}

fn parse_pdfinfo_pages(stdout: &str) -> Option<u32> {
    stdout.lines().find_map(|line| {
        line.strip_prefix("Pages:")
            .and_then(|rest| rest.trim().parse::<u32>().ok())
    })
}

fn extract_pages_with_pdftotext(pdf_path: &Path, mode: TextMode) -> Result<Vec<String>> {
    let mut command = Command::new("pdftotext");
    command.arg("-enc").arg("UTF-8");
    if mode == TextMode::Layout {
        command.arg("-layout");
    }
    command.arg(pdf_path).arg("-");

    let output = command
        .output()
        .with_context(|| format!("failed to execute pdftotext for {}", pdf_path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "pdftotext returned non-zero exit status for {}: {}",
            pdf_path.display(),
            stderr.trim()
        );
    }

    Ok(split_pages(&String::from_utf8_lossy(&output.stdout)))
}

fn split_pages(raw: &str) -> Vec<String> {
    let mut pages: Vec<String> = raw
        .split('\u{000C}')
        .map(|chunk| chunk.replace('\u{0000}', ""))
        .collect();

    while let Some(last_page) = pages.last() {
        if last_page.trim().is_empty() {
            pages.pop();
            continue;
        }
        break;
    }

    pages
}

/// Copies pages `start..=end` of `source` into a new PDF at `destination`.
pub fn copy_page_span(source: &Path, start: u32, end: u32, destination: &Path) -> Result<()> {
    let output = Command::new("qpdf")
        .arg("--empty")
        .arg("--pages")
        .arg(source)
        .arg(format!("{start}-{end}"))
        .arg("--")
        .arg(destination)
        .output()
        .with_context(|| format!("failed to execute qpdf for {}", source.display()))?;

    // qpdf exits 3 when it succeeded with warnings
    let succeeded = output.status.success() || output.status.code() == Some(3);
    if !succeeded || !destination.exists() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "qpdf failed to copy pages {}-{} of {}: {}",
            start,
            end,
            source.display(),
            stderr.trim()
        );
    }

    Ok(())
}
