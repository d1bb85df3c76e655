//! The built-in render step used by every configured processor.
//!
//! Rendering here is deliberately plain: `!include <path>` lines are replaced
//! by the included document's rendered text and Markdown-style links are
//! scanned for cross-document references. Everything else is copied through
//! with line endings normalized.

use std::path::PathBuf;

use folio_incremental::{
    BuildStep, DependencyItem, DependencyKind, StepContext, StepError, StepOutput,
};

/// Name of the single output the render step produces.
pub const PAGE_OUTPUT: &str = "page";

const INCLUDE_DIRECTIVE: &str = "!include";

/// Renders one document from the source directory.
pub struct RenderStep {
    source_dir: PathBuf,
    incremental: bool,
}

impl RenderStep {
    /// Creates a step reading documents below `source_dir`.
    pub fn new(source_dir: PathBuf, incremental: bool) -> Self {
        Self {
            source_dir,
            incremental,
        }
    }

    fn read(&self, doc: &str) -> Result<String, std::io::Error> {
        let text = std::fs::read_to_string(self.source_dir.join(doc))?;
        Ok(text.replace("\r\n", "\n").replace('\r', "\n"))
    }

    /// Appends the rendered text of `doc` to `out`, expanding includes.
    fn expand(&self, doc: &str, stack: &mut Vec<String>, out: &mut String) {
        if stack.iter().any(|d| d == doc) {
            out.push_str(&format!("<!-- include cycle: {doc} -->\n"));
            return;
        }
        let text = match self.read(doc) {
            Ok(text) => text,
            Err(_) => {
                out.push_str(&format!("<!-- missing include: {doc} -->\n"));
                return;
            }
        };
        stack.push(doc.to_string());
        for line in text.lines() {
            match include_target(line) {
                Some(target) => match resolve(doc, target) {
                    Some(resolved) => self.expand(&resolved, stack, out),
                    None => out.push_str(&format!("<!-- missing include: {target} -->\n")),
                },
                None => {
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }
        stack.pop();
    }
}

impl BuildStep for RenderStep {
    fn name(&self) -> &str {
        "render"
    }

    fn supports_incremental(&self) -> bool {
        self.incremental
    }

    fn run(&self, ctx: &StepContext<'_>) -> Result<StepOutput, StepError> {
        let doc = ctx.document.as_str();
        let text = self
            .read(doc)
            .map_err(|e| StepError::new(format!("failed to read {doc}: {e}")))?;

        let mut output = StepOutput::new();
        for (line_no, line) in text.lines().enumerate() {
            let node = format!("line {}", line_no + 1);
            if let Some(target) = include_target(line) {
                match resolve(doc, target) {
                    Some(target) => {
                        output = output.with_dependency(
                            DependencyItem::new(doc, target, DependencyKind::Include).via(node),
                        );
                    }
                    None => {
                        tracing::warn!(document = doc, %node, "include target does not name a document")
                    }
                }
                continue;
            }
            for (target, kind) in scan_links(doc, line) {
                output = output
                    .with_dependency(DependencyItem::new(doc, target, kind).via(node.clone()));
            }
        }

        let mut page = String::new();
        self.expand(doc, &mut Vec::new(), &mut page);
        Ok(output.with_output(PAGE_OUTPUT, page))
    }
}

/// Returns the trimmed target of an `!include` line, which may be empty.
fn include_target(line: &str) -> Option<&str> {
    let rest = line.strip_prefix(INCLUDE_DIRECTIVE)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}

/// Extracts local link targets from a line of Markdown.
///
/// `[text](other.md)` is a `File` reference, `[text](other.md#anchor)` a
/// `Bookmark` one. External URLs and empty targets are ignored.
fn scan_links(doc: &str, line: &str) -> Vec<(String, DependencyKind)> {
    let mut links = Vec::new();
    let mut rest = line;
    while let Some(start) = rest.find("](") {
        rest = &rest[start + 2..];
        let Some(end) = rest.find(')') else {
            break;
        };
        let target = rest[..end].trim();
        rest = &rest[end + 1..];

        if target.is_empty() || target.contains("://") || target.starts_with("mailto:") {
            continue;
        }
        let (path, kind) = match target.split_once('#') {
            Some((path, _anchor)) => (path, DependencyKind::Bookmark),
            None => (target, DependencyKind::File),
        };
        let resolved = if path.is_empty() {
            Some(doc.to_string())
        } else {
            resolve(doc, path)
        };
        if let Some(resolved) = resolved {
            links.push((resolved, kind));
        }
    }
    links
}

/// Resolves `target` relative to the directory of `doc`.
///
/// A leading `/` anchors `target` at the source directory root. Returns
/// `None` when `target` names no document or climbs above the root.
fn resolve(doc: &str, target: &str) -> Option<String> {
    let mut parts: Vec<&str> = if target.starts_with('/') {
        Vec::new()
    } else {
        let mut base: Vec<&str> = doc.split('/').collect();
        base.pop();
        base
    };
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            s => parts.push(s),
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}
