//! Export compilation
//!
//! Walks a manuscript's chunks in order and re-serializes them into one flat
//! document. Chapter headings are emitted only when `heading_level1` changes,
//! so consecutive chunks of one chapter share a single heading. A
//! sub-heading is skipped when it repeats the chunk's own text, and body
//! text is skipped when it repeats either heading.
//!
//! Markdown and DOCX share the Markdown renderer and differ only in how image
//! sources are written. EPUB gets an XHTML body.

use crate::db::models::Chunk;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Markdown,
    Epub,
    Docx,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::Epub => "epub",
            ExportFormat::Docx => "docx",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Markdown => "text/markdown; charset=utf-8",
            ExportFormat::Epub => "application/epub+zip",
            ExportFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "epub" => Ok(ExportFormat::Epub),
            "docx" => Ok(ExportFormat::Docx),
            other => Err(Error::InvalidInput(format!(
                "Unsupported export format '{}' (expected markdown, epub or docx)",
                other
            ))),
        }
    }
}

/// Image attached to a chunk, already confirmed present on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub image_guid: String,
    pub file_name: String,
}

/// One chunk in export order with its resolved image
#[derive(Debug, Clone)]
pub struct ExportEntry {
    pub chunk: Chunk,
    pub image: Option<ImageRef>,
}

/// Manuscript-level values needed to render a document
#[derive(Debug, Clone)]
pub struct ExportContext {
    pub title: String,
    pub manuscript_guid: String,
    /// Base URL for absolute image links in Markdown exports
    pub public_base_url: String,
}

impl ExportContext {
    /// Image source as written into a document of the given format
    pub fn image_src(&self, format: ExportFormat, image: &ImageRef) -> String {
        match format {
            ExportFormat::Markdown => format!(
                "{}/api/images/{}",
                self.public_base_url.trim_end_matches('/'),
                image.image_guid
            ),
            ExportFormat::Docx => format!("images/{}/{}", self.manuscript_guid, image.file_name),
            ExportFormat::Epub => format!("images/{}", image.file_name),
        }
    }
}

/// Chapter entry for an EPUB navigation document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    /// Fragment id of the chapter heading inside the content document
    pub anchor: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Block<'a> {
    Chapter { index: usize, title: &'a str },
    Section(&'a str),
    Image { image: &'a ImageRef, alt: &'a str },
    Body(&'a str),
}

/// Flatten entries into document blocks
fn plan(entries: &[ExportEntry]) -> Vec<Block<'_>> {
    let mut blocks = Vec::new();
    let mut current_chapter: Option<&str> = None;
    let mut chapter_index = 0;

    for entry in entries {
        let chunk = &entry.chunk;
        let heading1 = chunk.heading_level1.as_deref();
        let heading2 = chunk.heading_level2.as_deref();

        if let Some(title) = heading1 {
            if current_chapter != Some(title) {
                chapter_index += 1;
                blocks.push(Block::Chapter {
                    index: chapter_index,
                    title,
                });
                current_chapter = Some(title);
            }
        }

        if let Some(section) = heading2 {
            if section != chunk.text {
                blocks.push(Block::Section(section));
            }
        }

        if let Some(image) = &entry.image {
            blocks.push(Block::Image {
                image,
                alt: heading1.unwrap_or("Illustration"),
            });
        }

        let text = chunk.text.as_str();
        if Some(text) != heading1 && Some(text) != heading2 {
            blocks.push(Block::Body(text));
        }
    }

    blocks
}

/// Chapters in document order, one per `heading_level1` transition
pub fn chapters(entries: &[ExportEntry]) -> Vec<Chapter> {
    plan(entries)
        .into_iter()
        .filter_map(|block| match block {
            Block::Chapter { index, title } => Some(Chapter {
                anchor: chapter_anchor(index),
                title: title.to_string(),
            }),
            _ => None,
        })
        .collect()
}

fn chapter_anchor(index: usize) -> String {
    format!("chapter-{}", index)
}

/// Compile Markdown; `format` selects the image source convention
///
/// Chapters are written as `###` and sections as `####`, matching the
/// heading levels the segmenter reads.
pub fn compile_markdown(ctx: &ExportContext, entries: &[ExportEntry], format: ExportFormat) -> String {
    let mut out = format!("# {}\n\n", ctx.title);

    for block in plan(entries) {
        match block {
            Block::Chapter { title, .. } => {
                out.push_str("### ");
                out.push_str(title);
            }
            Block::Section(title) => {
                out.push_str("#### ");
                out.push_str(title);
            }
            Block::Image { image, alt } => {
                out.push_str(&format!(
                    "![{}]({})",
                    escape_markdown_label(alt),
                    ctx.image_src(format, image)
                ));
            }
            Block::Body(text) => out.push_str(&escape_heading_markers(text)),
        }
        out.push_str("\n\n");
    }

    out
}

/// Compile the XHTML content document of an EPUB
pub fn compile_xhtml(ctx: &ExportContext, entries: &[ExportEntry]) -> String {
    let mut body = String::new();

    for block in plan(entries) {
        match block {
            Block::Chapter { index, title } => {
                body.push_str(&format!(
                    "  <h2 id=\"{}\">{}</h2>\n",
                    chapter_anchor(index),
                    escape_xml(title)
                ));
            }
            Block::Section(title) => {
                body.push_str(&format!("  <h3>{}</h3>\n", escape_xml(title)));
            }
            Block::Image { image, alt } => {
                body.push_str(&format!(
                    "  <figure><img src=\"{}\" alt=\"{}\"/></figure>\n",
                    escape_xml(&ctx.image_src(ExportFormat::Epub, image)),
                    escape_xml(alt)
                ));
            }
            Block::Body(text) => {
                for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
                    body.push_str(&format!("  <p>{}</p>\n", escape_xml(paragraph)));
                }
            }
        }
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" lang="en" xml:lang="en">
<head>
  <title>{title}</title>
</head>
<body>
  <h1>{title}</h1>
{body}</body>
</html>
"#,
        title = escape_xml(&ctx.title),
        body = body
    )
}

/// Escape XML special characters
pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Escape text placed inside a Markdown link label
pub fn escape_markdown_label(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('[', "\\[")
        .replace(']', "\\]")
}

/// Escape a leading `#` on each line so body text never reads as a heading
fn escape_heading_markers(text: &str) -> String {
    text.split('\n')
        .map(|line| {
            let content = line.trim_start();
            if content.starts_with('#') {
                let indent = &line[..line.len() - content.len()];
                format!("{}\\{}", indent, content)
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Download file name for an exported manuscript
pub fn attachment_filename(title: &str, format: ExportFormat) -> String {
    format!("{}.{}", sanitize_file_stem(title), format.extension())
}

/// File name stem for a title
///
/// Keeps ASCII alphanumerics, `-` and `_`; other runs collapse to one `-`.
pub fn sanitize_file_stem(title: &str) -> String {
    let mut stem = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            stem.push(c);
        } else if !stem.ends_with('-') {
            stem.push('-');
        }
    }

    let stem = stem.trim_matches('-');
    if stem.is_empty() {
        "manuscript".to_string()
    } else {
        stem.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmenter::segment;

    fn entry(order: i64, h1: Option<&str>, h2: Option<&str>, text: &str) -> ExportEntry {
        ExportEntry {
            chunk: Chunk {
                guid: format!("chunk-{}", order),
                manuscript_guid: "ms-1".to_string(),
                order,
                heading_level1: h1.map(String::from),
                heading_level2: h2.map(String::from),
                text: text.to_string(),
            },
            image: None,
        }
    }

    fn ctx() -> ExportContext {
        ExportContext {
            title: "The Voyage".to_string(),
            manuscript_guid: "ms-1".to_string(),
            public_base_url: "http://localhost:5780/".to_string(),
        }
    }

    #[test]
    fn test_repeated_chapter_heading_emitted_once() {
        let entries = vec![
            entry(0, Some("Title"), None, "Para one."),
            entry(1, Some("Title"), None, "Para two."),
        ];

        let markdown = compile_markdown(&ctx(), &entries, ExportFormat::Markdown);
        assert_eq!(markdown.matches("### Title").count(), 1);
        assert_eq!(
            markdown,
            "# The Voyage\n\n### Title\n\nPara one.\n\nPara two.\n\n"
        );
    }

    #[test]
    fn test_duplicate_text_suppressed() {
        let entries = vec![
            entry(0, Some("Chapter"), None, "Chapter"),
            entry(1, Some("Chapter"), Some("Scene"), "Scene"),
            entry(2, Some("Chapter"), Some("Scene"), "Body."),
        ];

        let markdown = compile_markdown(&ctx(), &entries, ExportFormat::Markdown);
        assert_eq!(
            markdown,
            "# The Voyage\n\n### Chapter\n\n#### Scene\n\nBody.\n\n"
        );
    }

    #[test]
    fn test_image_sources_per_format() {
        let mut with_image = entry(0, Some("One"), None, "Text.");
        with_image.image = Some(ImageRef {
            image_guid: "img-1".to_string(),
            file_name: "abc.png".to_string(),
        });
        let entries = vec![with_image];

        let markdown = compile_markdown(&ctx(), &entries, ExportFormat::Markdown);
        assert!(markdown.contains("![One](http://localhost:5780/api/images/img-1)"));
        assert!(markdown.find("![One]").unwrap() < markdown.find("Text.").unwrap());

        let docx = compile_markdown(&ctx(), &entries, ExportFormat::Docx);
        assert!(docx.contains("![One](images/ms-1/abc.png)"));

        let xhtml = compile_xhtml(&ctx(), &entries);
        assert!(xhtml.contains("<img src=\"images/abc.png\" alt=\"One\"/>"));
    }

    #[test]
    fn test_xhtml_escapes_and_splits_paragraphs() {
        let entries = vec![entry(0, Some("Q&A"), None, "First <b>.\n\nSecond.")];
        let xhtml = compile_xhtml(&ctx(), &entries);

        assert!(xhtml.contains("<h2 id=\"chapter-1\">Q&amp;A</h2>"));
        assert!(xhtml.contains("<p>First &lt;b&gt;.</p>"));
        assert!(xhtml.contains("<p>Second.</p>"));
    }

    #[test]
    fn test_chapters_follow_transitions() {
        let entries = vec![
            entry(0, None, None, "Prologue."),
            entry(1, Some("One"), None, "a"),
            entry(2, Some("One"), None, "b"),
            entry(3, Some("Two"), None, "c"),
        ];

        let titles: Vec<_> = chapters(&entries).into_iter().map(|c| c.title).collect();
        assert_eq!(titles, vec!["One", "Two"]);
    }

    #[test]
    fn test_markdown_export_resegments_to_same_chunks() {
        let source = "### One\n\nFirst.\n\n#### Scene\n\nSecond.\n\n### Two\n\nThird.";
        let entries: Vec<_> = segment(source)
            .map(|d| entry(d.order, d.heading_level1.as_deref(), d.heading_level2.as_deref(), &d.text))
            .collect();

        let exported = compile_markdown(&ctx(), &entries, ExportFormat::Markdown);
        let again: Vec<_> = segment(&exported).collect();
        let original: Vec<_> = segment(source).collect();
        assert_eq!(again, original);
    }

    #[test]
    fn test_markdown_escapes_structural_text() {
        let mut with_image = entry(0, Some("Part [1]"), None, "# not a heading\nplain");
        with_image.image = Some(ImageRef {
            image_guid: "img-1".to_string(),
            file_name: "abc.png".to_string(),
        });
        let entries = vec![with_image];

        let markdown = compile_markdown(&ctx(), &entries, ExportFormat::Markdown);
        assert!(markdown.contains("![Part \\[1\\]](http://localhost:5780/api/images/img-1)"));
        assert!(markdown.contains("\\# not a heading\nplain"));

        // Image paragraph, then the body still in one paragraph
        let again: Vec<_> = segment(&markdown).collect();
        assert_eq!(again.len(), 2);
        assert!(again[1].text.contains("not a heading"));
        assert!(again[1].text.ends_with("plain"));
    }

    #[test]
    fn test_escape_markdown_label() {
        assert_eq!(escape_markdown_label("a]b[c\\"), "a\\]b\\[c\\\\");
        assert_eq!(escape_markdown_label("plain"), "plain");
    }

    #[test]
    fn test_attachment_filename() {
        assert_eq!(
            attachment_filename("The Voyage: Part 1", ExportFormat::Epub),
            "The-Voyage-Part-1.epub"
        );
        assert_eq!(attachment_filename("***", ExportFormat::Markdown), "manuscript.md");
        assert_eq!(attachment_filename("draft_v2", ExportFormat::Docx), "draft_v2.docx");
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("EPUB".parse::<ExportFormat>().unwrap(), ExportFormat::Epub);
        assert_eq!("md".parse::<ExportFormat>().unwrap(), ExportFormat::Markdown);
        assert!(matches!("pdf".parse::<ExportFormat>(), Err(Error::InvalidInput(_))));
    }
}
