//! EPUB 3 packaging
//!
//! Writes a single-document EPUB: the compiled XHTML body, a navigation
//! document listing chapters, and the referenced images under
//! `OEBPS/images/`.

use folio_common::export::{escape_xml, Chapter};
use std::io::{self, Cursor, Seek, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Image packaged into the book
#[derive(Debug, Clone)]
pub struct EpubImage {
    pub file_name: String,
    pub data: Vec<u8>,
}

/// Everything needed to write one book
#[derive(Debug, Clone)]
pub struct EpubBook {
    pub title: String,
    pub identifier: String,
    /// Complete `OEBPS/content.xhtml` document
    pub content_xhtml: String,
    pub chapters: Vec<Chapter>,
    pub images: Vec<EpubImage>,
}

/// Build the EPUB in memory
pub fn build_epub(book: &EpubBook) -> io::Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    write_epub(book, &mut buffer)?;
    Ok(buffer.into_inner())
}

/// Write an EPUB to any `Write + Seek` destination
pub fn write_epub<W: Write + Seek>(book: &EpubBook, writer: W) -> io::Result<()> {
    let mut zip = ZipWriter::new(writer);

    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    // mimetype must be the first entry and uncompressed
    zip.start_file("mimetype", stored)?;
    zip.write_all(b"application/epub+zip")?;

    zip.start_file("META-INF/container.xml", deflated)?;
    zip.write_all(CONTAINER_XML.as_bytes())?;

    zip.start_file("OEBPS/content.opf", deflated)?;
    zip.write_all(generate_opf(book).as_bytes())?;

    zip.start_file("OEBPS/nav.xhtml", deflated)?;
    zip.write_all(generate_nav(book).as_bytes())?;

    zip.start_file("OEBPS/content.xhtml", deflated)?;
    zip.write_all(book.content_xhtml.as_bytes())?;

    // PNGs are already compressed
    for image in &book.images {
        zip.start_file(format!("OEBPS/images/{}", image.file_name), stored)?;
        zip.write_all(&image.data)?;
    }

    zip.finish()?;
    Ok(())
}

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

fn generate_opf(book: &EpubBook) -> String {
    let modified = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");

    let mut manifest = String::new();
    manifest.push_str(
        "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n",
    );
    manifest.push_str(
        "    <item id=\"content\" href=\"content.xhtml\" media-type=\"application/xhtml+xml\"/>\n",
    );
    for (i, image) in book.images.iter().enumerate() {
        manifest.push_str(&format!(
            "    <item id=\"image-{}\" href=\"images/{}\" media-type=\"{}\"/>\n",
            i,
            escape_xml(&image.file_name),
            media_type(&image.file_name)
        ));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="BookId">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="BookId">urn:uuid:{identifier}</dc:identifier>
    <dc:title>{title}</dc:title>
    <dc:language>en</dc:language>
    <meta property="dcterms:modified">{modified}</meta>
  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine>
    <itemref idref="content"/>
  </spine>
</package>
"#,
        identifier = escape_xml(&book.identifier),
        title = escape_xml(&book.title),
        modified = modified,
        manifest = manifest
    )
}

fn generate_nav(book: &EpubBook) -> String {
    let mut items = String::new();
    if book.chapters.is_empty() {
        items.push_str(&format!(
            "      <li><a href=\"content.xhtml\">{}</a></li>\n",
            escape_xml(&book.title)
        ));
    }
    for chapter in &book.chapters {
        items.push_str(&format!(
            "      <li><a href=\"content.xhtml#{}\">{}</a></li>\n",
            chapter.anchor,
            escape_xml(&chapter.title)
        ));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" lang="en" xml:lang="en">
<head>
  <title>{title}</title>
</head>
<body>
  <nav epub:type="toc" id="toc">
    <h1>{title}</h1>
    <ol>
{items}    </ol>
  </nav>
</body>
</html>
"#,
        title = escape_xml(&book.title),
        items = items
    )
}

fn media_type(file_name: &str) -> &'static str {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "image/png",
    }
}
