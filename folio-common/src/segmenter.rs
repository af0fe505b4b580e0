//! Markdown segmentation
//!
//! Splits a manuscript into paragraph-level chunks. Level-3 headings mark
//! chapters and become the `heading_level1` label of the chunks that follow;
//! level-4 headings become `heading_level2`. A heading is never emitted as a
//! chunk of its own: without a following paragraph it is dropped. Items of a
//! tight list carry no paragraph of their own and are segmented as if they did.

use pulldown_cmark::{Event, HeadingLevel, Parser, Tag};
use serde::{Deserialize, Serialize};
use std::iter::Peekable;

/// A chunk produced by segmentation, not yet persisted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDraft {
    pub order: i64,
    pub heading_level1: Option<String>,
    pub heading_level2: Option<String>,
    pub text: String,
}

impl ChunkDraft {
    fn has_text(&self) -> bool {
        !self.text.is_empty()
    }
}

/// Lazy chunk iterator over a markdown document
pub struct Segmenter<'a> {
    events: Peekable<Parser<'a, 'a>>,
    current: ChunkDraft,
    next_order: i64,
    finished: bool,
}

impl<'a> Segmenter<'a> {
    pub fn new(markdown: &'a str) -> Self {
        Self {
            events: Parser::new(markdown).peekable(),
            current: ChunkDraft::default(),
            next_order: 0,
            finished: false,
        }
    }

    /// Replace the chunk being accumulated, returning the old one if it carries text
    fn start_chunk(&mut self, next: ChunkDraft) -> Option<ChunkDraft> {
        let previous = std::mem::replace(&mut self.current, next);
        if previous.has_text() {
            Some(self.number(previous))
        } else {
            None
        }
    }

    fn number(&mut self, mut draft: ChunkDraft) -> ChunkDraft {
        draft.order = self.next_order;
        self.next_order += 1;
        draft
    }

    /// Start a paragraph chunk under the current headings
    fn start_paragraph(&mut self, text: String) -> Option<ChunkDraft> {
        let heading_level1 = self.current.heading_level1.clone();
        let heading_level2 = self.current.heading_level2.clone();
        self.start_chunk(ChunkDraft {
            order: 0,
            heading_level1,
            heading_level2,
            text,
        })
    }

    /// Collect inline text up to the end of the current block
    ///
    /// Fragments are trimmed, empty ones dropped, and the rest joined with
    /// single spaces. A nested list ends the block; its items are segmented
    /// separately.
    fn collect_inline(&mut self) -> String {
        let mut fragments: Vec<String> = Vec::new();
        let mut depth = 0usize;

        for event in self.events.by_ref() {
            match event {
                Event::Start(Tag::List(_)) if depth == 0 => break,
                Event::Start(_) => depth += 1,
                Event::End(_) if depth == 0 => break,
                Event::End(_) => depth -= 1,
                Event::Text(text) | Event::Code(text) => {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        fragments.push(trimmed.to_string());
                    }
                }
                _ => {}
            }
        }

        fragments.join(" ")
    }
}

impl<'a> Iterator for Segmenter<'a> {
    type Item = ChunkDraft;

    fn next(&mut self) -> Option<ChunkDraft> {
        if self.finished {
            return None;
        }

        while let Some(event) = self.events.next() {
            let flushed = match event {
                Event::Start(Tag::Heading(HeadingLevel::H3, _, _)) => {
                    let label = self.collect_inline();
                    self.start_chunk(ChunkDraft {
                        heading_level1: Some(label),
                        ..ChunkDraft::default()
                    })
                }
                Event::Start(Tag::Heading(HeadingLevel::H4, _, _)) => {
                    let label = self.collect_inline();
                    let heading_level1 = self.current.heading_level1.clone();
                    self.start_chunk(ChunkDraft {
                        heading_level1,
                        heading_level2: Some(label),
                        ..ChunkDraft::default()
                    })
                }
                Event::Start(Tag::Paragraph) => {
                    let text = self.collect_inline();
                    self.start_paragraph(text)
                }
                Event::Start(Tag::Item) => {
                    if matches!(self.events.peek(), Some(Event::Start(Tag::Paragraph))) {
                        None
                    } else {
                        let text = self.collect_inline();
                        self.start_paragraph(text)
                    }
                }
                _ => None,
            };

            if flushed.is_some() {
                return flushed;
            }
        }

        self.finished = true;
        let remaining = std::mem::take(&mut self.current);
        if remaining.has_text() {
            Some(self.number(remaining))
        } else {
            None
        }
    }
}

/// Segment a markdown document into ordered chunk drafts
pub fn segment(markdown: &str) -> Segmenter<'_> {
    Segmenter::new(markdown)
}

/// Check that raw upload bytes can be segmented
///
/// The markdown parser accepts any UTF-8 text, so this only fails on
/// invalid encoding.
pub fn validate_markdown(input: &[u8]) -> bool {
    match std::str::from_utf8(input) {
        Ok(text) => {
            Parser::new(text).for_each(drop);
            true
        }
        Err(_) => false,
    }
}
