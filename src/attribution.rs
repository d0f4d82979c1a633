//! Citation block formatting for retrieved chunks.

use crate::models::SourceCitation;

/// Marker rendered when a chunk's author is unknown.
pub const UNKNOWN_AUTHOR: &str = "unknown";

/// Anything that can be cited: a file, an optional author, and a score.
pub trait Citable {
    fn file(&self) -> &str;
    fn author(&self) -> Option<&str>;
    fn score(&self) -> f32;
}

impl Citable for SourceCitation {
    fn file(&self) -> &str {
        &self.file
    }
    fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }
    fn score(&self) -> f32 {
        self.score
    }
}

impl Citable for crate::models::RetrievedChunk {
    fn file(&self) -> &str {
        &self.file
    }
    fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }
    fn score(&self) -> f32 {
        self.score
    }
}

/// One line per source, in input order:
/// ` - {file} (author: '{author}'; score: {score:.3})`.
pub fn format_sources<C: Citable>(sources: &[C]) -> String {
    sources.iter().map(format_line).collect()
}

fn format_line<C: Citable>(source: &C) -> String {
    format!(
        " - {} (author: '{}'; score: {:.3})\n",
        source.file(),
        source.author().unwrap_or(UNKNOWN_AUTHOR),
        source.score()
    )
}
