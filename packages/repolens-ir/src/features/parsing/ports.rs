//! Parser port

use super::domain::{ParsedTree, SourceEdit};
use crate::shared::models::Result;

/// Parser capability contract
///
/// `parse_incremental` must return a tree observationally identical to a
/// full parse of the post-edit source; when that cannot be guaranteed
/// (inconsistent edit list, missing previous tree), the adapter falls back
/// to full parsing.
pub trait SourceParser: Send + Sync {
    fn parse(&self, source: &str, file_path: &str) -> Result<ParsedTree>;

    fn parse_incremental(
        &self,
        source: &str,
        file_path: &str,
        edits: &[SourceEdit],
    ) -> Result<ParsedTree>;

    fn supports_extension(&self, ext: &str) -> bool;

    fn language_name(&self) -> &'static str;
}
