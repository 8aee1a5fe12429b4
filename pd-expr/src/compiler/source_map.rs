use std::ops::Range;

/// A named source snippet with a line index for offset lookups.
#[derive(Clone, Debug)]
pub struct SourceText<'a> {
    pub name: &'a str,
    pub text: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> SourceText<'a> {
    pub fn new(name: &'a str, text: &'a str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(at, _)| at + 1))
            .collect();
        Self {
            name,
            text,
            line_starts,
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// 1-based line and character column of a byte offset.
    pub fn line_col(&self, offset: usize) -> Option<(usize, usize)> {
        if offset > self.text.len() || !self.text.is_char_boundary(offset) {
            return None;
        }
        let line_index = self
            .line_starts
            .partition_point(|start| *start <= offset)
            .saturating_sub(1);
        let line_start = self.line_starts[line_index];
        let column = self.text[line_start..offset].chars().count() + 1;
        Some((line_index + 1, column))
    }

    pub fn line_range(&self, line: usize) -> Option<Range<usize>> {
        let start = *self.line_starts.get(line.checked_sub(1)?)?;
        let end = self
            .line_starts
            .get(line)
            .copied()
            .unwrap_or(self.text.len());
        let trimmed = self.text[start..end].trim_end_matches(['\n', '\r']).len();
        Some(start..start + trimmed)
    }

    pub fn line_text(&self, line: usize) -> Option<&'a str> {
        self.text.get(self.line_range(line)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_offsets_to_lines_and_columns() {
        let source = SourceText::new("snippet", "(int x) =>\n  x + ñ1\n");
        assert_eq!(source.line_count(), 3);
        assert_eq!(source.line_col(0), Some((1, 1)));
        assert_eq!(source.line_col(13), Some((2, 3)));
        assert_eq!(source.line_text(2), Some("  x + ñ1"));
        let after_wide_char = source.text.find('1').expect("digit is present");
        assert_eq!(source.line_col(after_wide_char), Some((2, 8)));
    }

    #[test]
    fn rejects_offsets_past_the_end() {
        let source = SourceText::new("snippet", "x");
        assert_eq!(source.line_col(1), Some((1, 2)));
        assert_eq!(source.line_col(2), None);
        assert_eq!(source.line_text(0), None);
    }
}
