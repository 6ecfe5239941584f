//! Citation marker normalization.
//!
//! The chat prompt asks the model to cite as `[¶ /path/to/file.pdf, Page: 3]`.
//! [`format_citations`] rewrites those markers to `[1]`, `[2]`, ... in order
//! of first appearance (identical marker text shares a number) and appends
//! a `References:` list. Markers are replaced by their recorded byte spans,
//! so a citation whose text contains another's is never corrupted.
//!
//! Output contains no markers, so formatting is idempotent.

use std::collections::HashMap;
use std::ops::Range;

/// Prefix that distinguishes a citation from any other bracketed text.
pub const MARKER_PREFIX: char = '¶';

/// One numbered entry of the reference list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub number: usize,
    /// Marker text with every prefix symbol removed, trimmed.
    pub text: String,
}

struct Marker<'a> {
    span: Range<usize>,
    /// Text between the brackets, prefix included.
    inner: &'a str,
}

/// Find `[` `¶` ... `]` markers left to right. At least one character must
/// follow the prefix, and the marker ends at the first `]`.
fn find_markers(response: &str) -> Vec<Marker<'_>> {
    let prefix_len = MARKER_PREFIX.len_utf8();
    let mut markers = Vec::new();
    let mut pos = 0;

    while let Some(offset) = response[pos..].find('[') {
        let open = pos + offset;
        let inner_start = open + 1;
        let rest = &response[inner_start..];
        if !rest.starts_with(MARKER_PREFIX) {
            pos = inner_start;
            continue;
        }
        let Some(close) = rest.find(']') else {
            break;
        };
        if close <= prefix_len {
            // `[¶]`: nothing after the prefix.
            pos = inner_start;
            continue;
        }
        let end = inner_start + close;
        markers.push(Marker {
            span: open..end + 1,
            inner: &response[inner_start..end],
        });
        pos = end + 1;
    }
    markers
}

/// Distinct citations of `response`, numbered in order of first appearance.
pub fn extract_references(response: &str) -> Vec<Reference> {
    number_markers(&find_markers(response)).1
}

fn number_markers<'a>(markers: &[Marker<'a>]) -> (HashMap<&'a str, usize>, Vec<Reference>) {
    let mut numbers: HashMap<&str, usize> = HashMap::new();
    let mut references = Vec::new();
    for marker in markers {
        if numbers.contains_key(marker.inner) {
            continue;
        }
        let number = references.len() + 1;
        numbers.insert(marker.inner, number);
        references.push(Reference {
            number,
            text: marker.inner.replace(MARKER_PREFIX, "").trim().to_string(),
        });
    }
    (numbers, references)
}

/// Replace citation markers with `[N]` and append the reference list.
/// A response without markers is returned unchanged.
pub fn format_citations(response: &str) -> String {
    let markers = find_markers(response);
    if markers.is_empty() {
        tracing::debug!("no citations found in response");
        return response.to_string();
    }
    let (numbers, references) = number_markers(&markers);

    let mut out = String::with_capacity(response.len() + 64 * references.len());
    let mut last = 0;
    for marker in &markers {
        out.push_str(&response[last..marker.span.start]);
        out.push_str(&format!("[{}]", numbers[marker.inner]));
        last = marker.span.end;
    }
    out.push_str(&response[last..]);

    let mut out = out.trim_end().to_string();
    out.push_str("\n\nReferences:");
    for reference in &references {
        out.push_str(&format!("\n\n{}. {}", reference.number, reference.text));
    }
    tracing::debug!(citations = references.len(), "formatted citations");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_citations_in_order() {
        let input = "The sky is blue [¶ a.pdf, Page: 1] and grass is green [¶ b.pdf, Page: 2].";
        assert_eq!(
            format_citations(input),
            "The sky is blue [1] and grass is green [2].\n\nReferences:\n\n1. a.pdf, Page: 1\n\n2. b.pdf, Page: 2"
        );
    }

    #[test]
    fn repeated_citation_shares_number() {
        let input = "Fact A [¶ x.pdf, Page: 1]. Fact B [¶ x.pdf, Page: 1].";
        let out = format_citations(input);
        assert_eq!(
            out,
            "Fact A [1]. Fact B [1].\n\nReferences:\n\n1. x.pdf, Page: 1"
        );
        assert_eq!(out.matches("1. x.pdf").count(), 1);
    }

    #[test]
    fn no_markers_is_unchanged() {
        let input = "Nothing to cite here [1] [see above].  \n";
        assert_eq!(format_citations(input), input);
        assert_eq!(format_citations(""), "");
    }

    #[test]
    fn idempotent() {
        let inputs = [
            "The sky is blue [¶ a.pdf, Page: 1] and grass is green [¶ b.pdf, Page: 2].",
            "Fact A [¶ x.pdf, Page: 1]. Fact B [¶ x.pdf, Page: 1].",
            "plain text",
            "Nested [¶ a [¶ b] and [[¶ c]¶ d] tail   ",
        ];
        for input in inputs {
            let once = format_citations(input);
            assert_eq!(format_citations(&once), once, "input: {:?}", input);
        }
    }

    #[test]
    fn substring_citations_do_not_corrupt_each_other() {
        let input = "One [¶ doc.pdf, Page: 1] two [¶ doc.pdf, Page: 12] three [¶ doc.pdf, Page: 1]";
        assert_eq!(
            format_citations(input),
            "One [1] two [2] three [1]\n\nReferences:\n\n1. doc.pdf, Page: 1\n\n2. doc.pdf, Page: 12"
        );
    }

    #[test]
    fn adjacent_markers() {
        let input = "Both agree.[¶ /d/one.pdf, Page: 10][¶ /d/two.pdf, Page: 20]\n\n";
        assert_eq!(
            format_citations(input),
            "Both agree.[1][2]\n\nReferences:\n\n1. /d/one.pdf, Page: 10\n\n2. /d/two.pdf, Page: 20"
        );
    }

    #[test]
    fn empty_and_unterminated_markers_are_ignored() {
        assert_eq!(format_citations("odd [¶] text"), "odd [¶] text");
        assert_eq!(format_citations("cut off [¶ a.pdf, Page"), "cut off [¶ a.pdf, Page");
    }

    #[test]
    fn prefix_symbols_are_stripped_from_references() {
        let refs = extract_references("x [¶¶ weird ¶ name ] y [¶ b]");
        assert_eq!(
            refs,
            vec![
                Reference {
                    number: 1,
                    text: "weird  name".to_string()
                },
                Reference {
                    number: 2,
                    text: "b".to_string()
                },
            ]
        );
    }

    #[test]
    fn distinct_text_means_distinct_number() {
        let out = format_citations("a [¶ x.pdf, Page: 1] b [¶x.pdf, Page: 1]");
        assert!(out.starts_with("a [1] b [2]"));
    }
}
