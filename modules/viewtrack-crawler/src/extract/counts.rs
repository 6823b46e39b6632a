/// Multiplier table for abbreviated counts ("1.2M", "52.3K").
///
/// The defaults cover the English-locale suffixes TikTok renders. Deployments
/// scraping other locales extend the table instead of patching the parser.
#[derive(Debug, Clone)]
pub struct AbbreviationTable {
    entries: Vec<(String, f64)>,
}

impl Default for AbbreviationTable {
    fn default() -> Self {
        Self {
            entries: vec![
                ("K".to_string(), 1e3),
                ("M".to_string(), 1e6),
                ("B".to_string(), 1e9),
            ],
        }
    }
}

impl AbbreviationTable {
    pub fn with_entry(mut self, suffix: &str, multiplier: f64) -> Self {
        self.entries.push((suffix.to_string(), multiplier));
        self
    }

    /// Parse a displayed count: "1.2M" -> 1_200_000, "52.3K" -> 52_300,
    /// "890" -> 890. Suffix match is case-insensitive; commas and
    /// surrounding whitespace are ignored.
    pub fn parse(&self, text: &str) -> Option<u64> {
        let cleaned = text.trim().replace(',', "");
        if cleaned.is_empty() {
            return None;
        }

        // Longest matching suffix wins, so an "MM" entry beats "M".
        let mut best: Option<(usize, f64)> = None;
        for (suffix, multiplier) in &self.entries {
            if ends_with_ignore_case(&cleaned, suffix)
                && best.is_none_or(|(len, _)| suffix.len() > len)
            {
                best = Some((suffix.len(), *multiplier));
            }
        }

        match best {
            Some((len, multiplier)) => {
                let number: f64 = cleaned[..cleaned.len() - len].trim().parse().ok()?;
                if number < 0.0 || !number.is_finite() {
                    return None;
                }
                Some((number * multiplier).round() as u64)
            }
            None => cleaned.parse().ok(),
        }
    }
}

/// ASCII case-insensitive suffix match that never slices mid-codepoint.
fn ends_with_ignore_case(haystack: &str, suffix: &str) -> bool {
    haystack.len() >= suffix.len()
        && haystack.is_char_boundary(haystack.len() - suffix.len())
        && haystack[haystack.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_abbreviated_counts() {
        let table = AbbreviationTable::default();
        assert_eq!(table.parse("1.2M"), Some(1_200_000));
        assert_eq!(table.parse("52.3K"), Some(52_300));
        assert_eq!(table.parse("890"), Some(890));
    }

    #[test]
    fn suffix_is_case_insensitive() {
        let table = AbbreviationTable::default();
        assert_eq!(table.parse("1.2m"), Some(1_200_000));
        assert_eq!(table.parse("3k"), Some(3_000));
    }

    #[test]
    fn strips_commas_and_whitespace() {
        let table = AbbreviationTable::default();
        assert_eq!(table.parse(" 12,345 "), Some(12_345));
        assert_eq!(table.parse("1,2M"), Some(12_000_000));
    }

    #[test]
    fn rejects_junk() {
        let table = AbbreviationTable::default();
        assert_eq!(table.parse(""), None);
        assert_eq!(table.parse("views"), None);
        assert_eq!(table.parse("-1.2M"), None);
        assert_eq!(table.parse("1.5"), None);
    }

    #[test]
    fn extended_table_handles_other_locales() {
        let table = AbbreviationTable::default().with_entry("Tr", 1e6);
        assert_eq!(table.parse("3.4Tr"), Some(3_400_000));
        assert_eq!(table.parse("3.4tr"), Some(3_400_000));
        // Defaults still apply.
        assert_eq!(table.parse("52.3K"), Some(52_300));
    }
}
