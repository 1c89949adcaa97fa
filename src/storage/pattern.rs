use std::fmt;

/// A URL pattern where `*` matches any run of characters
///
/// Matching is case-sensitive. A pattern without `*` matches only the exact
/// URL.
///
/// # Examples
///
/// ```
/// use xscrape::storage::UrlPattern;
///
/// let pattern = UrlPattern::new("https://example.com/gallery/*");
/// assert!(pattern.matches("https://example.com/gallery/1"));
/// assert!(!pattern.matches("https://example.com/blog/1"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPattern {
    pattern: String,
}

impl UrlPattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    /// A pattern matching every URL
    pub fn any() -> Self {
        Self::new("*")
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Checks a candidate URL against the pattern
    pub fn matches(&self, candidate: &str) -> bool {
        let mut parts = self.pattern.split('*');

        // Text before the first wildcard is anchored at the start
        let first = parts.next().unwrap_or_default();
        let Some(mut rest) = candidate.strip_prefix(first) else {
            return false;
        };

        let parts: Vec<&str> = parts.collect();
        let Some((last, middle)) = parts.split_last() else {
            return rest.is_empty();
        };

        for part in middle {
            match rest.find(part) {
                Some(i) => rest = &rest[i + part.len()..],
                None => return false,
            }
        }

        rest.len() >= last.len() && rest.ends_with(last)
    }

    /// Translates the pattern into a SQL `LIKE` pattern using `\` as escape
    pub fn to_sql_like(&self) -> String {
        let mut like = String::with_capacity(self.pattern.len());
        for c in self.pattern.chars() {
            match c {
                '*' => like.push('%'),
                '%' | '_' | '\\' => {
                    like.push('\\');
                    like.push(c);
                }
                _ => like.push(c),
            }
        }
        like
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

impl From<&str> for UrlPattern {
    fn from(pattern: &str) -> Self {
        Self::new(pattern)
    }
}
