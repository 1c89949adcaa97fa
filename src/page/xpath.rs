//! XPath expressions evaluated with the `scraper` selector engine
//!
//! Only the location-path subset that maps onto CSS selectors is accepted:
//!
//! - steps separated by `//` (descendant) or `/` (child), each a tag name or `*`
//! - predicates `[@a]`, `[@a='v']`, `[contains(@a,'v')]`, `[starts-with(@a,'v')]`,
//!   `[ends-with(@a,'v')]`, `[n]`, `[last()]`, joined with `and`
//! - an optional final `/@attr` or `/text()` (`//text()` for all descendant text)
//!
//! An expression prefixed with `html:` yields the outer HTML of each matched
//! element instead of its text.

use scraper::{ElementRef, Html, Selector};
use std::fmt;
use thiserror::Error;

/// Reserved prefix marking an expression whose content is returned as HTML
pub const HTML_PREFIX: &str = "html:";

/// Errors raised while compiling an XPath expression
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XPathError {
    #[error("XPath expression is empty")]
    Empty,

    #[error("XPath must start with '/' or '//': {0}")]
    NotAbsolute(String),

    #[error("Unbalanced brackets or quotes in {0}")]
    Unbalanced(String),

    #[error("Unsupported step '{step}' in {expression}")]
    UnsupportedStep { expression: String, step: String },

    #[error("Unsupported predicate '[{predicate}]' in {expression}")]
    UnsupportedPredicate {
        expression: String,
        predicate: String,
    },

    #[error("Selector '{selector}' compiled from {expression} is invalid: {message}")]
    Selector {
        expression: String,
        selector: String,
        message: String,
    },
}

/// What an expression extracts from each matched element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The element itself (text, or outer HTML with the `html:` prefix)
    Element,
    /// The value of one attribute
    Attribute(String),
    /// Text nodes that are direct children of the element
    OwnText,
    /// Every descendant text node
    AllText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

/// A compiled XPath expression
#[derive(Clone)]
pub struct XPath {
    expression: String,
    html: bool,
    css: String,
    selector: Selector,
    target: Target,
}

impl XPath {
    /// Compiles an expression
    ///
    /// # Example
    ///
    /// ```
    /// use xscrape::page::XPath;
    ///
    /// let xpath = XPath::parse("//div[@class='gallery']//img/@src").unwrap();
    /// assert_eq!(xpath.css(), r#"div[class="gallery"] img"#);
    /// assert!(!xpath.is_html());
    /// ```
    pub fn parse(expression: &str) -> Result<Self, XPathError> {
        let trimmed = expression.trim();
        let (html, path) = match trimmed.strip_prefix(HTML_PREFIX) {
            Some(rest) => (true, rest.trim()),
            None => (false, trimmed),
        };

        if path.is_empty() {
            return Err(XPathError::Empty);
        }
        if !path.starts_with('/') {
            return Err(XPathError::NotAbsolute(trimmed.to_string()));
        }

        let mut steps =
            split_steps(path).ok_or_else(|| XPathError::Unbalanced(trimmed.to_string()))?;
        let target = take_target(trimmed, &mut steps)?;

        if steps.is_empty() {
            return Err(XPathError::UnsupportedStep {
                expression: trimmed.to_string(),
                step: path.to_string(),
            });
        }

        let mut css = String::new();
        for (position, (axis, step)) in steps.iter().enumerate() {
            let compound = compile_step(trimmed, step)?;
            match (position, axis) {
                (0, Axis::Descendant) => css.push_str(&compound),
                (0, Axis::Child) => {
                    css.push_str(&compound);
                    css.push_str(":root");
                }
                (_, Axis::Descendant) => {
                    css.push(' ');
                    css.push_str(&compound);
                }
                (_, Axis::Child) => {
                    css.push_str(" > ");
                    css.push_str(&compound);
                }
            }
        }

        let selector = Selector::parse(&css).map_err(|e| XPathError::Selector {
            expression: trimmed.to_string(),
            selector: css.clone(),
            message: format!("{:?}", e),
        })?;

        Ok(Self {
            expression: trimmed.to_string(),
            html,
            css,
            selector,
            target,
        })
    }

    /// The expression as written, including any `html:` prefix
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// True if matched elements are returned as HTML fragments
    pub fn is_html(&self) -> bool {
        self.html
    }

    /// The CSS selector the location path compiled to
    pub fn css(&self) -> &str {
        &self.css
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Returns the matched elements of a document in document order
    pub(crate) fn select<'a>(&'a self, document: &'a Html) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        document.select(&self.selector)
    }

    /// Evaluates the expression as content
    ///
    /// Text results are trimmed and whitespace-only text is dropped. HTML
    /// fragments are returned untouched.
    pub(crate) fn contents(&self, document: &Html) -> Vec<String> {
        let mut values = Vec::new();

        for element in self.select(document) {
            match &self.target {
                Target::Attribute(name) => {
                    if let Some(value) = element.value().attr(name) {
                        values.push(value.to_string());
                    }
                }
                Target::Element if self.html => values.push(element.html()),
                Target::Element => push_text(&mut values, &element.text().collect::<String>()),
                Target::OwnText => {
                    for child in element.children() {
                        if let Some(text) = child.value().as_text() {
                            push_text(&mut values, text);
                        }
                    }
                }
                Target::AllText => {
                    for text in element.text() {
                        push_text(&mut values, text);
                    }
                }
            }
        }

        values
    }

    /// Evaluates the expression as link hrefs
    ///
    /// Element targets fall back to the element's `href`, then `src` attribute.
    pub(crate) fn hrefs(&self, document: &Html) -> Vec<String> {
        match &self.target {
            Target::Element => self
                .select(document)
                .filter_map(|element| {
                    let value = element.value();
                    value.attr("href").or_else(|| value.attr("src"))
                })
                .map(str::to_string)
                .collect(),
            _ => self.contents(document),
        }
    }
}

impl PartialEq for XPath {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression
    }
}

impl Eq for XPath {}

impl fmt::Debug for XPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XPath")
            .field("expression", &self.expression)
            .field("css", &self.css)
            .field("target", &self.target)
            .finish()
    }
}

impl fmt::Display for XPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

impl std::str::FromStr for XPath {
    type Err = XPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn push_text(values: &mut Vec<String>, text: &str) {
    let text = text.trim();
    if !text.is_empty() {
        values.push(text.to_string());
    }
}

/// Splits a location path into (axis, step) pairs, ignoring slashes that sit
/// inside predicates or string literals
fn split_steps(path: &str) -> Option<Vec<(Axis, String)>> {
    let mut steps = Vec::new();
    let mut current = String::new();
    let mut axis = None;
    let mut slashes = 0;
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for c in path.chars() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            current.push(c);
            continue;
        }

        match c {
            '\'' | '"' => {
                quote = Some(c);
                current.push(c);
            }
            '[' | '(' => {
                depth += 1;
                current.push(c);
            }
            ']' | ')' => {
                depth = depth.checked_sub(1)?;
                current.push(c);
            }
            '/' if depth == 0 => {
                if !current.is_empty() {
                    steps.push((axis?, std::mem::take(&mut current)));
                    slashes = 0;
                }
                slashes += 1;
                axis = match slashes {
                    1 => Some(Axis::Child),
                    2 => Some(Axis::Descendant),
                    _ => return None,
                };
            }
            _ => current.push(c),
        }
    }

    if quote.is_some() || depth != 0 || current.is_empty() {
        return None;
    }
    steps.push((axis?, current.trim().to_string()));

    Some(
        steps
            .into_iter()
            .map(|(axis, step)| (axis, step.trim().to_string()))
            .collect(),
    )
}

/// Removes a trailing `@attr` or `text()` step and returns the target it denotes
fn take_target(expression: &str, steps: &mut Vec<(Axis, String)>) -> Result<Target, XPathError> {
    let Some((axis, last)) = steps.last() else {
        return Ok(Target::Element);
    };

    let target = if last == "text()" {
        match axis {
            Axis::Child => Target::OwnText,
            Axis::Descendant => Target::AllText,
        }
    } else if let Some(name) = last.strip_prefix('@') {
        if *axis == Axis::Descendant || !is_name(name) {
            return Err(XPathError::UnsupportedStep {
                expression: expression.to_string(),
                step: last.clone(),
            });
        }
        Target::Attribute(name.to_string())
    } else {
        return Ok(Target::Element);
    };

    steps.pop();
    Ok(target)
}

/// Compiles one element step (`name[pred][pred]`) into a compound selector
fn compile_step(expression: &str, step: &str) -> Result<String, XPathError> {
    let unsupported_step = || XPathError::UnsupportedStep {
        expression: expression.to_string(),
        step: step.to_string(),
    };

    let (name, mut rest) = match step.find('[') {
        Some(i) => (&step[..i], &step[i..]),
        None => (step, ""),
    };
    let name = name.trim();
    if name != "*" && !is_name(name) {
        return Err(unsupported_step());
    }

    let mut compound = name.to_string();
    while !rest.is_empty() {
        let (predicate, remainder) = next_predicate(rest).ok_or_else(unsupported_step)?;
        for clause in split_and(predicate) {
            compound.push_str(&compile_predicate(expression, name, clause.trim())?);
        }
        rest = remainder.trim_start();
    }

    Ok(compound)
}

/// Returns the body of the leading `[...]` and whatever follows it
fn next_predicate(input: &str) -> Option<(&str, &str)> {
    let body = input.strip_prefix('[')?;
    let mut quote: Option<char> = None;
    let mut depth = 0usize;

    for (i, c) in body.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') if depth == 0 => return Some((&body[..i], &body[i + 1..])),
            (None, ']') => depth -= 1,
            _ => {}
        }
    }

    None
}

/// Splits a predicate on top-level ` and `
fn split_and(predicate: &str) -> Vec<&str> {
    let mut clauses = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    let bytes = predicate.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if bytes[i] == b' ' && predicate[i..].starts_with(" and ") => {
                clauses.push(&predicate[start..i]);
                i += " and ".len();
                start = i;
                continue;
            }
            None => {}
        }
        i += 1;
    }
    clauses.push(&predicate[start..]);
    clauses
}

fn compile_predicate(expression: &str, name: &str, predicate: &str) -> Result<String, XPathError> {
    let unsupported = || XPathError::UnsupportedPredicate {
        expression: expression.to_string(),
        predicate: predicate.to_string(),
    };

    if let Ok(position) = predicate.parse::<u32>() {
        if position == 0 {
            return Err(unsupported());
        }
        return Ok(if name == "*" {
            format!(":nth-child({})", position)
        } else {
            format!(":nth-of-type({})", position)
        });
    }

    if predicate == "last()" {
        return Ok(if name == "*" {
            ":last-child".to_string()
        } else {
            ":last-of-type".to_string()
        });
    }

    for (function, operator) in [("contains", "*="), ("starts-with", "^="), ("ends-with", "$=")] {
        if let Some(args) = predicate
            .strip_prefix(function)
            .map(str::trim_start)
            .and_then(|s| s.strip_prefix('('))
            .and_then(|s| s.strip_suffix(')'))
        {
            let (attribute, literal) = args.split_once(',').ok_or_else(unsupported)?;
            let attribute = attribute_name(attribute.trim()).ok_or_else(unsupported)?;
            let value = string_literal(literal.trim()).ok_or_else(unsupported)?;
            return Ok(format!("[{}{}\"{}\"]", attribute, operator, escape_css(value)));
        }
    }

    if let Some((attribute, literal)) = predicate.split_once('=') {
        let attribute = attribute_name(attribute.trim()).ok_or_else(unsupported)?;
        let value = string_literal(literal.trim()).ok_or_else(unsupported)?;
        return Ok(format!("[{}=\"{}\"]", attribute, escape_css(value)));
    }

    let attribute = attribute_name(predicate).ok_or_else(unsupported)?;
    Ok(format!("[{}]", attribute))
}

fn attribute_name(input: &str) -> Option<&str> {
    input.strip_prefix('@').filter(|name| is_name(name))
}

fn string_literal(input: &str) -> Option<&str> {
    let quote = input.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let inner = input.strip_prefix(quote)?.strip_suffix(quote)?;
    (!inner.contains(quote)).then_some(inner)
}

fn is_name(input: &str) -> bool {
    let mut chars = input.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn escape_css(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
