//! Destination path templates
//!
//! A template is literal text with `{placeholder}` fields, evaluated for each
//! resource. `{{` and `}}` produce literal braces. Rendered values are
//! sanitised so that they cannot introduce path separators.
//!
//! | Placeholder | Value |
//! |-------------|-------|
//! | `{page_index}` / `{page_index:N}` | position of the page in the crawl, zero-padded to N |
//! | `{resource_index}` / `{resource_index:N}` | position of the resource on its page |
//! | `{page_host}` | host of the page URL |
//! | `{page_path}` | path segments of the page URL |
//! | `{page_name}` | last path segment of the page URL |
//! | `{resource_name}` | last path segment of the resource URL |
//! | `{resource_stem}` | resource name without its extension |
//! | `{resource_ext}` | extension of the resource name with its dot, or nothing |
//! | `{content:XPATH}` | first content of the page at XPATH |

use crate::job::ResourceInfo;
use crate::page::XPath;
use crate::storage::StorageError;
use crate::ConfigError;
use std::path::PathBuf;
use url::Url;

const FALLBACK_NAME: &str = "index";
const MAX_CONTENT_LEN: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    PageIndex,
    ResourceIndex,
    PageHost,
    PagePath,
    PageName,
    ResourceName,
    ResourceStem,
    ResourceExt,
}

#[derive(Debug, Clone)]
enum Part {
    Literal(String),
    Field { field: Field, width: usize },
    Content(XPath),
}

/// A compiled destination path template
#[derive(Debug, Clone)]
pub struct PathTemplate {
    source: String,
    parts: Vec<Part>,
}

impl PathTemplate {
    /// Compiles a template
    ///
    /// # Example
    ///
    /// ```
    /// use xscrape::storage::PathTemplate;
    ///
    /// assert!(PathTemplate::parse("{page_index:03}/{resource_name}").is_ok());
    /// assert!(PathTemplate::parse("{unknown}").is_err());
    /// ```
    pub fn parse(source: &str) -> Result<Self, ConfigError> {
        let invalid = |message: String| ConfigError::InvalidTemplate(format!("{}: {}", source, message));

        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(invalid("unmatched '}'".to_string())),
                '{' => {
                    let mut placeholder = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => placeholder.push(c),
                            None => return Err(invalid("unclosed '{'".to_string())),
                        }
                    }

                    if !literal.is_empty() {
                        parts.push(Part::Literal(std::mem::take(&mut literal)));
                    }
                    parts.push(parse_placeholder(&placeholder).map_err(invalid)?);
                }
                _ => literal.push(c),
            }
        }

        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }
        if parts.is_empty() {
            return Err(invalid("template is empty".to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Renders the relative path of a resource
    ///
    /// Empty, `.` and `..` segments are dropped so the result always stays
    /// below the destination root.
    pub fn render(&self, info: &ResourceInfo) -> Result<PathBuf, StorageError> {
        let mut rendered = String::new();

        for part in &self.parts {
            match part {
                Part::Literal(text) => rendered.push_str(text),
                Part::Field { field, width } => rendered.push_str(&render_field(*field, *width, info)),
                Part::Content(xpath) => {
                    let content = info.page.content(xpath).map_err(|e| StorageError::Destination {
                        url: info.url.to_string(),
                        message: e.to_string(),
                    })?;
                    let content: String = content.chars().take(MAX_CONTENT_LEN).collect();
                    rendered.push_str(&sanitize(&content));
                }
            }
        }

        let path: PathBuf = rendered
            .split(['/', '\\'])
            .filter(|segment| !matches!(segment.trim(), "" | "." | ".."))
            .collect();

        if path.as_os_str().is_empty() {
            return Err(StorageError::Destination {
                url: info.url.to_string(),
                message: format!("template '{}' rendered an empty path", self.source),
            });
        }

        Ok(path)
    }
}

fn parse_placeholder(placeholder: &str) -> Result<Part, String> {
    let (name, argument) = match placeholder.split_once(':') {
        Some((name, argument)) => (name.trim(), Some(argument)),
        None => (placeholder.trim(), None),
    };

    if name == "content" {
        let expression = argument.ok_or_else(|| "{content} needs an XPath".to_string())?;
        let xpath = XPath::parse(expression).map_err(|e| e.to_string())?;
        return Ok(Part::Content(xpath));
    }

    let field = match name {
        "page_index" => Field::PageIndex,
        "resource_index" => Field::ResourceIndex,
        "page_host" => Field::PageHost,
        "page_path" => Field::PagePath,
        "page_name" => Field::PageName,
        "resource_name" => Field::ResourceName,
        "resource_stem" => Field::ResourceStem,
        "resource_ext" => Field::ResourceExt,
        other => return Err(format!("unknown placeholder '{{{}}}'", other)),
    };

    let width = match (field, argument) {
        (_, None) => 0,
        (Field::PageIndex | Field::ResourceIndex, Some(width)) => width
            .trim()
            .parse::<usize>()
            .map_err(|_| format!("invalid width '{}' for {{{}}}", width, name))?,
        (_, Some(_)) => return Err(format!("{{{}}} takes no argument", name)),
    };

    Ok(Part::Field { field, width })
}

fn render_field(field: Field, width: usize, info: &ResourceInfo) -> String {
    let page_url = info.page.url();

    match field {
        Field::PageIndex => format!("{:0width$}", info.page_index, width = width),
        Field::ResourceIndex => format!("{:0width$}", info.index, width = width),
        Field::PageHost => sanitize(page_url.host_str().unwrap_or(FALLBACK_NAME)),
        Field::PagePath => {
            let segments: Vec<String> = path_segments(page_url).iter().map(|s| sanitize(s)).collect();
            if segments.is_empty() {
                FALLBACK_NAME.to_string()
            } else {
                segments.join("/")
            }
        }
        Field::PageName => sanitize(&last_segment(page_url)),
        Field::ResourceName => sanitize(&last_segment(&info.url)),
        Field::ResourceStem => {
            let name = last_segment(&info.url);
            sanitize(split_extension(&name).0)
        }
        Field::ResourceExt => {
            let name = last_segment(&info.url);
            match split_extension(&name).1 {
                Some(ext) => format!(".{}", sanitize(ext)),
                None => String::new(),
            }
        }
    }
}

fn path_segments(url: &Url) -> Vec<String> {
    url.path_segments()
        .map(|segments| {
            segments
                .filter(|s| !s.is_empty())
                .map(percent_decode)
                .collect()
        })
        .unwrap_or_default()
}

fn last_segment(url: &Url) -> String {
    path_segments(url)
        .pop()
        .unwrap_or_else(|| FALLBACK_NAME.to_string())
}

/// Splits `name.ext`; dotfiles and trailing dots have no extension
fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(i) if i > 0 && i + 1 < name.len() => (&name[..i], Some(&name[i + 1..])),
        _ => (name, None),
    }
}

fn percent_decode(segment: &str) -> String {
    url::form_urlencoded::parse(format!("x={}", segment.replace('+', "%2B")).as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())
        .unwrap_or_else(|| segment.to_string())
}

/// Replaces characters that are unsafe in file names
fn sanitize(value: &str) -> String {
    let cleaned: String = value
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "_".to_string()
    } else {
        cleaned
    }
}
