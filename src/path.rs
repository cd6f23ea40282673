//! Path expressions: `authors__books[join:left,on:id=author_id]__title`.
//!
//! A path is split on `__` into segments. Every segment but the last names a
//!  relation hop; the last names the target column, which may be a function
//!  call such as `AVG(price)`. Underscores inside `[...]` or `(...)` never
//!  separate, and in a run of three or more the first two do.
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;

use crate::error::ParseError;
use crate::join::JoinType;

pub const SEGMENT_SEPARATOR: &str = "__";

pub const OPTION_ALIAS: &str = "alias";
pub const OPTION_JOIN: &str = "join";
pub const OPTION_ON: &str = "on";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Scalar(String),
    /// `key:left=right` pairs, accumulated in order of appearance.
    Pairs(IndexMap<String, String>),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(v) => write!(f, "{v}"),
            Self::Pairs(pairs) => {
                for (i, (left, right)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{left}={right}")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    name: String,
    options: IndexMap<String, OptionValue>,
}

impl Segment {
    pub fn new(name: impl Into<String>) -> Result<Self, ParseError> {
        Self::with_options(name, IndexMap::new())
    }

    pub fn with_options(
        name: impl Into<String>,
        options: IndexMap<String, OptionValue>,
    ) -> Result<Self, ParseError> {
        let name = name.into();
        if !is_valid_name(&name) {
            return Err(ParseError::InvalidSegmentName(name));
        }
        for (key, value) in &options {
            check_option_text(&name, key, true)?;
            match value {
                OptionValue::Scalar(v) => check_option_text(&name, v, false)?,
                OptionValue::Pairs(pairs) => {
                    for (left, right) in pairs {
                        check_option_text(&name, left, false)?;
                        check_option_text(&name, right, false)?;
                    }
                }
            }
        }
        if let Some(OptionValue::Scalar(join)) = options.get(OPTION_JOIN) {
            join.parse::<JoinType>()?;
        }
        Ok(Self { name, options })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &IndexMap<String, OptionValue> {
        &self.options
    }

    pub fn option(&self, key: &str) -> Option<&OptionValue> {
        self.options.get(key)
    }

    pub fn scalar_option(&self, key: &str) -> Option<&str> {
        match self.options.get(key) {
            Some(OptionValue::Scalar(v)) => Some(v),
            _ => None,
        }
    }

    pub fn pairs_option(&self, key: &str) -> Option<&IndexMap<String, String>> {
        match self.options.get(key) {
            Some(OptionValue::Pairs(pairs)) => Some(pairs),
            _ => None,
        }
    }

    pub fn alias(&self) -> Option<&str> {
        self.scalar_option(OPTION_ALIAS)
    }

    /// The name other segments use to refer to this one: its alias when it
    ///  has one, else its name.
    pub fn reference(&self) -> &str {
        self.alias().unwrap_or(&self.name)
    }

    /// Validated at construction, so an unparseable value can't appear here.
    pub fn join_type(&self) -> Option<JoinType> {
        self.scalar_option(OPTION_JOIN).and_then(|j| j.parse().ok())
    }

    /// Join key pairs `{source column: target column}`.
    pub fn join_keys(&self) -> Option<&IndexMap<String, String>> {
        self.pairs_option(OPTION_ON)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if self.options.is_empty() {
            return Ok(());
        }
        write!(f, "[")?;
        let mut first = true;
        for (key, value) in &self.options {
            let values: Vec<String> = match value {
                OptionValue::Scalar(v) => vec![v.clone()],
                OptionValue::Pairs(pairs) => pairs.iter().map(|(l, r)| format!("{l}={r}")).collect(),
            };
            for v in values {
                if !first {
                    write!(f, ",")?;
                }
                first = false;
                write!(f, "{key}:{v}")?;
            }
        }
        write!(f, "]")
    }
}

/// A non-empty sequence of segments. The last one is the target column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    /// Fails for segment lists that wouldn't print back to the same path: a
    ///  relation ending in `_` with no options runs into the separator.
    pub fn new(segments: Vec<Segment>) -> Result<Self, ParseError> {
        if segments.is_empty() {
            return Err(ParseError::EmptyPath);
        }
        if let Some(segment) = segments[..segments.len() - 1]
            .iter()
            .find(|s| s.options.is_empty() && s.name.ends_with('_'))
        {
            return Err(ParseError::AmbiguousSegment(segment.name.clone()));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn first(&self) -> &Segment {
        &self.segments[0]
    }

    pub fn last(&self) -> &Segment {
        &self.segments[self.segments.len() - 1]
    }

    /// The segment right before the target column, if any.
    pub fn parent(&self) -> Option<&Segment> {
        self.segments.len().checked_sub(2).map(|i| &self.segments[i])
    }

    /// Every segment except the last.
    pub fn relations(&self) -> &[Segment] {
        &self.segments[..self.segments.len() - 1]
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "{SEGMENT_SEPARATOR}")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

/// Parses a path expression into its segments.
pub fn parse(expression: &str) -> Result<Path, ParseError> {
    if expression.is_empty() {
        return Err(ParseError::EmptyPath);
    }
    let segments = split_segments(expression)
        .into_iter()
        .enumerate()
        .map(|(position, part)| {
            if part.is_empty() {
                Err(ParseError::EmptySegment { position })
            } else {
                parse_segment(part)
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    Path::new(segments)
}

/// Splits on `__` outside brackets and parentheses.
fn split_segments(expression: &str) -> Vec<&str> {
    let bytes = expression.as_bytes();
    let mut parts = Vec::new();
    let (mut depth, mut from, mut i) = (0usize, 0, 0);
    while i < bytes.len() {
        match bytes[i] {
            b'[' | b'(' => depth += 1,
            b']' | b')' => depth = depth.saturating_sub(1),
            b'_' if depth == 0 && bytes.get(i + 1) == Some(&b'_') => {
                parts.push(&expression[from..i]);
                i += SEGMENT_SEPARATOR.len();
                from = i;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&expression[from..]);
    parts
}

fn parse_segment(part: &str) -> Result<Segment, ParseError> {
    if let Some(open) = part.find('[')
        && part.ends_with(']')
    {
        let name = &part[..open];
        if name.is_empty() {
            return Err(malformed(part, "missing segment name before options"));
        }
        let options = parse_options(part, &part[open + 1..part.len() - 1])?;
        return Segment::with_options(name, options);
    }

    // `name+join`, `name:alias` and `name+join:alias` from older clients.
    // Function calls may legitimately contain both characters.
    if !part.contains('(') && (part.contains('+') || part.contains(':')) {
        return parse_legacy_segment(part);
    }

    Segment::new(part)
}

fn parse_options(segment: &str, body: &str) -> Result<IndexMap<String, OptionValue>, ParseError> {
    if body.trim().is_empty() {
        return Err(malformed(segment, "empty option list"));
    }

    let mut options: IndexMap<String, OptionValue> = IndexMap::new();
    for option in body.split(',') {
        let Some((key, value)) = option.split_once(':') else {
            return Err(malformed(segment, &format!("option `{option}` is not key:value")));
        };
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            return Err(malformed(segment, &format!("option `{option}` has an empty side")));
        }

        match value.split_once('=') {
            Some((left, right)) => {
                let (left, right) = (left.trim(), right.trim());
                if left.is_empty() || right.is_empty() {
                    return Err(malformed(segment, &format!("pair `{value}` has an empty side")));
                }
                let entry = options
                    .entry(key.to_string())
                    .or_insert_with(|| OptionValue::Pairs(IndexMap::new()));
                let OptionValue::Pairs(pairs) = entry else {
                    return Err(malformed(segment, &format!("option `{key}` mixes values and pairs")));
                };
                pairs.insert(left.to_string(), right.to_string());
            }
            None => {
                if let Some(OptionValue::Pairs(_)) = options.get(key) {
                    return Err(malformed(segment, &format!("option `{key}` mixes values and pairs")));
                }
                options.insert(key.to_string(), OptionValue::Scalar(value.to_string()));
            }
        }
    }
    Ok(options)
}

fn parse_legacy_segment(part: &str) -> Result<Segment, ParseError> {
    let (rest, alias) = match part.split_once(':') {
        Some((rest, alias)) => (rest, Some(alias)),
        None => (part, None),
    };
    let (name, join) = match rest.split_once('+') {
        Some((name, join)) => (name, Some(join)),
        None => (rest, None),
    };

    let mut options = IndexMap::new();
    if let Some(join) = join {
        options.insert(OPTION_JOIN.to_string(), OptionValue::Scalar(join.to_string()));
    }
    if let Some(alias) = alias {
        if alias.is_empty() {
            return Err(malformed(part, "empty alias"));
        }
        options.insert(OPTION_ALIAS.to_string(), OptionValue::Scalar(alias.to_string()));
    }
    Segment::with_options(name, options)
}

/// `[A-Za-z0-9_]+` without a separator in it, optionally followed by a
///  parenthesized suffix running to the end of the name.
fn is_valid_name(name: &str) -> bool {
    let ident_len = name
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
        .count();
    if ident_len == 0 || name[..ident_len].contains(SEGMENT_SEPARATOR) {
        return false;
    }
    let rest = &name[ident_len..];
    rest.is_empty() || (rest.starts_with('(') && rest.ends_with(')') && !rest.contains('['))
}

/// Option keys, values and pair sides must survive `[key:left=right]`
///  printing: no list punctuation, no brackets or parentheses and no
///  surrounding whitespace. Keys can't hold `:` either.
fn check_option_text(segment: &str, text: &str, is_key: bool) -> Result<(), ParseError> {
    const FORBIDDEN: [char; 6] = ['[', ']', '(', ')', ',', '='];
    if is_key && text.contains(':') {
        return Err(malformed(segment, &format!("option key `{text}` contains `:`")));
    }
    if text.is_empty() || text.trim() != text || text.contains(&FORBIDDEN[..]) {
        return Err(malformed(segment, &format!("option text `{text}` can't be written back")));
    }
    Ok(())
}

fn malformed(segment: &str, reason: &str) -> ParseError {
    ParseError::MalformedOptions {
        segment: segment.to_string(),
        reason: reason.to_string(),
    }
}
