//! Path representation and the dot/bracket path parser.
//!
//! Paths are sequences of segments that describe a location in a value tree.
//! Each segment is either a key (for objects) or an index (for arrays).
//! Indices are signed: negative values count back from the end of the array
//! they are applied to.
//!
//! Only bracket syntax produces an index. A dot segment made of digits stays a
//! key, so `a.1` addresses the object key `"1"` while `a[1]` addresses the
//! second array element.

use crate::{HistoryError, HistoryResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, OnceLock};

/// A single segment in a path.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Seg {
    /// Object key access: `{"key": value}`
    Key(String),
    /// Array index access: `[index]`, negative from the end.
    Index(i64),
}

impl Seg {
    /// Create a key segment.
    #[inline]
    pub fn key(k: impl Into<String>) -> Self {
        Seg::Key(k.into())
    }

    /// Create an index segment.
    #[inline]
    pub fn index(i: i64) -> Self {
        Seg::Index(i)
    }

    /// Returns true if this is an index segment.
    #[inline]
    pub fn is_index(&self) -> bool {
        matches!(self, Seg::Index(_))
    }

    /// Get the index if this is an index segment.
    #[inline]
    pub fn as_index(&self) -> Option<i64> {
        match self {
            Seg::Key(_) => None,
            Seg::Index(i) => Some(*i),
        }
    }

    /// The object key this segment addresses. Indices use their decimal form.
    pub fn to_key(&self) -> String {
        match self {
            Seg::Key(k) => k.clone(),
            Seg::Index(i) => i.to_string(),
        }
    }
}

impl fmt::Display for Seg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seg::Key(k) => write!(f, ".{}", k),
            Seg::Index(i) => write!(f, "[{}]", i),
        }
    }
}

impl From<String> for Seg {
    fn from(s: String) -> Self {
        Seg::Key(s)
    }
}

impl From<&str> for Seg {
    fn from(s: &str) -> Self {
        Seg::Key(s.to_owned())
    }
}

impl From<i64> for Seg {
    fn from(i: i64) -> Self {
        Seg::Index(i)
    }
}

impl From<i32> for Seg {
    fn from(i: i32) -> Self {
        Seg::Index(i64::from(i))
    }
}

impl From<usize> for Seg {
    fn from(i: usize) -> Self {
        Seg::Index(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

/// A complete path into a value tree.
///
/// # Examples
///
/// ```
/// use tirea_history::Path;
///
/// let path = Path::root().key("users").index(0).key("name");
/// assert_eq!(path.len(), 3);
/// assert_eq!(path.to_string(), "$.users[0].name");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Path(Vec<Seg>);

impl Path {
    /// Create an empty path (root).
    #[inline]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Create a path from a vector of segments.
    #[inline]
    pub fn from_segments(segments: Vec<Seg>) -> Self {
        Self(segments)
    }

    /// Append a key segment and return self (builder pattern).
    #[inline]
    pub fn key(mut self, k: impl Into<String>) -> Self {
        self.0.push(Seg::Key(k.into()));
        self
    }

    /// Append an index segment and return self (builder pattern).
    #[inline]
    pub fn index(mut self, i: i64) -> Self {
        self.0.push(Seg::Index(i));
        self
    }

    /// Push a segment onto the path (mutating).
    #[inline]
    pub fn push(&mut self, seg: Seg) {
        self.0.push(seg);
    }

    /// Pop the last segment from the path.
    #[inline]
    pub fn pop(&mut self) -> Option<Seg> {
        self.0.pop()
    }

    /// Get the segments of this path.
    #[inline]
    pub fn segments(&self) -> &[Seg] {
        &self.0
    }

    /// Check if this path is empty (root).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the number of segments in this path.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Get the first segment.
    #[inline]
    pub fn first(&self) -> Option<&Seg> {
        self.0.first()
    }

    /// Get the last segment.
    #[inline]
    pub fn last(&self) -> Option<&Seg> {
        self.0.last()
    }

    /// Join this path with another path.
    #[inline]
    pub fn join(&self, other: &Path) -> Path {
        let mut result = self.clone();
        result.0.extend(other.0.iter().cloned());
        result
    }

    /// Check if this path starts with another path.
    #[inline]
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Iterate over the segments.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Seg> {
        self.0.iter()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for seg in &self.0 {
            write!(f, "{}", seg)?;
        }
        Ok(())
    }
}

impl FromIterator<Seg> for Path {
    fn from_iter<I: IntoIterator<Item = Seg>>(iter: I) -> Self {
        Path(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a Seg;
    type IntoIter = std::slice::Iter<'a, Seg>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl std::ops::Index<usize> for Path {
    type Output = Seg;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl From<Vec<Seg>> for Path {
    fn from(segments: Vec<Seg>) -> Self {
        Path(segments)
    }
}

/// Construct a `Path` from a sequence of segments.
///
/// # Examples
///
/// ```
/// use tirea_history::path;
///
/// // String literals become Key segments
/// let p = path!("users", "alice", "email");
///
/// // Integers become Index segments, negative ones count from the end
/// let p = path!("items", -1, "name");
/// ```
#[macro_export]
macro_rules! path {
    () => {
        $crate::Path::root()
    };
    ($($seg:expr),+ $(,)?) => {{
        let mut p = $crate::Path::root();
        $(
            p.push($crate::Seg::from($seg));
        )+
        p
    }};
}

/// Call-boundary path argument.
///
/// Operations accept either a path expression or explicit segments; the
/// choice is made once here and everything downstream works on `Path`.
#[derive(Clone, Debug, PartialEq)]
pub enum Target {
    /// Dot/bracket path expression, parsed through the shared cache.
    Path(String),
    /// Pre-split segments, used as given.
    Segments(Path),
}

impl Target {
    /// Resolve to segments. An empty expression addresses the root; any other
    /// expression that fails to parse is an `InvalidPath` error.
    pub fn resolve(&self) -> HistoryResult<Path> {
        match self {
            Target::Path(expr) => try_parse_path(expr),
            Target::Segments(path) => Ok(path.clone()),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Path(expr) => write!(f, "{}", expr),
            Target::Segments(path) => write!(f, "{}", path),
        }
    }
}

impl From<&str> for Target {
    fn from(s: &str) -> Self {
        Target::Path(s.to_owned())
    }
}

impl From<String> for Target {
    fn from(s: String) -> Self {
        Target::Path(s)
    }
}

impl From<&String> for Target {
    fn from(s: &String) -> Self {
        Target::Path(s.clone())
    }
}

impl From<Path> for Target {
    fn from(p: Path) -> Self {
        Target::Segments(p)
    }
}

impl From<&Path> for Target {
    fn from(p: &Path) -> Self {
        Target::Segments(p.clone())
    }
}

impl From<Vec<Seg>> for Target {
    fn from(segments: Vec<Seg>) -> Self {
        Target::Segments(Path(segments))
    }
}

// Lives for the process lifetime; path expressions are almost always literals.
fn path_cache() -> &'static Mutex<HashMap<String, Path>> {
    static CACHE: OnceLock<Mutex<HashMap<String, Path>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Parse a dot/bracket path expression into a `Path`.
///
/// Returns an empty path for the empty string and for anything that cannot
/// be parsed: unbalanced brackets, bracket content that is not an optionally
/// signed integer, or text glued to a closing bracket. `\.` and `\[` escape
/// literal dots and brackets; any other backslash is kept as written. A `]`
/// that closes an escaped `[` in the same key is literal too, so `a\[0]`
/// addresses the key `"a[0]"`.
///
/// ```
/// use tirea_history::{parse_path, path};
///
/// assert_eq!(parse_path("a.b[0][-1]"), path!("a", "b", 0, -1));
/// assert_eq!(parse_path("a.1"), path!("a", "1"));
/// assert_eq!(parse_path("a.[0]"), path!("a", "", 0));
/// assert_eq!(parse_path(r"a\.b"), path!("a.b"));
/// assert!(parse_path("a[b]").is_empty());
/// ```
pub fn parse_path(input: &str) -> Path {
    if input.is_empty() {
        return Path::root();
    }

    let cache = path_cache();
    if let Ok(guard) = cache.lock() {
        if let Some(hit) = guard.get(input) {
            return hit.clone();
        }
    }

    let parsed = parse_uncached(input).unwrap_or_default();
    tracing::trace!(path = input, segments = parsed.len(), "path cache miss");
    if let Ok(mut guard) = cache.lock() {
        guard.insert(input.to_owned(), parsed.clone());
    }
    parsed
}

/// Parse a path expression, turning the unparseable sentinel into an error.
pub fn try_parse_path(input: &str) -> HistoryResult<Path> {
    if input.is_empty() {
        return Ok(Path::root());
    }
    let parsed = parse_path(input);
    if parsed.is_empty() {
        return Err(HistoryError::invalid_path(input));
    }
    Ok(parsed)
}

/// Number of cached path expressions.
pub fn path_cache_len() -> usize {
    path_cache().lock().map(|guard| guard.len()).unwrap_or(0)
}

/// Drop every cached parse.
pub fn clear_path_cache() {
    if let Ok(mut guard) = path_cache().lock() {
        guard.clear();
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Token {
    Start,
    Dot,
    Key,
    Bracket,
}

fn parse_uncached(input: &str) -> Option<Path> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut last = Token::Start;
    // Escaped `[` in the current key still waiting for their `]`.
    let mut open_escapes = 0usize;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if last == Token::Bracket {
                    return None;
                }
                match chars.peek() {
                    Some('.') => current.push(chars.next()?),
                    Some('[') => {
                        current.push(chars.next()?);
                        open_escapes += 1;
                    }
                    _ => current.push('\\'),
                }
                last = Token::Key;
            }
            '.' => {
                // After `]` the dot only separates; elsewhere it closes a
                // (possibly empty) key.
                if last != Token::Bracket {
                    segments.push(Seg::Key(std::mem::take(&mut current)));
                }
                open_escapes = 0;
                last = Token::Dot;
            }
            '[' => {
                match last {
                    Token::Key => segments.push(Seg::Key(std::mem::take(&mut current))),
                    Token::Dot => segments.push(Seg::Key(String::new())),
                    Token::Start | Token::Bracket => {}
                }
                open_escapes = 0;
                let mut content = String::new();
                loop {
                    match chars.next()? {
                        ']' => break,
                        ch => content.push(ch),
                    }
                }
                segments.push(Seg::Index(parse_index(&content)?));
                last = Token::Bracket;
            }
            // Closes an escaped `[` of the same key; unmatched otherwise.
            ']' if last == Token::Key && open_escapes > 0 => {
                current.push(']');
                open_escapes -= 1;
            }
            ']' => return None,
            other => {
                if last == Token::Bracket {
                    return None;
                }
                current.push(other);
                last = Token::Key;
            }
        }
    }

    match last {
        Token::Key => segments.push(Seg::Key(current)),
        Token::Dot => segments.push(Seg::Key(String::new())),
        Token::Start | Token::Bracket => {}
    }
    Some(Path(segments))
}

fn parse_index(content: &str) -> Option<i64> {
    let digits = content
        .strip_prefix('-')
        .or_else(|| content.strip_prefix('+'))
        .unwrap_or(content);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    content.parse().ok()
}
