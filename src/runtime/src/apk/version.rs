//! APK version ordering and dependency constraints.
//!
//! Versions follow the Alpine grammar
//! `digits(.digits)*[letter](_suffix[digits])*[-rN]`. Anything that does
//! not parse still gets a total order: it sorts after every valid version
//! and lexically among its peers, so a malformed index never panics the
//! resolver.

use std::cmp::Ordering;
use std::fmt;

use apk2oci_core::error::{ChartError, Result};

/// Rank of "no suffix", between the pre-release and post-release suffixes.
const NO_SUFFIX_RANK: u8 = 4;

/// A package version.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    parsed: Option<Parsed>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Parsed {
    numbers: Vec<u64>,
    letter: Option<char>,
    suffixes: Vec<(u8, u64)>,
    revision: u64,
}

impl Version {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let parsed = parse(&raw);
        Self { raw, parsed }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the string follows the APK version grammar.
    pub fn is_valid(&self) -> bool {
        self.parsed.is_some()
    }

    /// `~` semantics: `self` starts with `prefix` at a component boundary.
    fn fuzzy_matches(&self, prefix: &Version) -> bool {
        match self.raw.strip_prefix(prefix.as_str()) {
            Some("") => true,
            Some(rest) => rest.starts_with(['.', '_', '-']) || {
                // "1.2" matches "1.2a" but not "1.20"
                rest.starts_with(|c: char| c.is_ascii_alphabetic())
            },
            None => false,
        }
    }
}

fn suffix_rank(name: &str) -> Option<u8> {
    Some(match name {
        "alpha" => 0,
        "beta" => 1,
        "pre" => 2,
        "rc" => 3,
        "cvs" => 5,
        "svn" => 6,
        "git" => 7,
        "hg" => 8,
        "p" => 9,
        _ => return None,
    })
}

fn parse(raw: &str) -> Option<Parsed> {
    let (main, revision) = match raw.rsplit_once("-r") {
        Some((main, rev)) if !rev.is_empty() && rev.bytes().all(|b| b.is_ascii_digit()) => {
            (main, rev.parse().ok()?)
        }
        _ => (raw, 0),
    };
    if main.is_empty() || main.contains('-') {
        return None;
    }

    let mut parts = main.split('_');
    let head = parts.next()?;

    let mut numbers = Vec::new();
    let mut letter = None;
    let components: Vec<&str> = head.split('.').collect();
    for (i, component) in components.iter().enumerate() {
        let last = i + 1 == components.len();
        let (digits, tail) = match component.find(|c: char| !c.is_ascii_digit()) {
            Some(pos) => component.split_at(pos),
            None => (*component, ""),
        };
        if digits.is_empty() {
            return None;
        }
        numbers.push(digits.parse().ok()?);
        if !tail.is_empty() {
            let mut chars = tail.chars();
            let c = chars.next()?;
            if !last || !c.is_ascii_lowercase() || chars.next().is_some() {
                return None;
            }
            letter = Some(c);
        }
    }

    let mut suffixes = Vec::new();
    for suffix in parts {
        let split = suffix
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(suffix.len());
        let (name, num) = suffix.split_at(split);
        let rank = suffix_rank(name)?;
        let num = if num.is_empty() { 0 } else { num.parse().ok()? };
        suffixes.push((rank, num));
    }

    Some(Parsed {
        numbers,
        letter,
        suffixes,
        revision,
    })
}

fn compare_parsed(a: &Parsed, b: &Parsed) -> Ordering {
    let len = a.numbers.len().max(b.numbers.len());
    for i in 0..len {
        match (a.numbers.get(i), b.numbers.get(i)) {
            (Some(x), Some(y)) => match x.cmp(y) {
                Ordering::Equal => {}
                other => return other,
            },
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (None, None) => break,
        }
    }

    match a.letter.cmp(&b.letter) {
        Ordering::Equal => {}
        other => return other,
    }

    let len = a.suffixes.len().max(b.suffixes.len());
    for i in 0..len {
        let x = a.suffixes.get(i).copied().unwrap_or((NO_SUFFIX_RANK, 0));
        let y = b.suffixes.get(i).copied().unwrap_or((NO_SUFFIX_RANK, 0));
        match x.cmp(&y) {
            Ordering::Equal => {}
            other => return other,
        }
    }

    a.revision.cmp(&b.revision)
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.parsed, &other.parsed) {
            (Some(a), Some(b)) => compare_parsed(a, b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.raw.cmp(&other.raw),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Comparison operator of a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ge,
    Le,
    Gt,
    Lt,
    Fuzzy,
}

impl Op {
    fn as_str(&self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ge => ">=",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Lt => "<",
            Op::Fuzzy => "~",
        }
    }
}

/// A version constraint; `None` accepts any version.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Constraint(Option<(Op, Version)>);

impl Constraint {
    pub fn any() -> Self {
        Self(None)
    }

    pub fn new(op: Op, version: Version) -> Self {
        Self(Some((op, version)))
    }

    /// Parse a version request: `1.2.3-r0` (exact) or `>=1.2`, `~1.2`, ...
    pub fn parse_request(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self::any());
        }
        if raw.starts_with(['<', '>', '=', '~']) {
            let (op, rest) = split_op(raw).ok_or_else(|| {
                ChartError::Resolution(format!("invalid version constraint '{}'", raw))
            })?;
            return Ok(Self::new(op, Version::new(rest)));
        }
        Ok(Self::new(Op::Eq, Version::new(raw)))
    }

    pub fn is_any(&self) -> bool {
        self.0.is_none()
    }

    pub fn matches(&self, version: &Version) -> bool {
        let Some((op, wanted)) = &self.0 else {
            return true;
        };
        match op {
            Op::Eq => version == wanted,
            Op::Ge => version >= wanted,
            Op::Le => version <= wanted,
            Op::Gt => version > wanted,
            Op::Lt => version < wanted,
            Op::Fuzzy => version.fuzzy_matches(wanted),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some((op, version)) => write!(f, "{}{}", op.as_str(), version),
            None => Ok(()),
        }
    }
}

fn split_op(raw: &str) -> Option<(Op, &str)> {
    const OPS: [(&str, Op); 8] = [
        (">=", Op::Ge),
        ("<=", Op::Le),
        ("=~", Op::Fuzzy),
        ("~=", Op::Fuzzy),
        ("=", Op::Eq),
        (">", Op::Gt),
        ("<", Op::Lt),
        ("~", Op::Fuzzy),
    ];
    OPS.iter().find_map(|(token, op)| {
        raw.strip_prefix(token)
            .filter(|rest| !rest.is_empty() && !rest.starts_with(['<', '>', '=', '~']))
            .map(|rest| (*op, rest))
    })
}

/// One dependency atom from a `D:` line or a world entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub constraint: Constraint,
    /// `!name`: the named package must not be installed
    pub conflict: bool,
}

impl Dependency {
    pub fn parse(atom: &str) -> Result<Self> {
        let atom = atom.trim();
        let (conflict, atom) = match atom.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, atom),
        };
        let (name, constraint) = match atom.find(['<', '>', '=', '~']) {
            Some(pos) => {
                let (op, version) = split_op(&atom[pos..]).ok_or_else(|| {
                    ChartError::Resolution(format!("invalid dependency '{}'", atom))
                })?;
                (&atom[..pos], Constraint::new(op, Version::new(version)))
            }
            None => (atom, Constraint::any()),
        };
        if name.is_empty() {
            return Err(ChartError::Resolution(format!(
                "invalid dependency '{}'",
                atom
            )));
        }
        Ok(Self {
            name: name.to_string(),
            constraint,
            conflict,
        })
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conflict {
            f.write_str("!")?;
        }
        write!(f, "{}{}", self.name, self.constraint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::new(s)
    }

    #[test]
    fn test_numeric_ordering() {
        assert!(v("1.2.10") > v("1.2.9"));
        assert!(v("1.20.3-r0") > v("1.9.0-r5"));
        assert!(v("1.2") < v("1.2.1"));
    }

    #[test]
    fn test_revision_ordering() {
        assert!(v("1.20.3-r1") > v("1.20.3-r0"));
        assert_eq!(v("1.20.3"), v("1.20.3-r0"));
    }

    #[test]
    fn test_suffix_ordering() {
        assert!(v("1.0_alpha1") < v("1.0_beta"));
        assert!(v("1.0_rc2") < v("1.0"));
        assert!(v("1.0") < v("1.0_p1"));
        assert!(v("1.0_git20240101") > v("1.0_svn5"));
    }

    #[test]
    fn test_letter_ordering() {
        assert!(v("1.2a") > v("1.2"));
        assert!(v("1.2b") > v("1.2a"));
    }

    #[test]
    fn test_invalid_sorts_last() {
        assert!(!v("not-a-version").is_valid());
        assert!(v("not-a-version") > v("999.0"));
        assert!(v("1.0-r0").is_valid());
    }

    #[test]
    fn test_constraint_request_exact() {
        let c = Constraint::parse_request("1.20.3-r0").unwrap();
        assert!(c.matches(&v("1.20.3-r0")));
        assert!(!c.matches(&v("1.20.3-r1")));
        assert_eq!(c.to_string(), "=1.20.3-r0");
    }

    #[test]
    fn test_constraint_operators() {
        let ge = Constraint::parse_request(">=1.2").unwrap();
        assert!(ge.matches(&v("1.2")));
        assert!(ge.matches(&v("1.3")));
        assert!(!ge.matches(&v("1.1")));

        let lt = Constraint::parse_request("<2").unwrap();
        assert!(lt.matches(&v("1.99")));
        assert!(!lt.matches(&v("2.0")));
    }

    #[test]
    fn test_fuzzy_constraint() {
        let c = Constraint::parse_request("~1.2").unwrap();
        assert!(c.matches(&v("1.2")));
        assert!(c.matches(&v("1.2.7-r3")));
        assert!(!c.matches(&v("1.20")));
    }

    #[test]
    fn test_any_constraint() {
        let c = Constraint::parse_request("").unwrap();
        assert!(c.is_any());
        assert!(c.matches(&v("0.0.1")));
        assert_eq!(c.to_string(), "");
    }

    #[test]
    fn test_dependency_parse() {
        let d = Dependency::parse("so:libc.so.6").unwrap();
        assert_eq!(d.name, "so:libc.so.6");
        assert!(d.constraint.is_any());

        let d = Dependency::parse("helm>=3.14").unwrap();
        assert_eq!(d.name, "helm");
        assert_eq!(d.constraint.to_string(), ">=3.14");

        let d = Dependency::parse("!busybox").unwrap();
        assert!(d.conflict);
        assert_eq!(d.to_string(), "!busybox");
    }

    #[test]
    fn test_dependency_parse_invalid() {
        assert!(Dependency::parse(">=1.0").is_err());
        assert!(Dependency::parse("foo>=").is_err());
    }
}
