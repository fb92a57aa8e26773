//! Version parsing and version-constraint matching.
//!
//! Versions are plain [`semver::Version`] values. Informal strings that are
//! not valid semver (`"2"`, `"1.4"`, `"0.3.1.5"`) are coerced instead of
//! rejected, see [`parse_version`].
//!
//! Constraints are parsed into a [`VersionSpec`] tree:
//!
//! ```text
//! spec      := or_expr
//! or_expr   := and_expr ( "||" and_expr )*
//! and_expr  := range | group ( "&&" group )*
//! group     := atom | lower_bound " " upper_bound
//! range     := version " - " version
//! atom      := ("==" | ">=" | "<=" | "!=" | ">" | "<" | "=" | "") version_or_x
//! ```
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

pub use semver::Version;
use semver::{BuildMetadata, Prerelease};

use crate::plugin_system::error::PluginSystemError;

/// Parses a version string, coercing informal forms into semver.
///
/// Missing minor/patch components default to zero, a fourth numeric component
/// becomes build metadata and trailing text becomes a prerelease tag.
pub fn parse_version(input: &str) -> Result<Version, PluginSystemError> {
    let trimmed = input.trim();
    match Version::parse(trimmed) {
        Ok(version) => Ok(version),
        Err(_) => coerce_version(trimmed),
    }
}

fn coerce_version(input: &str) -> Result<Version, PluginSystemError> {
    let invalid = |reason: String| PluginSystemError::InvalidVersion {
        version: input.to_string(),
        reason,
    };

    let mut numbers: Vec<u64> = Vec::with_capacity(3);
    let mut rest = input;
    loop {
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            break;
        }
        let number = rest[..digits]
            .parse::<u64>()
            .map_err(|e| invalid(e.to_string()))?;
        numbers.push(number);
        rest = &rest[digits..];
        if numbers.len() == 3 {
            break;
        }
        match rest.strip_prefix('.') {
            Some(after) if after.starts_with(|c: char| c.is_ascii_digit()) => rest = after,
            _ => break,
        }
    }
    if numbers.is_empty() {
        return Err(invalid("no leading numeric component".to_string()));
    }
    numbers.resize(3, 0);
    let mut version = Version::new(numbers[0], numbers[1], numbers[2]);

    let (pre, build) = match rest.strip_prefix('.') {
        Some(extra) => ("", Some(extra)),
        None => {
            let rest = rest.strip_prefix('-').unwrap_or(rest);
            match rest.split_once('+') {
                Some((pre, build)) => (pre, Some(build)),
                None => (rest, None),
            }
        }
    };

    let pre = sanitize_identifiers(pre);
    if !pre.is_empty() {
        version.pre = Prerelease::new(&pre).map_err(|e| invalid(e.to_string()))?;
    }
    if let Some(build) = build.map(sanitize_identifiers).filter(|b| !b.is_empty()) {
        version.build = BuildMetadata::new(&build).map_err(|e| invalid(e.to_string()))?;
    }
    Ok(version)
}

fn sanitize_identifiers(raw: &str) -> String {
    raw.split('.')
        .map(|part| {
            part.chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
                .collect::<String>()
        })
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

/// Total order over versions: major, minor, patch, then a release sorts above
/// any of its prereleases.
pub fn compare(a: &Version, b: &Version) -> Ordering {
    a.cmp(b)
}

/// Atomic comparison operator of a [`VersionSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Op {
    /// Whether `candidate <op> target` holds, given `compare(candidate, target)`.
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            Op::Eq => ordering == Ordering::Equal,
            Op::Gt => ordering == Ordering::Greater,
            Op::Ge => ordering != Ordering::Less,
            Op::Lt => ordering == Ordering::Less,
            Op::Le => ordering != Ordering::Greater,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Op::Eq => "==",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Lt => "<",
            Op::Le => "<=",
        };
        f.write_str(symbol)
    }
}

/// Boolean expression tree over atomic version comparisons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSpec {
    /// Matches every version (`""` or `"*"`).
    Any,
    Cmp(Op, Version),
    And(Vec<VersionSpec>),
    Or(Vec<VersionSpec>),
    Not(Box<VersionSpec>),
}

impl VersionSpec {
    /// Parses a constraint string.
    pub fn parse(input: &str) -> Result<Self, PluginSystemError> {
        let spec = input.trim();
        if spec.is_empty() || spec == "*" {
            return Ok(VersionSpec::Any);
        }

        let mut branches = Vec::new();
        for branch in spec.split("||") {
            let branch = branch.trim();
            if branch.is_empty() {
                return Err(PluginSystemError::invalid_spec(input, "empty alternative around '||'"));
            }
            branches.push(parse_conjunction(input, branch)?);
        }
        Ok(collapse(branches, VersionSpec::Or))
    }

    /// Matches exactly `version`.
    pub fn exact(version: Version) -> Self {
        VersionSpec::Cmp(Op::Eq, version)
    }

    /// Evaluates the spec against a version.
    pub fn matches(&self, version: &Version) -> bool {
        evaluate(self, version)
    }

    /// Highest version among `versions` that satisfies the spec.
    pub fn select<'a, I>(&self, versions: I) -> Option<&'a Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        versions.into_iter().filter(|v| self.matches(v)).max()
    }

    pub fn is_any(&self) -> bool {
        matches!(self, VersionSpec::Any)
    }
}

/// Structural evaluation of `spec` against `version`.
pub fn evaluate(spec: &VersionSpec, version: &Version) -> bool {
    match spec {
        VersionSpec::Any => true,
        VersionSpec::Cmp(op, target) => op.holds(compare(version, target)),
        VersionSpec::And(children) => children.iter().all(|child| evaluate(child, version)),
        VersionSpec::Or(children) => children.iter().any(|child| evaluate(child, version)),
        VersionSpec::Not(inner) => !evaluate(inner, version),
    }
}

impl FromStr for VersionSpec {
    type Err = PluginSystemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VersionSpec::parse(s)
    }
}

impl Default for VersionSpec {
    fn default() -> Self {
        VersionSpec::Any
    }
}

impl fmt::Display for VersionSpec {
    /// Renders the spec in the syntax [`VersionSpec::parse`] accepts: an
    /// `||` of `&&`-joined comparisons, with negations pushed down to the
    /// comparisons they apply to.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, conjunction) in alternatives(self, false).iter().enumerate() {
            if i > 0 {
                f.write_str(" || ")?;
            }
            f.write_str(&conjunction.join(" && "))?;
        }
        Ok(())
    }
}

/// Disjunctive normal form of `spec` (or of its negation) as rendered atoms.
fn alternatives(spec: &VersionSpec, negated: bool) -> Vec<Vec<String>> {
    match (spec, negated) {
        (VersionSpec::Any, false) => vec![vec!["*".to_string()]],
        // 0.0.0-0 is the lowest version there is
        (VersionSpec::Any, true) => vec![vec!["<0.0.0-0".to_string()]],
        (VersionSpec::Cmp(op, version), false) => vec![vec![format!("{}{}", op, version)]],
        (VersionSpec::Cmp(op, version), true) => {
            let symbol = match op {
                Op::Eq => "!=",
                Op::Gt => "<=",
                Op::Ge => "<",
                Op::Lt => ">=",
                Op::Le => ">",
            };
            vec![vec![format!("{}{}", symbol, version)]]
        }
        (VersionSpec::Not(inner), false) => match wildcard_text(inner) {
            Some(wildcard) => vec![vec![format!("!={}", wildcard)]],
            None => alternatives(inner, true),
        },
        (VersionSpec::Not(inner), true) => alternatives(inner, false),
        (VersionSpec::And(children), false) | (VersionSpec::Or(children), true) => {
            children.iter().fold(vec![Vec::new()], |acc, child| {
                let choices = alternatives(child, negated);
                acc.iter()
                    .flat_map(|prefix| {
                        choices.iter().map(move |choice| {
                            let mut combined = prefix.clone();
                            combined.extend(choice.iter().cloned());
                            combined
                        })
                    })
                    .collect()
            })
        }
        (VersionSpec::Or(children), false) | (VersionSpec::And(children), true) => children
            .iter()
            .flat_map(|child| alternatives(child, negated))
            .collect(),
    }
}

/// `"1.x"`, `"1.2.x"` or `"1.2.3.x"` when `spec` is exactly the interval such
/// a wildcard expands to.
fn wildcard_text(spec: &VersionSpec) -> Option<String> {
    let VersionSpec::And(bounds) = spec else {
        return None;
    };
    let [VersionSpec::Cmp(Op::Ge, lower), VersionSpec::Cmp(Op::Lt, upper)] = bounds.as_slice() else {
        return None;
    };
    if !lower.pre.is_empty() || !upper.pre.is_empty() || !lower.build.is_empty() || !upper.build.is_empty() {
        return None;
    }
    let (major, minor, patch) = (lower.major, lower.minor, lower.patch);
    let upper = (upper.major, upper.minor, upper.patch);
    if minor == 0 && patch == 0 && major.checked_add(1).map(|next| (next, 0, 0)) == Some(upper) {
        Some(format!("{}.x", major))
    } else if patch == 0 && minor.checked_add(1).map(|next| (major, next, 0)) == Some(upper) {
        Some(format!("{}.{}.x", major, minor))
    } else if patch.checked_add(1).map(|next| (major, minor, next)) == Some(upper) {
        Some(format!("{}.{}.{}.x", major, minor, patch))
    } else {
        None
    }
}

fn collapse(mut items: Vec<VersionSpec>, wrap: fn(Vec<VersionSpec>) -> VersionSpec) -> VersionSpec {
    if items.len() == 1 {
        items.remove(0)
    } else {
        wrap(items)
    }
}

fn parse_conjunction(input: &str, branch: &str) -> Result<VersionSpec, PluginSystemError> {
    if branch.contains(" - ") {
        return parse_range(input, branch);
    }

    let mut parts = Vec::new();
    for group in branch.split("&&") {
        let group = group.trim();
        if group.is_empty() {
            return Err(PluginSystemError::invalid_spec(input, "empty operand around '&&'"));
        }
        parts.push(parse_group(input, group)?);
    }
    Ok(collapse(parts, VersionSpec::And))
}

fn parse_range(input: &str, branch: &str) -> Result<VersionSpec, PluginSystemError> {
    if branch.contains(['<', '>', '=', '!', '&']) {
        return Err(PluginSystemError::invalid_spec(
            input,
            "range syntax 'a - b' cannot be mixed with comparison operators",
        ));
    }
    let bounds: Vec<&str> = branch.split(" - ").map(str::trim).collect();
    let [low, high] = bounds.as_slice() else {
        return Err(PluginSystemError::invalid_spec(input, "a range needs exactly one ' - ' separator"));
    };
    let low = range_bound(input, low)?;
    let high = range_bound(input, high)?;
    Ok(VersionSpec::And(vec![
        VersionSpec::Cmp(Op::Ge, low),
        VersionSpec::Cmp(Op::Le, high),
    ]))
}

fn range_bound(input: &str, bound: &str) -> Result<Version, PluginSystemError> {
    if bound.is_empty() || bound.contains(char::is_whitespace) || wildcard_stem(bound).is_some() {
        return Err(PluginSystemError::invalid_spec(
            input,
            format!("'{}' is not a plain version range bound", bound),
        ));
    }
    parse_version(bound).map_err(|e| PluginSystemError::invalid_spec(input, e.to_string()))
}

/// A whitespace-separated group: one atom, or a lower/upper bound pair.
fn parse_group(input: &str, group: &str) -> Result<VersionSpec, PluginSystemError> {
    let mut atoms: Vec<String> = Vec::new();
    let mut pending: Option<&str> = None;
    for token in group.split_whitespace() {
        match pending.take() {
            Some(op) => atoms.push(format!("{}{}", op, token)),
            None if is_bare_operator(token) => pending = Some(token),
            None => atoms.push(token.to_string()),
        }
    }
    if let Some(op) = pending {
        return Err(PluginSystemError::invalid_spec(
            input,
            format!("operator '{}' is missing a version", op),
        ));
    }

    match atoms.as_slice() {
        [single] => parse_atom(input, single),
        [first, second] => {
            let first_kind = split_operator(first).0;
            let second_kind = split_operator(second).0;
            let bounded = (first_kind.is_lower_bound() && second_kind.is_upper_bound())
                || (first_kind.is_upper_bound() && second_kind.is_lower_bound());
            if !bounded {
                return Err(PluginSystemError::invalid_spec(
                    input,
                    "a space-joined pair needs one lower bound (> or >=) and one upper bound (< or <=)",
                ));
            }
            Ok(VersionSpec::And(vec![
                parse_atom(input, first)?,
                parse_atom(input, second)?,
            ]))
        }
        _ => Err(PluginSystemError::invalid_spec(
            input,
            "at most two space-separated comparisons may be joined, use '&&' for more",
        )),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prefix {
    Exact,
    NotEqual,
    Greater,
    GreaterEq,
    Less,
    LessEq,
}

impl Prefix {
    fn is_lower_bound(self) -> bool {
        matches!(self, Prefix::Greater | Prefix::GreaterEq)
    }

    fn is_upper_bound(self) -> bool {
        matches!(self, Prefix::Less | Prefix::LessEq)
    }

    fn apply(self, version: Version) -> VersionSpec {
        match self {
            Prefix::Exact => VersionSpec::Cmp(Op::Eq, version),
            Prefix::NotEqual => VersionSpec::Not(Box::new(VersionSpec::Cmp(Op::Eq, version))),
            Prefix::Greater => VersionSpec::Cmp(Op::Gt, version),
            Prefix::GreaterEq => VersionSpec::Cmp(Op::Ge, version),
            Prefix::Less => VersionSpec::Cmp(Op::Lt, version),
            Prefix::LessEq => VersionSpec::Cmp(Op::Le, version),
        }
    }

    /// Applies the operator to the half-open interval `[lower, upper)` a
    /// wildcard stands for.
    fn apply_to_range(self, lower: Version, upper: Version) -> VersionSpec {
        let within = || {
            VersionSpec::And(vec![
                VersionSpec::Cmp(Op::Ge, lower.clone()),
                VersionSpec::Cmp(Op::Lt, upper.clone()),
            ])
        };
        match self {
            Prefix::Exact => within(),
            Prefix::NotEqual => VersionSpec::Not(Box::new(within())),
            Prefix::Greater => VersionSpec::Cmp(Op::Ge, upper),
            Prefix::GreaterEq => VersionSpec::Cmp(Op::Ge, lower),
            Prefix::Less => VersionSpec::Cmp(Op::Lt, lower),
            Prefix::LessEq => VersionSpec::Cmp(Op::Lt, upper),
        }
    }
}

const OPERATORS: [(&str, Prefix); 7] = [
    ("==", Prefix::Exact),
    (">=", Prefix::GreaterEq),
    ("<=", Prefix::LessEq),
    ("!=", Prefix::NotEqual),
    (">", Prefix::Greater),
    ("<", Prefix::Less),
    ("=", Prefix::Exact),
];

fn is_bare_operator(token: &str) -> bool {
    OPERATORS.iter().any(|(symbol, _)| *symbol == token)
}

fn split_operator(atom: &str) -> (Prefix, &str) {
    for (symbol, prefix) in OPERATORS {
        if let Some(rest) = atom.strip_prefix(symbol) {
            return (prefix, rest);
        }
    }
    (Prefix::Exact, atom)
}

fn wildcard_stem(text: &str) -> Option<&str> {
    [".x", ".X", ".*"]
        .iter()
        .find_map(|suffix| text.strip_suffix(suffix))
}

/// `[lower, upper)` for a wildcard stem such as `"1.2"` (from `"1.2.x"`).
///
/// `Ok(None)` when the stem is not purely numeric. A stem whose last part is
/// `u64::MAX` has no upper bound and is rejected.
fn wildcard_bounds(input: &str, stem: &str) -> Result<Option<(Version, Version)>, PluginSystemError> {
    let Some(parts) = stem
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect::<Option<Vec<u64>>>()
    else {
        return Ok(None);
    };
    let next = |part: u64| {
        part.checked_add(1).ok_or_else(|| {
            PluginSystemError::invalid_spec(input, format!("wildcard '{}.x' has no upper bound", stem))
        })
    };
    let bounds = match parts.as_slice() {
        [major] => Some((Version::new(*major, 0, 0), Version::new(next(*major)?, 0, 0))),
        [major, minor] => Some((
            Version::new(*major, *minor, 0),
            Version::new(*major, next(*minor)?, 0),
        )),
        [major, minor, patch] => Some((
            Version::new(*major, *minor, *patch),
            Version::new(*major, *minor, next(*patch)?),
        )),
        _ => None,
    };
    Ok(bounds)
}

fn parse_atom(input: &str, atom: &str) -> Result<VersionSpec, PluginSystemError> {
    if matches!(atom, "*" | "x" | "X") {
        return Ok(VersionSpec::Any);
    }
    let (prefix, text) = split_operator(atom);
    if text.is_empty() {
        return Err(PluginSystemError::invalid_spec(
            input,
            format!("comparison '{}' has no version", atom),
        ));
    }

    if let Some(stem) = wildcard_stem(text) {
        if let Some((lower, upper)) = wildcard_bounds(input, stem)? {
            return Ok(prefix.apply_to_range(lower, upper));
        }
        log::warn!(
            "Version spec '{}' has a non-numeric component before the wildcard in '{}', matching it exactly",
            input,
            text
        );
    }

    let version = parse_version(text).map_err(|e| PluginSystemError::invalid_spec(input, e.to_string()))?;
    Ok(prefix.apply(version))
}
