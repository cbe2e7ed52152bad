//! Matching of command-line patterns against the script table.
//!
//! Task names are colon-separated paths (`build:js:watch`). A pattern is
//! matched segment by segment:
//!
//! - a literal segment matches itself; inside a segment `*` matches any run
//!   of characters and `?` a single character,
//! - `*` alone matches exactly one segment,
//! - `**` matches any number of segments; in trailing position it needs at
//!   least one, so `a:**` and `a:**:*` select the same names,
//! - a pattern starting with `!` or `?` is compared verbatim.

use std::collections::HashSet;

use crate::error::Error;
use crate::tasks::TaskSpec;


/// Package-manager commands that can be run without a script entry.
pub const BUILTIN_TASKS: &[&str] = &["restart", "env"];


/// Splits pattern text into its glob and the argument text after it.
pub fn split_pattern(text: &str) -> (&str, &str) {
    let text = text.trim();
    match text.find(char::is_whitespace) {
        Some(index) => (&text[..index], text[index..].trim_start()),
        None => (text, ""),
    }
}


pub fn matches(glob: &str, name: &str) -> bool {
    if glob == name {
        return true;
    }
    if glob.starts_with('!') || glob.starts_with('?') {
        return false;
    }

    let pattern: Vec<&str> = glob.split(':').collect();
    let segments: Vec<&str> = name.split(':').collect();
    match_segments(&pattern, &segments)
}


fn match_segments(pattern: &[&str], name: &[&str]) -> bool {
    match pattern.split_first() {
        None => name.is_empty(),
        Some((&"**", rest)) => {
            if rest.is_empty() {
                return !name.is_empty();
            }
            (0..=name.len()).any(|skip| match_segments(rest, &name[skip..]))
        }
        Some((segment, rest)) => match name.split_first() {
            Some((head, tail)) => {
                match_segment(segment, head) && match_segments(rest, tail)
            }
            None => false,
        },
    }
}


fn match_segment(pattern: &str, segment: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = segment.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, consumed)) = backtrack {
            p = star + 1;
            t = consumed + 1;
            backtrack = Some((star, consumed + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}


/// Known names matched by `glob`, in script-table order.
pub fn resolve<'a>(glob: &str, known: &'a [String]) -> Vec<&'a str> {
    known
        .iter()
        .filter(|name| matches(glob, name))
        .map(String::as_str)
        .collect()
}


/// Tasks selected so far in one group.
///
/// Each call to [`Selection::select`] consumes the selection and returns the
/// next one. A pattern string seen for the first time only adds commands not
/// selected yet, and fails if every match was already selected. A pattern
/// string repeated verbatim selects its matches again.
#[derive(Clone, Debug, Default)]
pub struct Selection {
    emitted: HashSet<String>,
    seen_patterns: HashSet<String>,
    specs: Vec<TaskSpec>,
}

impl Selection {
    pub fn select(mut self, pattern: &str, known: &[String]) -> Result<Self, Error> {
        let (glob, raw_args) = split_pattern(pattern);
        let mut names = resolve(glob, known);
        if names.is_empty() && BUILTIN_TASKS.contains(&glob) {
            names.push(glob);
        }
        if names.is_empty() {
            return Err(Error::TaskNotFound(pattern.trim().to_string()));
        }

        let repeated = !self.seen_patterns.insert(pattern.to_string());
        let before = self.specs.len();
        for name in names {
            let spec = TaskSpec::new(name, raw_args);
            let fresh = self.emitted.insert(spec.command());
            if fresh || repeated {
                self.specs.push(spec);
            }
        }
        if self.specs.len() == before {
            return Err(Error::TaskNotFound(pattern.trim().to_string()));
        }
        Ok(self)
    }

    pub fn into_specs(self) -> Vec<TaskSpec> {
        self.specs
    }
}


/// Resolves every pattern of one group, failing on the first unmatched one.
pub fn resolve_patterns<S: AsRef<str>>(
    patterns: &[S],
    known: &[String],
) -> Result<Vec<TaskSpec>, Error> {
    patterns
        .iter()
        .try_fold(Selection::default(), |selection, pattern| {
            selection.select(pattern.as_ref(), known)
        })
        .map(Selection::into_specs)
}
