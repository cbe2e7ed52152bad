//! Expansion of argument placeholders in task argument text.
//!
//! | Placeholder    | Expands to                                            |
//! |----------------|-------------------------------------------------------|
//! | `{n}`          | the n-th trailing argument, or nothing                |
//! | `{n:-default}` | the n-th argument, else `default`                     |
//! | `{n:=default}` | the n-th argument, else `default`, remembered for `n` |
//! | `{@}`          | every argument as its own word                        |
//! | `{*}`          | every argument joined into one word                   |
//! | `{%}`          | one copy of the task per argument                     |

use std::collections::HashMap;


const EACH: &str = "{%}";


#[derive(Clone, Debug, Eq, PartialEq)]
enum Placeholder {
    Position { index: usize, default: Option<Fallback> },
    All,
    Joined,
    Each,
}


#[derive(Clone, Debug, Eq, PartialEq)]
enum Fallback {
    Once(String),
    Assign(String),
}


/// Expands placeholders against one trailing-argument list.
///
/// `{n:=default}` assignments persist for the lifetime of the value, so one
/// instance should be used per expansion pass over a group.
#[derive(Debug)]
pub struct Placeholders<'a> {
    args: &'a [String],
    assigned: HashMap<usize, String>,
}

impl<'a> Placeholders<'a> {
    pub fn new(args: &'a [String]) -> Self {
        Self {
            args,
            assigned: HashMap::new(),
        }
    }

    /// Splits `raw` into argv words with placeholders substituted.
    ///
    /// Returns one argv per replica: a single one, or one per trailing
    /// argument when `raw` contains `{%}`.
    pub fn expand(&mut self, raw: &str) -> Vec<Vec<String>> {
        if raw.contains(EACH) {
            let args = self.args;
            args.iter()
                .map(|arg| self.expand_once(raw, Some(arg)))
                .collect()
        } else {
            vec![self.expand_once(raw, None)]
        }
    }

    fn expand_once(&mut self, raw: &str, each: Option<&str>) -> Vec<String> {
        let chars: Vec<char> = raw.chars().collect();
        let mut words = Words::default();
        let mut quote: Option<char> = None;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];

            if c == '{' {
                if let Some((placeholder, len)) = parse(&chars[i..]) {
                    self.substitute(&placeholder, each, quote.is_some(), &mut words);
                    i += len;
                    continue;
                }
            }

            match (quote, c) {
                (None, c) if c.is_whitespace() => words.finish(),
                (None, '\'' | '"') => {
                    quote = Some(c);
                    words.mark();
                }
                (Some(open), c) if c == open => quote = None,
                (None, '\\') | (Some('"'), '\\') => {
                    match chars.get(i + 1) {
                        Some(&next) if quote.is_none() || next == '"' || next == '\\' => {
                            words.push(next);
                            i += 1;
                        }
                        _ => words.push(c),
                    }
                }
                (_, c) => words.push(c),
            }
            i += 1;
        }

        words.finish();
        words.done
    }

    fn substitute(
        &mut self,
        placeholder: &Placeholder,
        each: Option<&str>,
        quoted: bool,
        words: &mut Words,
    ) {
        match placeholder {
            Placeholder::Position { index, default } => {
                if let Some(value) = self.lookup(*index, default.as_ref()) {
                    words.push_value(&value);
                }
            }
            Placeholder::All if quoted => words.push_value(&self.args.join(" ")),
            Placeholder::All => {
                for (n, arg) in self.args.iter().enumerate() {
                    if n > 0 {
                        words.finish();
                    }
                    words.push_value(arg);
                }
            }
            Placeholder::Joined => words.push_value(&self.args.join(" ")),
            Placeholder::Each => {
                if let Some(value) = each {
                    words.push_value(value);
                }
            }
        }
    }

    fn lookup(&mut self, index: usize, default: Option<&Fallback>) -> Option<String> {
        if let Some(arg) = self.args.get(index - 1) {
            return Some(arg.clone());
        }
        match default {
            Some(Fallback::Once(value)) => Some(value.clone()),
            Some(Fallback::Assign(value)) => {
                self.assigned.insert(index, value.clone());
                Some(value.clone())
            }
            None => self.assigned.get(&index).cloned(),
        }
    }
}


/// Parses a placeholder at the start of `chars`, returning it with its length.
fn parse(chars: &[char]) -> Option<(Placeholder, usize)> {
    let end = chars.iter().position(|&c| c == '}')?;
    let inner: String = chars[1..end].iter().collect();

    let placeholder = match inner.as_str() {
        "@" => Placeholder::All,
        "*" => Placeholder::Joined,
        "%" => Placeholder::Each,
        _ => {
            let digits = inner.find(|c: char| !c.is_ascii_digit()).unwrap_or(inner.len());
            let index: usize = inner[..digits].parse::<usize>().ok().filter(|&n| n > 0)?;
            let rest = &inner[digits..];
            let default = if rest.is_empty() {
                None
            } else if let Some(value) = rest.strip_prefix(":-") {
                Some(Fallback::Once(value.to_string()))
            } else if let Some(value) = rest.strip_prefix(":=") {
                Some(Fallback::Assign(value.to_string()))
            } else {
                return None;
            };
            Placeholder::Position { index, default }
        }
    };
    Some((placeholder, end + 1))
}


/// Accumulates argv words; a word that received nothing is dropped.
#[derive(Debug, Default)]
struct Words {
    done: Vec<String>,
    current: String,
    started: bool,
}

impl Words {
    fn push(&mut self, c: char) {
        self.current.push(c);
        self.started = true;
    }

    fn push_value(&mut self, value: &str) {
        self.current.push_str(value);
        self.started = true;
    }

    fn mark(&mut self) {
        self.started = true;
    }

    fn finish(&mut self) {
        if self.started {
            self.done.push(std::mem::take(&mut self.current));
            self.started = false;
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn expand_one(raw: &str, trailing: &[&str]) -> Vec<String> {
        let trailing = args(trailing);
        let mut replicas = Placeholders::new(&trailing).expand(raw);
        assert_eq!(replicas.len(), 1);
        replicas.remove(0)
    }

    #[test]
    fn positional_placeholders() {
        assert_eq!(expand_one("{1}", &["1st", "2nd"]), args(&["1st"]));
        assert_eq!(expand_one("{2}", &["1st", "2nd"]), args(&["2nd"]));
    }

    #[test]
    fn all_and_joined_placeholders() {
        assert_eq!(expand_one("{@}", &["1st", "2nd"]), args(&["1st", "2nd"]));
        assert_eq!(expand_one("{*}", &["1st", "2nd"]), args(&["1st 2nd"]));
    }

    #[test]
    fn mixed_placeholders_resolve_in_one_pass() {
        assert_eq!(
            expand_one("{1} {2} {3} {@} {*}", &["1st", "2nd"]),
            args(&["1st", "2nd", "1st", "2nd", "1st 2nd"])
        );
    }

    #[test]
    fn missing_argument_drops_the_word() {
        assert!(expand_one("{1}", &[]).is_empty());
        assert!(expand_one("{@}", &[]).is_empty());
    }

    #[test]
    fn fallback_default_does_not_stick() {
        assert_eq!(expand_one("{1:-foo} {1}", &[]), args(&["foo"]));
    }

    #[test]
    fn assigned_default_sticks() {
        assert_eq!(expand_one("{1:=foo} {1}", &[]), args(&["foo", "foo"]));
    }

    #[test]
    fn assigned_default_carries_across_patterns() {
        let none = Vec::new();
        let mut placeholders = Placeholders::new(&none);
        assert_eq!(placeholders.expand("{1:=dev}"), vec![args(&["dev"])]);
        assert_eq!(placeholders.expand("--mode {1}"), vec![args(&["--mode", "dev"])]);
    }

    #[test]
    fn each_replicates_per_argument() {
        let trailing = args(&["1st", "2nd"]);
        let replicas = Placeholders::new(&trailing).expand("--file {%}");
        assert_eq!(
            replicas,
            vec![args(&["--file", "1st"]), args(&["--file", "2nd"])]
        );
    }

    #[test]
    fn each_without_arguments_yields_no_replica() {
        let none = Vec::new();
        assert!(Placeholders::new(&none).expand("{%}").is_empty());
    }

    #[test]
    fn unknown_braces_stay_literal() {
        assert_eq!(expand_one("{foo} {1:x} {0}", &["a"]), args(&["{foo}", "{1:x}", "{0}"]));
    }

    #[test]
    fn quotes_group_words() {
        assert_eq!(
            expand_one("'a b' \"c {1}\" d\\ e ''", &["x"]),
            args(&["a b", "c x", "d e", ""])
        );
    }

    #[test]
    fn embedded_all_splits_around_prefix() {
        assert_eq!(
            expand_one("--x={@}", &["1", "2"]),
            args(&["--x=1", "2"])
        );
    }
}
