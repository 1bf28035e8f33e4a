/// Line magics: shell aliases and registered functions
use std::fmt;
use std::process::Command;
use std::sync::Arc;

use tracing::debug;

use crate::dispatch::DispatchError;

pub type MagicFn = Arc<dyn Fn(&str) -> anyhow::Result<Option<String>> + Send + Sync>;

/// What `%name` resolves to in the debugger's magic registry
#[derive(Clone)]
pub enum Magic {
    Alias(Alias),
    /// Called with the argument text; `Some` result is printed
    Function(MagicFn),
}

impl Magic {
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&str) -> anyhow::Result<Option<String>> + Send + Sync + 'static,
    {
        Magic::Function(Arc::new(f))
    }
}

impl fmt::Debug for Magic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Magic::Alias(alias) => f.debug_tuple("Alias").field(alias).finish(),
            Magic::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// A shell command template.
///
/// `%s` takes positional arguments, `%l` the whole argument line and `%%s`
/// is a literal `%s`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    pub name: String,
    pub cmd: String,
    pub nargs: usize,
}

/// Captured output of an alias run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasOutput {
    pub stdout: String,
    pub stderr: String,
}

impl Alias {
    pub fn new(name: impl Into<String>, cmd: impl Into<String>) -> Self {
        let cmd = cmd.into();
        let nargs = cmd.matches("%s").count().saturating_sub(cmd.matches("%%s").count());
        Self {
            name: name.into(),
            cmd,
            nargs,
        }
    }

    /// The shell command line for `rest`
    pub fn expand(&self, rest: &str) -> Result<String, DispatchError> {
        let mut cmd = self.cmd.clone();
        let mut rest = rest.to_string();
        if cmd.contains("%l") {
            cmd = cmd.replace("%l", &rest);
            rest.clear();
        }

        if self.nargs == 0 {
            if cmd.find("%%s").is_some_and(|i| i >= 1) {
                cmd = cmd.replace("%%s", "%s");
            }
            return Ok(format!("{cmd} {rest}"));
        }

        let args = split_args(&rest, self.nargs);
        if args.len() < self.nargs {
            return Err(DispatchError::AliasArguments {
                name: self.name.clone(),
                required: self.nargs,
                given: args.len(),
            });
        }
        let formatted = format_positional(&cmd, &args[..self.nargs])?;
        Ok(format!("{} {}", formatted, args[self.nargs..].join(" ")))
    }

    /// Expand and run through `sh -c`, capturing both streams
    pub fn run(&self, rest: &str) -> Result<AliasOutput, DispatchError> {
        let cmd = self.expand(rest)?;
        debug!("Running alias {}: {}", self.name, cmd);
        let output = Command::new("sh").arg("-c").arg(&cmd).output()?;
        Ok(AliasOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Whitespace split into at most `max_split + 1` parts; the last keeps its inner spacing
fn split_args(text: &str, max_split: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut remaining = text.trim_start();
    while !remaining.is_empty() {
        if parts.len() == max_split {
            parts.push(remaining.to_string());
            break;
        }
        match remaining.find(char::is_whitespace) {
            Some(end) => {
                parts.push(remaining[..end].to_string());
                remaining = remaining[end..].trim_start();
            }
            None => {
                parts.push(remaining.to_string());
                break;
            }
        }
    }
    parts
}

/// printf-style substitution supporting only `%s` and `%%`
fn format_positional(template: &str, args: &[String]) -> Result<String, DispatchError> {
    let mut out = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => match args.next() {
                Some(arg) => out.push_str(arg),
                None => {
                    return Err(DispatchError::AliasFormat(
                        "not enough arguments for format string".to_string(),
                    ));
                }
            },
            Some('%') => out.push('%'),
            Some(other) => {
                return Err(DispatchError::AliasFormat(format!(
                    "unsupported format character '{other}'"
                )));
            }
            None => return Err(DispatchError::AliasFormat("incomplete format".to_string())),
        }
    }
    if args.next().is_some() {
        return Err(DispatchError::AliasFormat(
            "not all arguments converted during string formatting".to_string(),
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argumentless_alias_appends_rest() {
        let alias = Alias::new("ll", "ls -l");
        assert_eq!(alias.nargs, 0);
        assert_eq!(alias.expand("/tmp").unwrap(), "ls -l /tmp");
    }

    #[test]
    fn test_positional_arguments() {
        let alias = Alias::new("show", "echo %s and %s");
        assert_eq!(alias.nargs, 2);
        assert_eq!(alias.expand("a b  c d").unwrap(), "echo a and b c d");
    }

    #[test]
    fn test_missing_arguments_are_reported() {
        let alias = Alias::new("show", "echo %s and %s");
        let err = alias.expand("a").unwrap_err();
        assert_eq!(err.to_string(), "Alias <show> requires 2 arguments, 1 given.");
    }

    #[test]
    fn test_whole_line_substitution() {
        let alias = Alias::new("find_in", "grep %l setup.cfg");
        assert_eq!(alias.nargs, 0);
        assert_eq!(alias.expand("-n name").unwrap(), "grep -n name setup.cfg ");
    }

    #[test]
    fn test_escaped_placeholder_is_literal() {
        let alias = Alias::new("fmt", "printf '%%s|'");
        assert_eq!(alias.nargs, 0);
        assert_eq!(alias.expand("x y").unwrap(), "printf '%s|' x y");
    }

    #[test]
    fn test_run_captures_both_streams() {
        let alias = Alias::new("greet", "echo hello %s; echo oops >&2");
        let output = alias.run("world").unwrap();
        assert_eq!(output.stdout, "hello world\n");
        assert_eq!(output.stderr, "oops\n");
    }

    #[test]
    fn test_split_args_keeps_remainder() {
        assert_eq!(split_args("  a  b c  ", 1), vec!["a", "b c  "]);
        assert_eq!(split_args("", 2), Vec::<String>::new());
    }
}
