//! Command declaration syntax.
//!
//! A declaration such as `alpha beta <name> [extra...] -f, --force` is a path
//! of bare words followed by a fragment of arguments and options.

use super::CommandTreeError;
use super::tree::{ArgSpec, OptionSpec, OptionValue};

/// Split a declaration into its path segments and the trailing fragment.
///
/// The fragment starts at the first token beginning with `<`, `[` or `-`
/// and is returned re-joined with single spaces.
#[must_use]
pub fn split_declaration(decl: &str) -> (Vec<&str>, Option<String>) {
    let tokens: Vec<&str> = decl.split_whitespace().collect();
    let split = tokens
        .iter()
        .position(|t| t.starts_with(['<', '[', '-']))
        .unwrap_or(tokens.len());
    let (path, rest) = tokens.split_at(split);
    let fragment = (!rest.is_empty()).then(|| rest.join(" "));
    (path.to_vec(), fragment)
}

/// Arguments and options parsed from a declaration fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    /// Positional arguments.
    pub args: Vec<ArgSpec>,
    /// Options.
    pub options: Vec<OptionSpec>,
}

/// Parse a fragment.
///
/// A bracketed token right after an option flag is that option's value;
/// any other bracketed token is a positional argument.
///
/// # Errors
///
/// [`CommandTreeError::Syntax`] on unbalanced brackets, a stray bare word,
/// positionals out of order (see [`check_args`]), or two options sharing a
/// flag.
pub fn parse_fragment(fragment: &str) -> Result<Fragment, CommandTreeError> {
    let mut out = Fragment::default();
    let mut tokens = fragment.split_whitespace().peekable();

    while let Some(token) = tokens.next() {
        if token.starts_with('-') {
            let mut flags = vec![token];
            while token_ends_with_comma(flags.last().copied())
                && let Some(next) = tokens.next_if(|t| t.starts_with('-'))
            {
                flags.push(next);
            }
            let mut spec = parse_flags(&flags.join(" "))?;
            if let Some(value) = tokens.next_if(|t| t.starts_with(['<', '['])) {
                spec.value = Some(parse_value(value)?);
            }
            if out.options.iter().any(|o| o.shares_flag(&spec)) {
                return Err(syntax(fragment, "option declared twice"));
            }
            out.options.push(spec);
            continue;
        }

        out.args.push(parse_arg(token).map_err(|m| syntax(fragment, m))?);
    }
    check_args(&out.args).map_err(|m| syntax(fragment, m))?;
    Ok(out)
}

/// Check a positional list: names are unique and not `help`, required
/// arguments never follow optional ones, and only the last may be variadic.
///
/// # Errors
///
/// A short description of the first violation.
pub fn check_args(args: &[ArgSpec]) -> Result<(), &'static str> {
    let mut seen_optional = false;
    for (i, arg) in args.iter().enumerate() {
        if arg.name == "help" {
            return Err("argument name help is reserved");
        }
        if args[..i].iter().any(|a| a.name == arg.name) {
            return Err("argument declared twice");
        }
        if arg.required && seen_optional {
            return Err("a required argument cannot follow an optional one");
        }
        if arg.variadic && i.saturating_add(1) != args.len() {
            return Err("a variadic argument must be last");
        }
        seen_optional |= !arg.required;
    }
    Ok(())
}

fn token_ends_with_comma(token: Option<&str>) -> bool {
    token.is_some_and(|t| t.ends_with(','))
}

/// Parse an option flag string such as `-s, --long <value>` or `--dry-run`.
///
/// # Errors
///
/// [`CommandTreeError::Syntax`] when neither a short nor a long flag is
/// present or a flag is malformed.
pub fn parse_option_flags(flags: &str) -> Result<OptionSpec, CommandTreeError> {
    let fragment = parse_fragment(flags)?;
    match (fragment.options.as_slice(), fragment.args.is_empty()) {
        ([single], true) => Ok(single.clone()),
        _ => Err(syntax(flags, "expected a single option")),
    }
}

fn parse_flags(flags: &str) -> Result<OptionSpec, CommandTreeError> {
    let mut spec = OptionSpec::default();
    for raw in flags.split([',', ' ']).filter(|s| !s.is_empty()) {
        if let Some(long) = raw.strip_prefix("--") {
            if long.is_empty() || long.starts_with('-') || spec.long.is_some() {
                return Err(syntax(flags, "bad long flag"));
            }
            spec.long = Some(long.to_owned());
        } else if let Some(short) = raw.strip_prefix('-') {
            let mut chars = short.chars();
            match (chars.next(), chars.next(), spec.short) {
                (Some(c), None, None) if c != '-' => spec.short = Some(c),
                _ => return Err(syntax(flags, "bad short flag")),
            }
        } else {
            return Err(syntax(flags, "unexpected token"));
        }
    }
    if spec.short.is_none() && spec.long.is_none() {
        return Err(syntax(flags, "missing flag"));
    }
    Ok(spec)
}

fn bracketed(token: &str) -> Option<(&str, bool)> {
    if let Some(inner) = token.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
        return Some((inner, true));
    }
    token
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .map(|inner| (inner, false))
}

fn parse_arg(token: &str) -> Result<ArgSpec, &'static str> {
    let (inner, required) = bracketed(token).ok_or("expected <arg> or [arg]")?;
    let (name, variadic) = match inner.strip_suffix("...") {
        Some(name) => (name, true),
        None => (inner, false),
    };
    if name.is_empty() {
        return Err("empty argument name");
    }
    Ok(ArgSpec {
        name: name.to_owned(),
        required,
        variadic,
    })
}

fn parse_value(token: &str) -> Result<OptionValue, CommandTreeError> {
    let (inner, required) = bracketed(token).ok_or_else(|| syntax(token, "bad option value"))?;
    Ok(OptionValue {
        name: inner.to_owned(),
        required,
    })
}

fn syntax(input: &str, message: &str) -> CommandTreeError {
    CommandTreeError::Syntax {
        input: input.to_owned(),
        message: message.to_owned(),
    }
}
