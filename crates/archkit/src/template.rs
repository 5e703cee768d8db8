//! `%(key)s` templates and shell quoting
//!
//! Command and rename templates use named placeholders of the form
//! `%(key)s`; `%%` is a literal percent sign. Values substituted into a
//! command line go through [`shell_quote`] first.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::Path;

/// Values available to a template
pub type Vars = BTreeMap<String, String>;

/// Substitute `%(key)s` placeholders
///
/// Returns a message describing the problem if the template references
/// an unknown key or is malformed.
pub fn render(template: &str, vars: &Vars) -> Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(tail) = after.strip_prefix('%') {
            out.push('%');
            rest = tail;
            continue;
        }

        let Some(inner) = after.strip_prefix('(') else {
            return Err(format!("unsupported format at offset {pos}: {template}"));
        };
        let Some(close) = inner.find(')') else {
            return Err(format!("unterminated placeholder: {template}"));
        };
        let key = &inner[..close];
        let Some(tail) = inner[close + 1..].strip_prefix('s') else {
            return Err(format!("placeholder %({key}) must end with 's'"));
        };
        let value = vars
            .get(key)
            .ok_or_else(|| format!("unknown placeholder: {key}"))?;
        out.push_str(value);
        rest = tail;
    }

    out.push_str(rest);
    Ok(out)
}

/// Quote a value so a POSIX shell reads it back as a single word
///
/// Fails only for values containing a nul byte.
pub fn shell_quote(value: &str) -> Result<String, String> {
    shlex::try_quote(value)
        .map(Cow::into_owned)
        .map_err(|e| e.to_string())
}

/// Quote each path and join them with spaces
pub fn shell_join<P: AsRef<Path>>(paths: &[P]) -> Result<String, String> {
    let words = paths
        .iter()
        .map(|p| p.as_ref().to_string_lossy())
        .collect::<Vec<_>>();
    shlex::try_join(words.iter().map(|w| &**w)).map_err(|e| e.to_string())
}

/// Render an archive command line
pub fn render_command<P: AsRef<Path>>(
    command_format: &str,
    sources: &[P],
    target: &str,
) -> Result<String, String> {
    let mut vars = Vars::new();
    vars.insert("sources".to_string(), shell_join(sources)?);
    vars.insert("target".to_string(), shell_quote(target)?);
    render(command_format, &vars)
}
