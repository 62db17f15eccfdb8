// src/encode/template.rs

//! Command template expansion and tokenization.
//!
//! Placeholders are expanded against the worker's own environment, not the
//! job's resolved environment. Tokenization follows shell word-splitting
//! rules but never runs a shell.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::env::EnvSource;
use crate::errors::{DispatchError, Result};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$([A-Za-z0-9_]+|\{[^}]*\})").expect("placeholder regex is valid")
});

/// Replace `$NAME` and `${NAME}` with values from `env`.
///
/// Unknown names are left exactly as written.
pub fn expand_vars(template: &str, env: &dyn EnvSource) -> String {
    if !template.contains('$') {
        return template.to_string();
    }

    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            let whole = &caps[0];
            let raw = &caps[1];
            let name = raw
                .strip_prefix('{')
                .and_then(|s| s.strip_suffix('}'))
                .unwrap_or(raw);
            env.var(name).unwrap_or_else(|| whole.to_string())
        })
        .into_owned()
}

/// Split an expanded template into argv tokens.
pub fn tokenize(expanded: &str) -> Result<Vec<String>> {
    let tokens = shell_words::split(expanded).map_err(|e| {
        DispatchError::InvalidCommandTemplate(format!("{e} in {expanded:?}"))
    })?;

    if tokens.is_empty() {
        return Err(DispatchError::InvalidCommandTemplate(
            "command template is empty".to_string(),
        ));
    }

    Ok(tokens)
}
