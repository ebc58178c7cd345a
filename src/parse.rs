//! Task name grammar.
//!
//! A reference like `sass:site:dev?theme=dark@p --production` carries a base
//! name, sub-task segments, an inline query, a run mode marker, and command
//! line style flags. Adaptor references (`@sh rm -rf dist`) are opaque: the
//! text after the adaptor name is the command, with no further extraction.

use serde_json::Value;

use crate::options::Options;
use crate::task::RunMode;

/// A decomposed task reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedName {
    /// The reference exactly as written.
    pub raw: String,
    /// Name with sub-tasks, query, run mode, and flags stripped.
    pub base: String,
    /// Colon-separated segments after the base. `*` selects every key of
    /// the matching options object.
    pub sub_tasks: Vec<String>,
    /// `Some(Parallel)` when the reference ends in `@p`.
    pub run_mode: Option<RunMode>,
    /// Inline `?key=value&...` pairs, scalars coerced.
    pub query: Options,
    /// `--flag` / `--flag=value` pairs, scalars coerced.
    pub flags: Options,
    /// Adaptor name and command for `@name command` references.
    pub adaptor: Option<AdaptorInput>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdaptorInput {
    pub name: String,
    pub command: String,
}

impl ParsedName {
    pub fn is_adaptor(&self) -> bool {
        self.adaptor.is_some()
    }
}

/// Parse one task reference. The error string is the reason the reference
/// is malformed; callers keep it on an invalid task node instead of
/// aborting the resolve.
pub fn parse(raw: &str) -> std::result::Result<ParsedName, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("empty task reference".to_string());
    }

    let mut parsed = ParsedName {
        raw: raw.to_string(),
        base: String::new(),
        sub_tasks: Vec::new(),
        run_mode: None,
        query: Options::new(),
        flags: Options::new(),
        adaptor: None,
    };

    // Adaptor references keep their command verbatim. `@sh echo --done`
    // must not lose `--done` to flag extraction.
    if let Some(rest) = trimmed.strip_prefix('@') {
        let (name, command) = match rest.split_once(char::is_whitespace) {
            Some((name, command)) => (name, command.trim()),
            None => (rest, ""),
        };
        if name.is_empty() {
            return Err("adaptor reference needs a name after '@'".to_string());
        }
        if command.is_empty() {
            return Err(format!("adaptor '@{}' needs a command", name));
        }
        parsed.base = trimmed.to_string();
        parsed.adaptor = Some(AdaptorInput {
            name: name.to_string(),
            command: command.to_string(),
        });
        return Ok(parsed);
    }

    let mut tokens = trimmed.split_whitespace();
    let name_token = match tokens.next() {
        Some(token) if !token.starts_with("--") => token,
        _ => return Err("task reference must start with a name".to_string()),
    };
    for token in tokens {
        let Some(flag) = token.strip_prefix("--") else {
            return Err(format!("unexpected token '{}'", token));
        };
        match flag.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                parsed.flags.insert(key.to_string(), coerce_scalar(value));
            }
            None if !flag.is_empty() => {
                parsed.flags.insert(flag.to_string(), Value::Bool(true));
            }
            _ => return Err(format!("malformed flag '{}'", token)),
        }
    }

    let (mut name_part, query_part) = match name_token.split_once('?') {
        Some((name, query)) => (name, Some(query)),
        None => (name_token, None),
    };

    if let Some(query) = query_part {
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            match pair.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    parsed.query.insert(key.to_string(), coerce_scalar(value));
                }
                None => {
                    parsed.query.insert(pair.to_string(), Value::Bool(true));
                }
                Some(_) => return Err(format!("malformed query pair '{}'", pair)),
            }
        }
    }

    if let Some(stripped) = name_part.strip_suffix("@p") {
        parsed.run_mode = Some(RunMode::Parallel);
        name_part = stripped;
    }

    let mut segments = name_part.split(':');
    match segments.next() {
        Some(base) if !base.is_empty() => parsed.base = base.to_string(),
        _ => return Err("task reference must start with a name".to_string()),
    }
    for segment in segments {
        if segment.is_empty() {
            return Err(format!("empty sub-task segment in '{}'", name_token));
        }
        parsed.sub_tasks.push(segment.to_string());
    }

    Ok(parsed)
}

/// `true`/`false` become booleans, integers become numbers, everything
/// else stays a string.
pub fn coerce_scalar(text: &str) -> Value {
    match text {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => match text.parse::<i64>() {
            Ok(n) => Value::Number(n.into()),
            Err(_) => Value::String(text.to_string()),
        },
    }
}
