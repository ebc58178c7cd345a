//! Option maps and the layered resolution rules applied to them.
//!
//! Options are loosely-shaped JSON objects declared per task. Three helpers
//! cover everything the resolver, sequence builder, and adaptors need:
//! deep merging with later-wins precedence, key-path lookups (`a.b.c`), and
//! flattening into environment variables for subprocess leaves.

use serde_json::{Map, Value};

/// A loosely-typed options object. Key order follows declaration order.
pub type Options = Map<String, Value>;

/// Deep-merge `src` into `dst`. Later (src) values win; nested objects are
/// merged key-by-key, everything else is replaced wholesale.
pub fn merge_into(dst: &mut Options, src: &Options) {
    for (key, incoming) in src {
        match (dst.get_mut(key), incoming) {
            (Some(Value::Object(existing)), Value::Object(next)) => {
                merge_into(existing, next);
            }
            _ => {
                dst.insert(key.clone(), incoming.clone());
            }
        }
    }
}

/// Merge an ordered list of layers into one object, first to last.
pub fn merge_layers(layers: &[&Options]) -> Options {
    let mut out = Options::new();
    for layer in layers {
        merge_into(&mut out, layer);
    }
    out
}

/// Look up a dotted key path inside an options object.
///
/// `lookup_path(opts, "site.dev")` descends through nested objects and
/// returns `None` if any segment is missing or a non-object is hit before
/// the final segment.
pub fn lookup_path<'a>(options: &'a Options, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = options.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Resolve a key path to a child options object. Missing paths and scalar
/// hits both yield an empty object so merging stays total.
pub fn child_object(options: &Options, path: &str) -> Options {
    match lookup_path(options, path) {
        Some(Value::Object(map)) => map.clone(),
        _ => Options::new(),
    }
}

/// Flatten an options object into `PREFIX_OPTIONS_<PATH>` environment
/// pairs, one per scalar leaf. Nested object keys join with `_`, key text
/// is upper-cased with `-` normalized to `_`.
pub fn flatten_env(prefix: &str, options: &Options) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let root = format!("{}_OPTIONS", prefix.to_uppercase());
    collect_env(&root, options, &mut pairs);
    pairs
}

fn collect_env(path: &str, options: &Options, pairs: &mut Vec<(String, String)>) {
    for (key, value) in options {
        let segment = key.to_uppercase().replace('-', "_");
        let var = format!("{}_{}", path, segment);
        match value {
            Value::Object(nested) => collect_env(&var, nested, pairs),
            Value::String(s) => pairs.push((var, s.clone())),
            Value::Null => {}
            other => pairs.push((var, other.to_string())),
        }
    }
}
