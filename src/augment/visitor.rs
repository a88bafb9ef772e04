use serde_json::{Map, Value};

/// Walks `node` depth-first in document order and calls `visit` on every
/// mapping accepted by `predicate`.
///
/// A visited mapping is still descended into afterwards, so nested matches
/// are found too. Sequences are walked element by element, scalars are left
/// alone.
pub fn visit_matching_mut<P, F>(node: &mut Value, predicate: &P, visit: &mut F)
where
    P: Fn(&Map<String, Value>) -> bool,
    F: FnMut(&mut Map<String, Value>),
{
    match node {
        Value::Object(map) => {
            if predicate(map) {
                visit(map);
            }
            for child in map.values_mut() {
                visit_matching_mut(child, predicate, visit);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                visit_matching_mut(item, predicate, visit);
            }
        }
        _ => {}
    }
}
