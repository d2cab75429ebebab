use serde_json::{Map, Value};

pub const SEPARATOR: char = '_';

/// Collapses nested objects into a single level, joining key paths with `_`.
///
/// Anything that is not an object (arrays included) is kept as-is under its joined key. Empty
/// nested objects disappear. Output order follows the input's insertion order.
pub fn flatten(record: &Map<String, Value>) -> Map<String, Value> {
    let mut flat = Map::new();
    flatten_into(&mut flat, None, record);
    flat
}

fn flatten_into(flat: &mut Map<String, Value>, prefix: Option<&str>, record: &Map<String, Value>) {
    for (key, value) in record {
        let path = match prefix {
            Some(p) => format!("{p}{SEPARATOR}{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(nested) => flatten_into(flat, Some(path.as_str()), nested),
            scalar => {
                flat.insert(path, scalar.clone());
            }
        }
    }
}
