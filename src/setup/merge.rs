use serde_yaml::{Mapping, Value};

/// Merge configuration layers from left to right into a fresh value
///
/// Mappings are merged key by key, recursively. Any other value in a later
/// layer replaces the earlier one, so sequences are replaced rather than
/// concatenated. A null never replaces anything, neither as a whole layer nor
/// as a value at any depth. None of the layers is modified.
pub fn deep_merge<'a, I>(layers: I) -> Value
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut merged = Value::Null;
    for layer in layers {
        merge_into(&mut merged, layer);
    }
    merged
}

fn merge_into(target: &mut Value, layer: &Value) {
    match (target, layer) {
        (_, Value::Null) => {}
        (Value::Mapping(target_map), Value::Mapping(layer_map)) => {
            for (key, value) in layer_map {
                if value.is_null() {
                    continue;
                }
                if !target_map.contains_key(key) {
                    target_map.insert(key.clone(), Value::Null);
                }
                if let Some(slot) = target_map.get_mut(key) {
                    merge_into(slot, value);
                }
            }
        }
        (target, Value::Mapping(_)) => {
            // Rebuild instead of cloning so nested nulls are dropped as well
            *target = Value::Mapping(Mapping::new());
            merge_into(target, layer);
        }
        (target, layer) => *target = layer.clone(),
    }
}
