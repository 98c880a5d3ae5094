use crate::error::ChainError;

/// The wire representation of arguments, attributes, and results.
///
/// Rust has no runtime-reflectable "arbitrary object" the way the system
/// this crate is modeled on does; a JSON-shaped value is the idiomatic
/// stand-in, and it is what actually crosses the duplex channel.
pub type Value = serde_json::Value;

/// Keyword arguments accompanying a [`Step::Call`](crate::Step::Call).
pub type Kwargs = serde_json::Map<String, Value>;

/// Index into a plain (non-target) [`Value`] the way a `GetAttr` would index
/// into an object: object fields by name, nothing else.
pub fn json_get_attr(value: &Value, name: &str) -> Result<Value, ChainError> {
    value
        .as_object()
        .and_then(|o| o.get(name))
        .cloned()
        .ok_or_else(|| ChainError::NoSuchAttr(name.to_string()))
}

/// Index into a plain [`Value`] the way a `GetItem` would: array index or
/// object key, depending on the key's shape.
pub fn json_get_item(value: &Value, key: &Value) -> Result<Value, ChainError> {
    match (value, key) {
        (Value::Array(items), Value::Number(n)) => {
            let idx = n.as_u64().ok_or(ChainError::TypeMismatch)? as usize;
            items.get(idx).cloned().ok_or(ChainError::IndexOutOfRange)
        }
        (Value::Object(map), Value::String(k)) => {
            map.get(k).cloned().ok_or_else(|| ChainError::NoSuchAttr(k.clone()))
        }
        _ => Err(ChainError::NotIndexable),
    }
}

/// Set an item on a plain owned [`Value`] (used only by in-memory testing
/// helpers; the listener never mutates a detached snapshot in place).
pub fn json_set_item(value: &mut Value, key: &Value, item: Value) -> Result<(), ChainError> {
    match (value, key) {
        (Value::Array(items), Value::Number(n)) => {
            let idx = n.as_u64().ok_or(ChainError::TypeMismatch)? as usize;
            if idx >= items.len() {
                return Err(ChainError::IndexOutOfRange);
            }
            items[idx] = item;
            Ok(())
        }
        (Value::Object(map), Value::String(k)) => {
            map.insert(k.clone(), item);
            Ok(())
        }
        _ => Err(ChainError::NotIndexable),
    }
}
