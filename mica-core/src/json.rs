// mica-core - JSON rendering of values
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Renders values as `serde_json::Value` for the harness artifacts
//! (globals dump). Functions and classes render as their string
//! representation; revisited heap cells render as `null` so cyclic
//! graphs terminate.

use std::collections::HashSet;
use std::rc::Rc;

use serde_json::{json, Map, Value};

use crate::value::MicaVal;

/// Render a value as JSON.
pub fn value_to_json(value: &MicaVal) -> Value {
    let mut visited: HashSet<usize> = HashSet::new();
    to_json_inner(value, &mut visited)
}

fn to_json_inner(value: &MicaVal, visited: &mut HashSet<usize>) -> Value {
    match value {
        MicaVal::Null => Value::Null,
        MicaVal::Number(v) => match serde_json::Number::from_f64(*v) {
            Some(n) => Value::Number(n),
            // NaN and infinities have no JSON number form.
            None => json!(crate::value::number_to_string(*v)),
        },
        MicaVal::Bool(b) => json!(b),
        MicaVal::String(s) => json!(s.as_ref()),
        MicaVal::Array(cell) => {
            let key = Rc::as_ptr(cell) as usize;
            if !visited.insert(key) {
                return Value::Null;
            }
            let items: Vec<Value> = cell
                .to_vec()
                .iter()
                .map(|v| to_json_inner(v, visited))
                .collect();
            visited.remove(&key);
            Value::Array(items)
        }
        MicaVal::Object(cell) => {
            let key = Rc::as_ptr(cell) as usize;
            if !visited.insert(key) {
                return Value::Null;
            }
            let mut map = Map::new();
            for name in cell.keys() {
                if let Some(field) = cell.own_field(&name) {
                    map.insert(name.to_string(), to_json_inner(&field, visited));
                }
            }
            visited.remove(&key);
            Value::Object(map)
        }
        other => json!(other.to_display_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives() {
        assert_eq!(value_to_json(&MicaVal::Null), Value::Null);
        assert_eq!(value_to_json(&MicaVal::Number(2.5)), json!(2.5));
        assert_eq!(value_to_json(&MicaVal::Number(f64::NAN)), json!("NaN"));
        assert_eq!(value_to_json(&MicaVal::string("hi")), json!("hi"));
    }

    #[test]
    fn test_object_and_array() {
        let obj = MicaVal::object();
        obj.write_field("a", MicaVal::Number(1.0), false).unwrap();
        obj.write_field("b", MicaVal::array(vec![MicaVal::Bool(true)]), false)
            .unwrap();
        let v = value_to_json(&obj);
        assert_eq!(v["a"], json!(1.0));
        assert_eq!(v["b"], json!([true]));
    }

    #[test]
    fn test_cycle_terminates() {
        let obj = MicaVal::object();
        obj.write_field("me", obj.clone(), false).unwrap();
        let v = value_to_json(&obj);
        assert_eq!(v["me"], Value::Null);
    }
}
