//! Built-in callables backing gather, unpack, and sourced placeholders.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::bail;

use crate::errors::NotTransformedError;
use crate::func::{Signature, SymFn};
use crate::value::Value;

pub(crate) fn gather_list() -> SymFn {
    SymFn::new("gather_list", Signature::variadic(), |input| {
        Ok(Value::List(input.args))
    })
}

pub(crate) fn gather_tuple() -> SymFn {
    SymFn::new("gather_tuple", Signature::variadic(), |input| {
        Ok(Value::Tuple(input.args))
    })
}

pub(crate) fn gather_set() -> SymFn {
    SymFn::new("gather_set", Signature::variadic(), |input| {
        Ok(Value::Set(input.args.into_iter().collect::<BTreeSet<_>>()))
    })
}

pub(crate) fn gather_map() -> SymFn {
    SymFn::new("gather_map", Signature::variadic(), |input| {
        let mut entries = BTreeMap::new();
        for item in input.args {
            let Value::Tuple(mut pair) = item else {
                bail!("gather_map expects key-value pairs");
            };
            if pair.len() != 2 {
                bail!("gather_map expects key-value pairs");
            }
            let value = pair.pop().expect("pair has two items");
            let key = pair.pop().expect("pair has two items");
            entries.insert(key, value);
        }
        Ok(Value::Map(entries))
    })
}

/// Placeholder for nodes created by `Registry::source`. Invoking it means
/// the registry was not supplied to `run`, so the transformer never
/// replaced it with a store read.
pub(crate) fn source_placeholder() -> SymFn {
    SymFn::new("source", Signature::new(Vec::new()), |_| {
        Err(anyhow::Error::new(NotTransformedError))
    })
}

pub(crate) fn unpack() -> SymFn {
    SymFn::new(
        "unpack",
        Signature::positional(["iterable", "length"]),
        |input| {
            let length = input
                .arg(1)
                .and_then(Value::as_int)
                .map(|n| n as usize)
                .unwrap_or(0);
            let items = match input.arg(0) {
                Some(Value::List(items)) | Some(Value::Tuple(items)) => items.clone(),
                Some(other) => bail!("cannot unpack {}", other.compact()),
                None => bail!("unpack requires an iterable"),
            };
            if items.len() < length {
                bail!(
                    "not enough values to unpack (expected {length}, got {})",
                    items.len()
                );
            }
            if items.len() > length {
                bail!("too many values to unpack (expected {length})");
            }
            Ok(Value::Tuple(items))
        },
    )
}

pub(crate) fn get_item() -> SymFn {
    SymFn::new(
        "get_item",
        Signature::positional(["value", "key"]),
        |input| {
            let key = input.arg(1).cloned().unwrap_or(Value::Null);
            match input.arg(0) {
                Some(Value::List(items)) | Some(Value::Tuple(items)) => {
                    let index = key
                        .as_int()
                        .map(|n| n as usize)
                        .filter(|&n| n < items.len());
                    match index {
                        Some(index) => Ok(items[index].clone()),
                        None => bail!("index {} out of range", key.compact()),
                    }
                }
                Some(Value::Map(entries)) => match entries.get(&key) {
                    Some(value) => Ok(value.clone()),
                    None => bail!("key {} not found", key.compact()),
                },
                Some(other) => bail!("cannot index into {}", other.compact()),
                None => bail!("get_item requires a value"),
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::func::CallInput;

    #[test]
    fn gather_map_rebuilds_entries_from_pairs() {
        let input = CallInput {
            args: vec![
                Value::Tuple(vec![Value::Str("a".into()), Value::Int(1)]),
                Value::Tuple(vec![Value::Str("b".into()), Value::Int(2)]),
            ],
            kwargs: vec![],
        };
        let Value::Map(entries) = gather_map().invoke(input).expect("invoke") else {
            panic!("expected a map");
        };
        assert_eq!(entries.get(&Value::Str("a".into())), Some(&Value::Int(1)));
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn unpack_checks_length_both_ways() {
        let short = CallInput {
            args: vec![Value::List(vec![Value::Int(1)]), Value::Int(2)],
            kwargs: vec![],
        };
        let error = unpack().invoke(short).expect_err("too short");
        assert!(error.to_string().contains("not enough values"));

        let long = CallInput {
            args: vec![
                Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
                Value::Int(2),
            ],
            kwargs: vec![],
        };
        let error = unpack().invoke(long).expect_err("too long");
        assert!(error.to_string().contains("too many values"));
    }

    #[test]
    fn source_placeholder_reports_missing_registry() {
        let error = source_placeholder()
            .invoke(CallInput::default())
            .expect_err("placeholder must fail");
        assert!(error.downcast_ref::<NotTransformedError>().is_some());
    }
}
