//! Restricted document codec for snapshots, stored state and notices.
//!
//! # Responsibility
//! - Encode `Value` trees into YAML documents and decode them back.
//! - Bridge serde-derived snapshot structs into the closed `Value` set.
//!
//! # Invariants
//! - `decode(encode(x)) == x` for every `Value`.
//! - Sets are written as `!set` mappings and byte strings as `!binary`
//!   base64 scalars; untagged sequences always decode as lists.
//! - A mapping with a byte-string key is written as a `!map` sequence of
//!   `[key, value]` pairs, since YAML emitters cannot place a tagged
//!   scalar in key position.
//! - Shapes outside the supported set are rejected with the offending key
//!   path, never coerced.

use crate::model::value::{Key, Snapshot, Value};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_yaml::value::{Tag, TaggedValue};
use serde_yaml::{Mapping, Number, Value as Yaml};
use std::error::Error;
use std::fmt::{Display, Formatter};

const SET_TAG: &str = "set";
const BINARY_TAG: &str = "binary";
const MAP_TAG: &str = "map";
const YAML_CORE_TAG_PREFIX: &str = "tag:yaml.org,2002:";
const ROOT_PATH: &str = "$";

pub type CodecResult<T> = Result<T, SerializationError>;

/// Encode/decode failure.
#[derive(Debug)]
pub enum SerializationError {
    /// A value outside the supported shape set; `key` is the path inside the document.
    Unsupported { key: String, found: String },
    /// Document text that is not a valid encoding.
    Corrupt(String),
    Yaml(serde_yaml::Error),
}

impl Display for SerializationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsupported { key, found } => {
                write!(f, "unsupported value at `{key}`: found {found}")
            }
            Self::Corrupt(message) => write!(f, "corrupt document: {message}"),
            Self::Yaml(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SerializationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Yaml(err) => Some(err),
            Self::Unsupported { .. } | Self::Corrupt(_) => None,
        }
    }
}

impl From<serde_yaml::Error> for SerializationError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Yaml(value)
    }
}

/// Encodes one value as a standalone YAML document.
pub fn encode(value: &Value) -> CodecResult<String> {
    Ok(serde_yaml::to_string(&to_yaml(value, Flavor::Tagged))?)
}

/// Decodes a document produced by [`encode`].
///
/// # Errors
/// - `Corrupt` when the text is not YAML.
/// - `Unsupported` when the document carries a tag or key shape outside the value model.
pub fn decode(document: &str) -> CodecResult<Value> {
    let yaml: Yaml = serde_yaml::from_str(document)
        .map_err(|err| SerializationError::Corrupt(err.to_string()))?;
    from_yaml(yaml, ROOT_PATH)
}

/// Encodes a snapshot as a string-keyed mapping document.
pub fn encode_snapshot(snapshot: &Snapshot) -> CodecResult<String> {
    encode(&Value::from_snapshot(snapshot))
}

/// Decodes a mapping document back into a snapshot.
pub fn decode_snapshot(document: &str) -> CodecResult<Snapshot> {
    let value = decode(document)?;
    let found = value.type_name();
    value
        .into_snapshot()
        .ok_or_else(|| SerializationError::Unsupported {
            key: ROOT_PATH.to_string(),
            found: format!("{found} where a string-keyed mapping was expected"),
        })
}

/// Converts any serde-serializable value into the value model.
///
/// Enum variants carrying data, non-string-like mapping keys and integers
/// outside `i64` are rejected.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> CodecResult<Value> {
    from_yaml(serde_yaml::to_value(value)?, ROOT_PATH)
}

/// Converts a value back into a serde-deserializable type.
///
/// Byte strings are presented as sequences of integers and sets as
/// sequences, so `Vec<u8>` and `BTreeSet<T>` fields deserialize naturally.
pub fn from_value<T: DeserializeOwned>(value: &Value) -> CodecResult<T> {
    Ok(serde_yaml::from_value(to_yaml(value, Flavor::Plain))?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    Tagged,
    Plain,
}

fn to_yaml(value: &Value, flavor: Flavor) -> Yaml {
    match value {
        Value::Null => Yaml::Null,
        Value::Bool(value) => Yaml::Bool(*value),
        Value::Int(value) => Yaml::Number(Number::from(*value)),
        Value::Float(value) => Yaml::Number(Number::from(*value)),
        Value::Str(value) => Yaml::String(value.clone()),
        Value::Bytes(value) => bytes_to_yaml(value, flavor),
        Value::List(items) => Yaml::Sequence(
            items
                .iter()
                .map(|item| to_yaml(item, flavor))
                .collect(),
        ),
        Value::Set(members) => match flavor {
            Flavor::Tagged => {
                let mut mapping = Mapping::new();
                for member in members {
                    mapping.insert(key_to_yaml(member, flavor), Yaml::Null);
                }
                tagged(SET_TAG, Yaml::Mapping(mapping))
            }
            Flavor::Plain => Yaml::Sequence(
                members
                    .iter()
                    .map(|member| key_to_yaml(member, flavor))
                    .collect(),
            ),
        },
        Value::Map(entries)
            if flavor == Flavor::Tagged
                && entries.keys().any(|key| matches!(key, Key::Bytes(_))) =>
        {
            let pairs = entries
                .iter()
                .map(|(key, item)| {
                    Yaml::Sequence(vec![key_to_yaml(key, flavor), to_yaml(item, flavor)])
                })
                .collect();
            tagged(MAP_TAG, Yaml::Sequence(pairs))
        }
        Value::Map(entries) => {
            let mut mapping = Mapping::new();
            for (key, item) in entries {
                mapping.insert(key_to_yaml(key, flavor), to_yaml(item, flavor));
            }
            Yaml::Mapping(mapping)
        }
    }
}

fn key_to_yaml(key: &Key, flavor: Flavor) -> Yaml {
    match key {
        Key::Bool(value) => Yaml::Bool(*value),
        Key::Int(value) => Yaml::Number(Number::from(*value)),
        Key::Str(value) => Yaml::String(value.clone()),
        Key::Bytes(value) => bytes_to_yaml(value, flavor),
    }
}

fn bytes_to_yaml(value: &[u8], flavor: Flavor) -> Yaml {
    match flavor {
        Flavor::Tagged => tagged(BINARY_TAG, Yaml::String(BASE64.encode(value))),
        Flavor::Plain => Yaml::Sequence(
            value
                .iter()
                .map(|byte| Yaml::Number(Number::from(*byte)))
                .collect(),
        ),
    }
}

fn tagged(tag: &str, value: Yaml) -> Yaml {
    Yaml::Tagged(Box::new(TaggedValue {
        tag: Tag::new(tag),
        value,
    }))
}

fn from_yaml(yaml: Yaml, path: &str) -> CodecResult<Value> {
    match yaml {
        Yaml::Null => Ok(Value::Null),
        Yaml::Bool(value) => Ok(Value::Bool(value)),
        Yaml::Number(number) => number_from_yaml(&number, path),
        Yaml::String(value) => Ok(Value::Str(value)),
        Yaml::Sequence(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| from_yaml(item, &format!("{path}[{index}]")))
            .collect::<CodecResult<Vec<_>>>()
            .map(Value::List),
        Yaml::Mapping(mapping) => {
            let mut entries = indexmap::IndexMap::with_capacity(mapping.len());
            for (key, item) in mapping {
                let key = key_from_yaml(key, path)?;
                let item_path = format!("{path}.{key}");
                if entries.insert(key, from_yaml(item, &item_path)?).is_some() {
                    return Err(SerializationError::Corrupt(format!(
                        "duplicate mapping key at `{item_path}`"
                    )));
                }
            }
            Ok(Value::Map(entries))
        }
        Yaml::Tagged(tagged) => tagged_from_yaml(*tagged, path),
    }
}

fn number_from_yaml(number: &Number, path: &str) -> CodecResult<Value> {
    if let Some(value) = number.as_i64() {
        return Ok(Value::Int(value));
    }
    if number.is_f64() {
        if let Some(value) = number.as_f64() {
            return Ok(Value::Float(value));
        }
    }
    Err(SerializationError::Unsupported {
        key: path.to_string(),
        found: format!("integer {number} outside the signed 64-bit range"),
    })
}

fn key_from_yaml(key: Yaml, path: &str) -> CodecResult<Key> {
    match key {
        Yaml::Bool(value) => Ok(Key::Bool(value)),
        Yaml::String(value) => Ok(Key::Str(value)),
        Yaml::Number(number) => match number_from_yaml(&number, path)? {
            Value::Int(value) => Ok(Key::Int(value)),
            _ => Err(unsupported_key(path, "float")),
        },
        Yaml::Tagged(tagged) if normalize_tag(&tagged.tag) == BINARY_TAG => {
            Ok(Key::Bytes(binary_from_yaml(tagged.value, path)?))
        }
        Yaml::Null => Err(unsupported_key(path, "null")),
        Yaml::Sequence(_) => Err(unsupported_key(path, "sequence")),
        Yaml::Mapping(_) => Err(unsupported_key(path, "mapping")),
        Yaml::Tagged(tagged) => Err(unsupported_key(
            path,
            &format!("tagged value {}", tagged.tag),
        )),
    }
}

fn unsupported_key(path: &str, found: &str) -> SerializationError {
    SerializationError::Unsupported {
        key: format!("{path}{{}}"),
        found: format!("{found} used as a key"),
    }
}

fn tagged_from_yaml(tagged: TaggedValue, path: &str) -> CodecResult<Value> {
    match normalize_tag(&tagged.tag).as_str() {
        SET_TAG => {
            let Yaml::Mapping(mapping) = tagged.value else {
                return Err(SerializationError::Corrupt(format!(
                    "`{path}` is tagged as a set but is not a mapping"
                )));
            };
            let mut members = std::collections::BTreeSet::new();
            for (member, marker) in mapping {
                if !marker.is_null() {
                    return Err(SerializationError::Corrupt(format!(
                        "set member at `{path}` carries a non-null value"
                    )));
                }
                members.insert(key_from_yaml(member, path)?);
            }
            Ok(Value::Set(members))
        }
        BINARY_TAG => Ok(Value::Bytes(binary_from_yaml(tagged.value, path)?)),
        MAP_TAG => pairs_from_yaml(tagged.value, path),
        _ => Err(SerializationError::Unsupported {
            key: path.to_string(),
            found: format!("tagged value {}", tagged.tag),
        }),
    }
}

fn pairs_from_yaml(value: Yaml, path: &str) -> CodecResult<Value> {
    let Yaml::Sequence(pairs) = value else {
        return Err(SerializationError::Corrupt(format!(
            "`{path}` is tagged as a map but is not a sequence"
        )));
    };
    let mut entries = indexmap::IndexMap::with_capacity(pairs.len());
    for (index, pair) in pairs.into_iter().enumerate() {
        let not_a_pair = || {
            SerializationError::Corrupt(format!(
                "entry {index} of map `{path}` is not a [key, value] pair"
            ))
        };
        let Yaml::Sequence(pair) = pair else {
            return Err(not_a_pair());
        };
        let mut pair = pair.into_iter();
        let (Some(key), Some(item), None) = (pair.next(), pair.next(), pair.next()) else {
            return Err(not_a_pair());
        };
        let key = key_from_yaml(key, path)?;
        let item_path = format!("{path}.{key}");
        if entries.insert(key, from_yaml(item, &item_path)?).is_some() {
            return Err(SerializationError::Corrupt(format!(
                "duplicate mapping key at `{item_path}`"
            )));
        }
    }
    Ok(Value::Map(entries))
}

fn binary_from_yaml(value: Yaml, path: &str) -> CodecResult<Vec<u8>> {
    let Yaml::String(text) = value else {
        return Err(SerializationError::Corrupt(format!(
            "`{path}` is tagged as binary but is not a string"
        )));
    };
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64
        .decode(compact.as_bytes())
        .map_err(|err| SerializationError::Corrupt(format!("invalid base64 at `{path}`: {err}")))
}

fn normalize_tag(tag: &Tag) -> String {
    let raw = tag.to_string();
    let trimmed = raw.trim_start_matches('!');
    trimmed
        .strip_prefix(YAML_CORE_TAG_PREFIX)
        .unwrap_or(trimmed)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::{decode, encode, normalize_tag, SerializationError};
    use crate::model::value::{Key, Value};
    use serde_yaml::value::Tag;

    #[test]
    fn normalizes_core_and_local_tags() {
        assert_eq!(normalize_tag(&Tag::new("set")), "set");
        assert_eq!(normalize_tag(&Tag::new("!!binary")), "binary");
        assert_eq!(normalize_tag(&Tag::new("tag:yaml.org,2002:set")), "set");
    }

    #[test]
    fn set_document_uses_set_tag() {
        let document = encode(&Value::set([Key::Int(2), Key::Int(3)])).expect("encode");
        assert!(document.contains("!set"), "document was: {document}");
        assert_eq!(
            decode(&document).expect("decode"),
            Value::set([Key::Int(2), Key::Int(3)])
        );
    }

    #[test]
    fn decodes_core_schema_spellings() {
        let value = decode("four: !!set {2: null, 3: null}\nseven: !!binary |\n  MTIzNA==\n")
            .expect("decode");
        assert_eq!(
            value.get("four"),
            Some(&Value::set([Key::Int(2), Key::Int(3)]))
        );
        assert_eq!(value.get("seven"), Some(&Value::bytes(b"1234".to_vec())));
    }

    #[test]
    fn rejects_unknown_tag_with_key_path() {
        let err = decode("outer:\n  inner: !!python/tuple [a, b]\n").unwrap_err();
        match err {
            SerializationError::Unsupported { key, found } => {
                assert_eq!(key, "$.outer.inner");
                assert!(found.contains("python/tuple"), "found: {found}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn byte_keyed_mapping_is_written_as_pairs() {
        let value = Value::map([
            (Key::Bytes(b"k".to_vec()), Value::Int(1)),
            (Key::from("plain"), Value::Int(2)),
        ]);
        let document = encode(&value).expect("encode");
        assert!(document.contains("!map"), "document was: {document}");
        assert_eq!(decode(&document).expect("decode"), value);
    }

    #[test]
    fn rejects_map_entries_that_are_not_pairs() {
        let err = decode("!map\n- [a, 1, 2]\n").unwrap_err();
        assert!(matches!(err, SerializationError::Corrupt(_)));
    }

    #[test]
    fn rejects_float_keys() {
        let err = decode("1.5: a\n").unwrap_err();
        assert!(matches!(err, SerializationError::Unsupported { .. }));
    }

    #[test]
    fn rejects_invalid_yaml_as_corrupt() {
        let err = decode("key: [unterminated").unwrap_err();
        assert!(matches!(err, SerializationError::Corrupt(_)));
    }
}
