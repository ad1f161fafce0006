//! Serde helpers for REST responses.
//!
//! When the `tracing` feature is enabled, this module also logs warnings for any
//! unknown fields encountered during deserialization, helping detect API changes.

use std::marker::PhantomData;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// An entity that is stored in a [`Collection`](crate::rest::Collection) under its own id.
pub trait Keyed {
    fn key(&self) -> &str;
}

/// A `serde_as` type that reads a JSON array of [`Keyed`] entities into an [`IndexMap`] keyed by
/// each entity's id, keeping the order of the array. Later duplicates replace earlier ones.
///
/// Serializes back to an array of the values.
pub struct KeyedById<T>(PhantomData<T>);

impl<'de, T> serde_with::DeserializeAs<'de, IndexMap<String, T>> for KeyedById<T>
where
    T: Deserialize<'de> + Keyed,
{
    fn deserialize_as<D>(deserializer: D) -> std::result::Result<IndexMap<String, T>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries = Vec::<T>::deserialize(deserializer)?;

        Ok(entries
            .into_iter()
            .map(|entry| (entry.key().to_owned(), entry))
            .collect())
    }
}

impl<T: Serialize> serde_with::SerializeAs<IndexMap<String, T>> for KeyedById<T> {
    fn serialize_as<S>(
        source: &IndexMap<String, T>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(source.values())
    }
}

/// Deserialize JSON with unknown field warnings.
///
/// Unknown fields trigger warnings but do not cause deserialization to fail. On failure, the
/// path and value of the offending field are logged.
#[cfg(feature = "tracing")]
pub fn deserialize_with_warnings<T: DeserializeOwned>(value: Value) -> crate::Result<T> {
    use std::any::type_name;

    tracing::trace!(
        type_name = %type_name::<T>(),
        json = %value,
        "deserializing JSON"
    );

    // Kept to look up the values of unknown fields afterwards
    let original = value.clone();
    let mut unknown_paths: Vec<String> = Vec::new();

    let result: T = serde_ignored::deserialize(value, |path| {
        unknown_paths.push(path.to_string());
    })
    .inspect_err(|_| {
        let json_str = original.to_string();
        let jd = &mut serde_json::Deserializer::from_str(&json_str);
        let path_result: Result<T, _> = serde_path_to_error::deserialize(jd);
        if let Err(path_err) = path_result {
            let path = path_err.path().to_string();

            tracing::error!(
                type_name = %type_name::<T>(),
                path = %path,
                value = %format_value(lookup_value(&original, &path)),
                error = %path_err.inner(),
                "deserialization failed"
            );
        }
    })?;

    for path in unknown_paths {
        tracing::warn!(
            type_name = %type_name::<T>(),
            field = %path,
            value = %format_value(lookup_value(&original, &path)),
            "unknown field in API response"
        );
    }

    Ok(result)
}

/// Pass-through deserialization when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub fn deserialize_with_warnings<T: DeserializeOwned>(value: Value) -> crate::Result<T> {
    Ok(serde_json::from_value(value)?)
}

/// Look up a value by a `serde_ignored` or `serde_path_to_error` path such as
/// `servers[0].owners[1].avatar` or `servers.0.owners.?.id`.
///
/// `?` segments mark `Option` wrappers and are skipped.
#[cfg(feature = "tracing")]
fn lookup_value<'value>(value: &'value Value, path: &str) -> Option<&'value Value> {
    path.split(['.', '[', ']'])
        .filter(|segment| !segment.is_empty() && *segment != "?")
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?),
            _ => None,
        })
}

#[cfg(feature = "tracing")]
fn format_value(value: Option<&Value>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "<unable to retrieve>".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use serde_with::serde_as;

    use super::*;

    #[derive(Debug, Deserialize, Serialize, PartialEq)]
    struct Entity {
        id: String,
        #[serde(default)]
        name: Option<String>,
    }

    impl Keyed for Entity {
        fn key(&self) -> &str {
            &self.id
        }
    }

    #[serde_as]
    #[derive(Debug, Deserialize, Serialize)]
    struct Listing {
        #[serde_as(as = "KeyedById<Entity>")]
        entries: IndexMap<String, Entity>,
    }

    #[test]
    fn keyed_by_id_keeps_array_order() {
        let listing: Listing = serde_json::from_value(json!({
            "entries": [{ "id": "b" }, { "id": "a" }, { "id": "c" }]
        }))
        .unwrap();

        let keys: Vec<&str> = listing.entries.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn keyed_by_id_later_duplicate_wins() {
        let listing: Listing = serde_json::from_value(json!({
            "entries": [{ "id": "a", "name": "first" }, { "id": "a", "name": "second" }]
        }))
        .unwrap();

        assert_eq!(listing.entries.len(), 1);
        assert_eq!(listing.entries["a"].name.as_deref(), Some("second"));
    }

    #[test]
    fn keyed_by_id_serializes_as_array() {
        let listing: Listing = serde_json::from_value(json!({
            "entries": [{ "id": "a", "name": null }]
        }))
        .unwrap();

        assert_eq!(
            serde_json::to_value(&listing).unwrap(),
            json!({ "entries": [{ "id": "a", "name": null }] })
        );
    }

    #[test]
    fn deserialize_with_unknown_fields_should_succeed() {
        let entity: Entity = deserialize_with_warnings(json!({
            "id": "a",
            "name": "known",
            "brand_new_field": 42
        }))
        .unwrap();

        assert_eq!(entity.id, "a");
    }

    #[test]
    fn deserialize_missing_required_field_should_fail() {
        let result: crate::Result<Entity> = deserialize_with_warnings(json!({ "name": "x" }));

        assert!(result.is_err(), "missing id must fail");
    }

    #[cfg(feature = "tracing")]
    #[test]
    fn warning_is_emitted_for_unknown_fields() {
        use std::sync::{Arc, Mutex};

        use tracing_subscriber::layer::SubscriberExt as _;

        let captured: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let captured_clone = Arc::clone(&captured);

        let layer = tracing_subscriber::fmt::layer()
            .with_writer(move || {
                struct CaptureWriter(Arc<Mutex<Vec<String>>>);
                impl std::io::Write for CaptureWriter {
                    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                        if let Ok(s) = std::str::from_utf8(buf) {
                            self.0.lock().unwrap().push(s.to_owned());
                        }
                        Ok(buf.len())
                    }
                    fn flush(&mut self) -> std::io::Result<()> {
                        Ok(())
                    }
                }
                CaptureWriter(Arc::clone(&captured_clone))
            })
            .with_ansi(false);

        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            let _entity: Entity = deserialize_with_warnings(json!({
                "id": "a",
                "vanity_url": "surprise"
            }))
            .unwrap();
        });

        let output = captured.lock().unwrap().join("");
        assert!(
            output.contains("unknown field"),
            "Expected 'unknown field' in output, got: {output}"
        );
        assert!(
            output.contains("vanity_url"),
            "Expected 'vanity_url' in output, got: {output}"
        );
    }

    #[cfg(feature = "tracing")]
    #[test]
    fn lookup_handles_both_path_styles() {
        let value = json!({ "servers": [{ "owners": [{ "id": "1" }, { "id": "2" }] }] });

        assert_eq!(
            lookup_value(&value, "servers[0].owners[1].id"),
            Some(&json!("2"))
        );
        assert_eq!(
            lookup_value(&value, "servers.0.owners.?.1.id"),
            Some(&json!("2"))
        );
        assert_eq!(lookup_value(&value, ""), Some(&value));
        assert_eq!(lookup_value(&value, "servers[9]"), None);
        assert_eq!(lookup_value(&value, "servers[0].owners[0].id.deeper"), None);
    }

    #[cfg(feature = "tracing")]
    #[test]
    fn format_none_shows_placeholder() {
        assert_eq!(format_value(None), "<unable to retrieve>");
        assert_eq!(format_value(Some(&json!({ "a": 1 }))), r#"{"a":1}"#);
    }
}
