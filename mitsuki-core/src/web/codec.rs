use std::any::{Any, TypeId};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use base64::Engine;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

/// Type-erased encoder for one concrete type.
pub type EncodeFn = Arc<dyn Fn(&dyn Any) -> Option<Value> + Send + Sync>;

/// User-registered type→encoder mappings.
///
/// Register an `EncoderRegistry` component in the container (any name) and
/// the runtime picks it up when the container freezes; its entries extend
/// the codec's built-in set, never replace it.
#[derive(Clone, Default)]
pub struct EncoderRegistry {
    entries: Vec<(TypeId, EncodeFn)>,
}

impl EncoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an encoder for values of type `T`.
    pub fn insert<T, F>(&mut self, encode: F) -> &mut Self
    where
        T: Any,
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        let erased: EncodeFn =
            Arc::new(move |any: &dyn Any| any.downcast_ref::<T>().map(&encode));
        self.entries.push((TypeId::of::<T>(), erased));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// JSON encoder used by the response pipeline.
///
/// Dispatches by concrete type first (built-in and user-registered
/// encoders), falling back to plain serde serialization. The serde path
/// already covers `chrono` instants and dates (ISO-8601), `uuid::Uuid`
/// (textual), serde-tagged enums, and record structs; the built-in entries
/// add the representations serde does not produce on its own: decimals as
/// lossless numbers, byte vectors as base-64, hash sets as ordered
/// sequences.
pub struct JsonCodec {
    encoders: HashMap<TypeId, EncodeFn>,
}

impl JsonCodec {
    pub fn with_builtins() -> Self {
        let mut codec = JsonCodec {
            encoders: HashMap::new(),
        };
        codec.register::<Decimal>(encode_decimal);
        codec.register::<Vec<u8>>(|bytes| {
            Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
        });
        codec.register::<bytes::Bytes>(|bytes| {
            Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
        });
        codec.register::<HashSet<String>>(|set| {
            let mut items: Vec<&String> = set.iter().collect();
            items.sort();
            Value::Array(items.into_iter().map(|s| Value::String(s.clone())).collect())
        });
        codec.register::<BTreeSet<String>>(|set| {
            Value::Array(set.iter().map(|s| Value::String(s.clone())).collect())
        });
        codec
    }

    fn register<T: Any>(&mut self, encode: impl Fn(&T) -> Value + Send + Sync + 'static) {
        let erased: EncodeFn =
            Arc::new(move |any: &dyn Any| any.downcast_ref::<T>().map(&encode));
        self.encoders.insert(TypeId::of::<T>(), erased);
    }

    /// Merge user-registered encoders in. Later registrations win over
    /// earlier ones for the same type, but built-ins stay in place for
    /// types the registry does not mention.
    pub fn extend(&mut self, registry: &EncoderRegistry) {
        for (type_id, encode) in &registry.entries {
            self.encoders.insert(*type_id, encode.clone());
        }
    }

    /// Encode a value to JSON, preferring a registered encoder for its
    /// concrete type.
    pub fn encode<T: Serialize + Any>(&self, value: &T) -> Result<Value, serde_json::Error> {
        if let Some(encode) = self.encoders.get(&TypeId::of::<T>()) {
            if let Some(encoded) = encode(value) {
                return Ok(encoded);
            }
        }
        serde_json::to_value(value)
    }
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Decimals serialize as a JSON number when the textual form survives the
/// f64 round-trip, otherwise as a string so no precision is lost.
fn encode_decimal(d: &Decimal) -> Value {
    let text = d.to_string();
    if let Some(n) = text
        .parse::<f64>()
        .ok()
        .filter(|f| f.to_string() == text || format!("{f:?}") == text)
        .and_then(serde_json::Number::from_f64)
    {
        Value::Number(n)
    } else {
        Value::String(text)
    }
}

// ── Erased payloads ─────────────────────────────────────────────────────────

/// Object-safe wrapper letting `Reply` carry any serializable value until
/// the pipeline encodes it with the application codec.
pub(crate) trait ErasedJson: Send {
    fn encode(&self, codec: &JsonCodec) -> Result<Value, serde_json::Error>;
}

impl<T: Serialize + Any + Send> ErasedJson for T {
    fn encode(&self, codec: &JsonCodec) -> Result<Value, serde_json::Error> {
        codec.encode(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use uuid::Uuid;

    #[test]
    fn instant_encodes_iso8601() {
        let codec = JsonCodec::with_builtins();
        let instant = Utc.with_ymd_and_hms(2024, 6, 3, 13, 0, 0).unwrap();
        let value = codec.encode(&instant).unwrap();
        assert_eq!(value, Value::String("2024-06-03T13:00:00Z".into()));
    }

    #[test]
    fn wall_date_encodes_iso8601() {
        let codec = JsonCodec::with_builtins();
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        assert_eq!(codec.encode(&date).unwrap(), Value::String("2024-06-03".into()));
    }

    #[test]
    fn uuid_encodes_textual() {
        let codec = JsonCodec::with_builtins();
        let id = Uuid::nil();
        assert_eq!(
            codec.encode(&id).unwrap(),
            Value::String("00000000-0000-0000-0000-000000000000".into())
        );
    }

    #[test]
    fn decimal_lossless_number_when_possible() {
        let codec = JsonCodec::with_builtins();
        let d: Decimal = "2.5".parse().unwrap();
        assert_eq!(codec.encode(&d).unwrap(), serde_json::json!(2.5));
    }

    #[test]
    fn decimal_falls_back_to_string() {
        let codec = JsonCodec::with_builtins();
        let d: Decimal = "0.10000000000000000001".parse().unwrap();
        assert_eq!(
            codec.encode(&d).unwrap(),
            Value::String("0.10000000000000000001".into())
        );
    }

    #[test]
    fn byte_vec_encodes_base64() {
        let codec = JsonCodec::with_builtins();
        let bytes = vec![1u8, 2, 3];
        assert_eq!(codec.encode(&bytes).unwrap(), Value::String("AQID".into()));
    }

    #[test]
    fn hash_set_encodes_ordered() {
        let codec = JsonCodec::with_builtins();
        let mut set = HashSet::new();
        set.insert("b".to_string());
        set.insert("a".to_string());
        assert_eq!(codec.encode(&set).unwrap(), serde_json::json!(["a", "b"]));
    }

    #[test]
    fn variant_tag_via_serde() {
        #[derive(Serialize)]
        #[serde(rename_all = "snake_case")]
        enum Status {
            Active,
        }
        let codec = JsonCodec::with_builtins();
        assert_eq!(
            codec.encode(&Status::Active).unwrap(),
            Value::String("active".into())
        );
    }

    #[test]
    fn user_encoder_extends_builtins() {
        #[derive(Serialize, Clone)]
        struct Money(i64);

        let mut registry = EncoderRegistry::new();
        registry.insert::<Money, _>(|m| Value::String(format!("{}.00 EUR", m.0)));

        let mut codec = JsonCodec::with_builtins();
        codec.extend(&registry);

        assert_eq!(
            codec.encode(&Money(5)).unwrap(),
            Value::String("5.00 EUR".into())
        );
        // Built-ins still present.
        assert_eq!(
            codec.encode(&vec![0u8]).unwrap(),
            Value::String("AA==".into())
        );
    }
}
