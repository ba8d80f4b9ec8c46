//! Serde adapters that carry raw bytes through JSON as base64 strings.

pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&BASE64.encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(&encoded).map_err(D::Error::custom)
    }
}

pub(crate) mod base64_map {
    use std::collections::BTreeMap;

    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

    type Encoded = BTreeMap<String, BTreeMap<String, String>>;

    pub fn serialize<S>(
        value: &BTreeMap<String, BTreeMap<String, Vec<u8>>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded: Encoded = value
            .iter()
            .map(|(collection, entries)| {
                let entries = entries
                    .iter()
                    .map(|(key, bytes)| (key.clone(), BASE64.encode(bytes)))
                    .collect();
                (collection.clone(), entries)
            })
            .collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<BTreeMap<String, BTreeMap<String, Vec<u8>>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = Encoded::deserialize(deserializer)?;
        let mut decoded = BTreeMap::new();
        for (collection, entries) in encoded {
            let mut values = BTreeMap::new();
            for (key, text) in entries {
                let bytes = BASE64.decode(&text).map_err(|e| {
                    D::Error::custom(format!("{collection}/{key}: {e}"))
                })?;
                values.insert(key, bytes);
            }
            decoded.insert(collection, values);
        }
        Ok(decoded)
    }
}
