//! The checksummed keyspace map.

use crate::checksum::Checksum;
use crate::error::{CoreError, CoreResult};
use driftkv_codec::{parse, to_canonical_vec, Value};
use std::collections::BTreeMap;

/// An ordered map from string keys to canonical JSON values, with an
/// incrementally-maintained 8-hex-digit checksum.
///
/// Keys compare bytewise. The checksum is updated in O(1) (beyond the hash
/// of the touched entry) on every [`set`] and [`remove`], and is stable
/// across clients because values are held canonically.
///
/// [`set`]: ChecksummedMap::set
/// [`remove`]: ChecksummedMap::remove
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksummedMap {
    entries: BTreeMap<String, Value>,
    checksum: Checksum,
}

impl ChecksummedMap {
    /// Creates an empty map with checksum `"00000000"`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact-match lookup.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Checks whether the key is present.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Sets the key to the value, updating the checksum.
    pub fn set(&mut self, key: String, value: Value) {
        if let Some(old) = self.entries.get(&key) {
            self.checksum.remove(&key, old);
        }
        self.checksum.add(&key, &value);
        self.entries.insert(key, value);
    }

    /// Removes the key, updating the checksum.
    ///
    /// Returns `true` if the key existed.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(old) => {
                self.checksum.remove(key, &old);
                true
            }
            None => false,
        }
    }

    /// Removes every entry, resetting the checksum.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.checksum = Checksum::new();
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the current checksum.
    #[must_use]
    pub fn checksum(&self) -> Checksum {
        self.checksum
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Serializes the map to its canonical chunk form (a JSON object).
    #[must_use]
    pub fn to_chunk(&self) -> Vec<u8> {
        let object = Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );
        to_canonical_vec(&object)
    }

    /// Loads a map from its chunk form, recomputing the checksum.
    pub fn from_chunk(bytes: &[u8]) -> CoreResult<Self> {
        let value = parse(bytes)?;
        let Value::Object(pairs) = value else {
            return Err(CoreError::corrupt_commit("keyspace chunk is not an object"));
        };
        let mut map = Self::new();
        for (key, value) in pairs {
            map.set(key, value);
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn v(text: &str) -> Value {
        parse(text.as_bytes()).unwrap()
    }

    #[test]
    fn empty_map_checksum() {
        assert_eq!(ChecksummedMap::new().checksum().to_string(), "00000000");
    }

    #[test]
    fn set_get_has() {
        let mut map = ChecksummedMap::new();
        map.set("foo".into(), v("\"bar\""));
        assert!(map.has("foo"));
        assert_eq!(map.get("foo"), Some(&v("\"bar\"")));
        assert!(!map.has("baz"));
    }

    #[test]
    fn set_then_remove_restores_checksum() {
        let mut map = ChecksummedMap::new();
        let baseline = map.checksum();

        map.set("k".into(), v("{\"a\":1}"));
        assert_ne!(map.checksum(), baseline);

        assert!(map.remove("k"));
        assert_eq!(map.checksum(), baseline);
    }

    #[test]
    fn overwrite_updates_checksum() {
        let mut map1 = ChecksummedMap::new();
        map1.set("k".into(), v("1"));
        map1.set("k".into(), v("2"));

        let mut map2 = ChecksummedMap::new();
        map2.set("k".into(), v("2"));

        assert_eq!(map1.checksum(), map2.checksum());
        assert_eq!(map1.len(), 1);
    }

    #[test]
    fn remove_missing_returns_false() {
        let mut map = ChecksummedMap::new();
        assert!(!map.remove("absent"));
        assert_eq!(map.checksum().to_string(), "00000000");
    }

    #[test]
    fn iteration_is_key_ordered() {
        let mut map = ChecksummedMap::new();
        map.set("b".into(), v("2"));
        map.set("a".into(), v("1"));
        map.set("c".into(), v("3"));

        let keys: Vec<_> = map.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn chunk_round_trip() {
        let mut map = ChecksummedMap::new();
        map.set("one".into(), v("1"));
        map.set("two".into(), v("{\"nested\":[true,null]}"));

        let chunk = map.to_chunk();
        let loaded = ChecksummedMap::from_chunk(&chunk).unwrap();
        assert_eq!(loaded, map);
        assert_eq!(loaded.checksum(), map.checksum());
    }

    #[test]
    fn from_chunk_rejects_non_object() {
        assert!(ChecksummedMap::from_chunk(b"[1,2]").is_err());
        assert!(ChecksummedMap::from_chunk(b"not json").is_err());
    }

    proptest! {
        #[test]
        fn checksum_independent_of_insertion_order(
            mut entries in prop::collection::vec(("[a-z]{1,8}", any::<i64>()), 0..20),
        ) {
            let mut forward = ChecksummedMap::new();
            for (k, n) in &entries {
                forward.set(k.clone(), Value::from(*n));
            }

            entries.reverse();
            let mut backward = ChecksummedMap::new();
            for (k, n) in &entries {
                backward.set(k.clone(), Value::from(*n));
            }

            prop_assert_eq!(forward.checksum(), backward.checksum());
        }

        #[test]
        fn chunk_round_trip_preserves_checksum(
            entries in prop::collection::vec(("[a-z]{1,8}", "[a-z0-9]{0,8}"), 0..16),
        ) {
            let mut map = ChecksummedMap::new();
            for (k, s) in entries {
                map.set(k, Value::from(s));
            }
            let loaded = ChecksummedMap::from_chunk(&map.to_chunk()).unwrap();
            prop_assert_eq!(loaded.checksum(), map.checksum());
        }
    }
}
