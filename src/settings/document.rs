//! In-memory shape of the settings file.
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_yaml::{Mapping, Value};
use tracing::warn;

const ZONES_KEY: &str = "zones";
const LEGACY_ZONE_ID_KEY: &str = "zone_id";
const LEGACY_DOMAIN_KEY: &str = "domain";

/// One connected Cloudflare zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRecord {
    #[serde(deserialize_with = "zone_id_from_scalar")]
    pub zone_id: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<DateTime<Utc>>,
}

impl ZoneRecord {
    pub fn new(domain: impl Into<String>, zone_id: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            domain: domain.into(),
            connected_at: None,
        }
    }

    pub fn connected_now(domain: impl Into<String>, zone_id: impl Into<String>) -> Self {
        Self {
            connected_at: Some(Utc::now()),
            ..Self::new(domain, zone_id)
        }
    }
}

/// Zone ids are opaque strings, but hand-edited files may hold a bare number.
fn zone_id_from_scalar<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    struct ZoneIdVisitor;

    impl Visitor<'_> for ZoneIdVisitor {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a zone id string or integer")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }
    }

    deserializer.deserialize_any(ZoneIdVisitor)
}

/// Text of a legacy top-level scalar; integers count as text.
fn legacy_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

/// Zone records keyed by domain, in insertion order.
///
/// Serialized as a mapping `domain -> record`; the mapping key wins over any
/// `domain` field stored inside the record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZoneSet(Vec<ZoneRecord>);

impl ZoneSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, replacing an existing one for the same domain in place.
    pub fn insert(&mut self, record: ZoneRecord) {
        match self.0.iter_mut().find(|z| z.domain == record.domain) {
            Some(existing) => *existing = record,
            None => self.0.push(record),
        }
    }

    pub fn get(&self, domain: &str) -> Option<&ZoneRecord> {
        self.0.iter().find(|z| z.domain == domain)
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.get(domain).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ZoneRecord> {
        self.0.iter()
    }

    pub fn domains(&self) -> Vec<String> {
        self.0.iter().map(|z| z.domain.clone()).collect()
    }

    /// Overwrite same-domain entries with `other`'s and append the rest.
    pub fn merge(&mut self, other: ZoneSet) {
        for record in other {
            self.insert(record);
        }
    }
}

impl IntoIterator for ZoneSet {
    type Item = ZoneRecord;
    type IntoIter = std::vec::IntoIter<ZoneRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ZoneSet {
    type Item = &'a ZoneRecord;
    type IntoIter = std::slice::Iter<'a, ZoneRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<ZoneRecord> for ZoneSet {
    fn from_iter<I: IntoIterator<Item = ZoneRecord>>(iter: I) -> Self {
        let mut zones = ZoneSet::new();
        for record in iter {
            zones.insert(record);
        }
        zones
    }
}

impl Serialize for ZoneSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for record in &self.0 {
            map.serialize_entry(&record.domain, record)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ZoneSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ZoneSetVisitor;

        impl<'de> Visitor<'de> for ZoneSetVisitor {
            type Value = ZoneSet;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of domain to zone record")
            }

            fn visit_unit<E: de::Error>(self) -> Result<ZoneSet, E> {
                Ok(ZoneSet::new())
            }

            fn visit_none<E: de::Error>(self) -> Result<ZoneSet, E> {
                Ok(ZoneSet::new())
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<ZoneSet, A::Error> {
                let mut zones = ZoneSet::new();
                while let Some((domain, mut record)) = map.next_entry::<String, ZoneRecord>()? {
                    record.domain = domain;
                    zones.insert(record);
                }
                Ok(zones)
            }
        }

        deserializer.deserialize_any(ZoneSetVisitor)
    }
}

/// Canonical settings shape. Only this shape is ever written back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsDocument {
    pub zones: ZoneSet,
    /// Top-level keys this crate does not interpret, kept across saves.
    pub extra: Mapping,
}

impl SettingsDocument {
    pub fn with_zones(zones: ZoneSet) -> Self {
        Self {
            zones,
            extra: Mapping::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        !self.zones.is_empty()
    }

    /// Shallow merge: `partial`'s zones overwrite same-domain zones, its other
    /// top-level keys overwrite ours.
    pub fn merge(&mut self, partial: SettingsDocument) {
        self.zones.merge(partial.zones);
        for (key, value) in partial.extra {
            self.extra.insert(key, value);
        }
    }

    /// Normalize a parsed YAML document. A legacy single-zone file
    /// (`zone_id` + `domain` at the top level, no `zones`) becomes a one-entry
    /// zone set; the legacy keys never survive normalization.
    pub fn from_yaml(value: Value) -> Result<Self, serde_yaml::Error> {
        let mut extra = match value {
            Value::Null => return Ok(Self::default()),
            Value::Mapping(map) => map,
            other => {
                return Err(de::Error::invalid_type(
                    unexpected(&other),
                    &"a mapping at the top level",
                ));
            }
        };

        let zones_value = extra.remove(ZONES_KEY);
        let legacy_zone_id = extra.remove(LEGACY_ZONE_ID_KEY);
        let legacy_domain = extra.remove(LEGACY_DOMAIN_KEY);

        let has_legacy = legacy_zone_id.is_some() || legacy_domain.is_some();

        let zones = match zones_value {
            Some(value) => {
                if has_legacy {
                    warn!("settings have both `zones` and legacy `zone_id`/`domain`; ignoring the legacy keys");
                }
                serde_yaml::from_value(value)?
            }
            None => {
                let zone_id = legacy_text(legacy_zone_id.as_ref());
                let domain = match legacy_domain.as_ref() {
                    Some(Value::String(d)) if !d.is_empty() => Some(d.clone()),
                    _ => None,
                };
                match (zone_id, domain) {
                    (Some(zone_id), Some(domain)) => {
                        std::iter::once(ZoneRecord::new(domain, zone_id)).collect()
                    }
                    _ => {
                        if has_legacy {
                            warn!(
                                zone_id = ?legacy_zone_id,
                                domain = ?legacy_domain,
                                "legacy settings need a text `domain` and a text or integer `zone_id`; treating as not connected"
                            );
                        }
                        ZoneSet::new()
                    }
                }
            }
        };

        Ok(Self { zones, extra })
    }

    pub fn to_yaml(&self) -> Result<Value, serde_yaml::Error> {
        let mut map = Mapping::new();
        if !self.zones.is_empty() {
            map.insert(ZONES_KEY.into(), serde_yaml::to_value(&self.zones)?);
        }
        for (key, value) in &self.extra {
            map.insert(key.clone(), value.clone());
        }
        Ok(Value::Mapping(map))
    }
}

fn unexpected(value: &Value) -> de::Unexpected<'_> {
    match value {
        Value::Bool(b) => de::Unexpected::Bool(*b),
        Value::String(s) => de::Unexpected::Str(s),
        Value::Sequence(_) => de::Unexpected::Seq,
        _ => de::Unexpected::Other("scalar"),
    }
}
