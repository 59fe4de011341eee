//! Wire-format codec for the subset of the description language this core
//! round-trips: address ranges, prototypes, and parameter entries.
//! Grounded in `ghidra_headless.rs`, which spoke JSON-RPC to an external
//! Ghidra process via `serde_json::Value` messages; this module reuses
//! that tagged-object convention for a handful of decompiler-internal
//! elements instead of RPC requests.

use crate::address::{Address, Range, RangeList};
use crate::param::{ParamEntry, TypeClass};
use crate::proto::ProtoSource;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("unexpected tag `{0}`, expected `{1}`")]
    WrongTag(String, &'static str),
    #[error("malformed value: {0}")]
    Malformed(String),
}

fn require<'a>(obj: &'a Value, field: &'static str) -> Result<&'a Value, WireError> {
    obj.get(field).ok_or(WireError::MissingField(field))
}

fn require_tag(obj: &Value, expected: &'static str) -> Result<(), WireError> {
    let tag = obj.get("tag").and_then(Value::as_str).ok_or(WireError::MissingField("tag"))?;
    if tag != expected {
        return Err(WireError::WrongTag(tag.to_string(), expected));
    }
    Ok(())
}

pub fn encode_range(range: &Range) -> Value {
    json!({
        "tag": "range",
        "space": range.space_index,
        "first": range.first,
        "last": range.last,
    })
}

pub fn decode_range(value: &Value) -> Result<Range, WireError> {
    require_tag(value, "range")?;
    Ok(Range {
        space_index: require(value, "space")?.as_u64().ok_or_else(|| WireError::Malformed("space".into()))? as u32,
        first: require(value, "first")?.as_u64().ok_or_else(|| WireError::Malformed("first".into()))?,
        last: require(value, "last")?.as_u64().ok_or_else(|| WireError::Malformed("last".into()))?,
    })
}

pub fn encode_rangelist(list: &RangeList) -> Value {
    json!({
        "tag": "rangelist",
        "ranges": list.iter().map(encode_range).collect::<Vec<_>>(),
    })
}

pub fn decode_rangelist(value: &Value) -> Result<RangeList, WireError> {
    require_tag(value, "rangelist")?;
    let mut list = RangeList::new();
    let ranges = require(value, "ranges")?.as_array().ok_or_else(|| WireError::Malformed("ranges".into()))?;
    for r in ranges {
        let range = decode_range(r)?;
        list.insert_range(range.space_index, range.first, range.last);
    }
    Ok(list)
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct WirePentry {
    tag: String,
    space: u32,
    offset: u64,
    size: u32,
    minsize: u32,
    alignment: u32,
    type_class: TypeClass,
    group: u32,
    join_group: Option<u32>,
}

pub fn encode_pentry(entry: &ParamEntry) -> Value {
    serde_json::to_value(WirePentry {
        tag: "pentry".to_string(),
        space: entry.space_index,
        offset: entry.offset,
        size: entry.size,
        minsize: entry.minsize,
        alignment: entry.alignment,
        type_class: entry.type_class,
        group: entry.group,
        join_group: entry.join_group,
    })
    .expect("ParamEntry always serializes")
}

pub fn decode_pentry(value: &Value) -> Result<ParamEntry, WireError> {
    require_tag(value, "pentry")?;
    let wire: WirePentry = serde_json::from_value(value.clone()).map_err(|e| WireError::Malformed(e.to_string()))?;
    Ok(ParamEntry {
        space_index: wire.space,
        offset: wire.offset,
        size: wire.size,
        minsize: wire.minsize,
        alignment: wire.alignment,
        type_class: wire.type_class,
        group: wire.group,
        join_group: wire.join_group,
    })
}

#[derive(Debug, Serialize, Deserialize)]
struct WireReturnsym {
    tag: String,
    space: u32,
    offset: u64,
    size: u32,
}

pub fn encode_returnsym(addr: &Address, size: u32) -> Result<Value, WireError> {
    let (space, offset) = match (addr.space_index(), addr.offset()) {
        (Some(s), Some(o)) => (s, o),
        _ => return Err(WireError::Malformed("returnsym requires a concrete address".into())),
    };
    Ok(serde_json::to_value(WireReturnsym { tag: "returnsym".to_string(), space, offset, size }).unwrap())
}

pub fn decode_returnsym(value: &Value) -> Result<(Address, u32), WireError> {
    require_tag(value, "returnsym")?;
    let wire: WireReturnsym = serde_json::from_value(value.clone()).map_err(|e| WireError::Malformed(e.to_string()))?;
    Ok((Address::new(wire.space, wire.offset), wire.size))
}

/// Full prototype element: a model name reference, the source kind, and
/// the already-resolved pentries (this core never re-runs assignment on
/// decode — it trusts the encoded storage verbatim).
pub fn encode_prototype(model_name: &str, source: ProtoSource, params: &[ParamEntry]) -> Value {
    json!({
        "tag": "prototype",
        "model": model_name,
        "source": match source { ProtoSource::Symbol => "symbol", ProtoSource::Internal => "internal" },
        "params": params.iter().map(encode_pentry).collect::<Vec<_>>(),
    })
}

pub fn decode_prototype(value: &Value) -> Result<(String, ProtoSource, Vec<ParamEntry>), WireError> {
    require_tag(value, "prototype")?;
    let model = require(value, "model")?.as_str().ok_or_else(|| WireError::Malformed("model".into()))?.to_string();
    let source = match require(value, "source")?.as_str() {
        Some("symbol") => ProtoSource::Symbol,
        Some("internal") => ProtoSource::Internal,
        _ => return Err(WireError::Malformed("source".into())),
    };
    let params_arr = require(value, "params")?.as_array().ok_or_else(|| WireError::Malformed("params".into()))?;
    let params = params_arr.iter().map(decode_pentry).collect::<Result<Vec<_>, _>>()?;
    Ok((model, source, params))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_round_trips() {
        let range = Range { space_index: 1, first: 0x100, last: 0x200 };
        let encoded = encode_range(&range);
        let decoded = decode_range(&encoded).unwrap();
        assert_eq!(range, decoded);
    }

    #[test]
    fn rangelist_round_trips_after_merge() {
        let mut list = RangeList::new();
        list.insert_range(1, 0, 10);
        list.insert_range(1, 11, 20);
        let encoded = encode_rangelist(&list);
        let decoded = decode_rangelist(&encoded).unwrap();
        let decoded_ranges: Vec<_> = decoded.iter().copied().collect();
        let original_ranges: Vec<_> = list.iter().copied().collect();
        assert_eq!(decoded_ranges, original_ranges);
    }

    #[test]
    fn pentry_round_trips() {
        let entry = ParamEntry { space_index: 1, offset: 0x10, size: 8, minsize: 4, alignment: 4, type_class: TypeClass::Float, group: 2, join_group: Some(1) };
        let encoded = encode_pentry(&entry);
        let decoded = decode_pentry(&encoded).unwrap();
        assert_eq!(entry, decoded);
    }

    #[test]
    fn wrong_tag_is_rejected() {
        let value = json!({"tag": "range", "space": 1, "first": 0, "last": 1});
        assert!(decode_pentry(&value).is_err());
    }

    #[test]
    fn prototype_round_trips_params_and_source() {
        let params = vec![ParamEntry::exclusion(1, 0, 8, 0)];
        let encoded = encode_prototype("test-cc", ProtoSource::Internal, &params);
        let (model, source, decoded_params) = decode_prototype(&encoded).unwrap();
        assert_eq!(model, "test-cc");
        assert_eq!(source, ProtoSource::Internal);
        assert_eq!(decoded_params, params);
    }
}
