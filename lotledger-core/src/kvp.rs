//! Hierarchical key/value slots attached to engine entities
//!
//! A [`KvpFrame`] maps keys to [`KvpValue`]s, where a value may itself be a
//! frame. Paths use `/` separators (`"lot-mgmt/next-id"`); a leading slash is
//! ignored. Lists of frames ("bags") cross-reference other entities, e.g. the
//! `lot-split` bag that links the fragments of a split broken up during lot
//! assignment.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use lotledger_math::Numeric;
use serde::{Deserialize, Serialize};

use crate::guid::Guid;

/// A single slot value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum KvpValue {
    /// Integer
    Int64(i64),
    /// Exact rational
    Numeric(Numeric),
    /// Text
    String(String),
    /// Entity reference
    Guid(Guid),
    /// Point in time
    Timestamp(DateTime<Utc>),
    /// Ordered list
    List(Vec<KvpValue>),
    /// Nested frame
    Frame(KvpFrame),
}

impl KvpValue {
    /// Integer payload
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            KvpValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Text payload
    pub fn as_str(&self) -> Option<&str> {
        match self {
            KvpValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// GUID payload
    pub fn as_guid(&self) -> Option<Guid> {
        match self {
            KvpValue::Guid(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric payload
    pub fn as_numeric(&self) -> Option<&Numeric> {
        match self {
            KvpValue::Numeric(v) => Some(v),
            _ => None,
        }
    }

    /// Timestamp payload
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            KvpValue::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    /// Frame payload
    pub fn as_frame(&self) -> Option<&KvpFrame> {
        match self {
            KvpValue::Frame(v) => Some(v),
            _ => None,
        }
    }
}

/// An ordered map of slot names to values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KvpFrame {
    slots: BTreeMap<String, KvpValue>,
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|part| !part.is_empty()).collect()
}

impl KvpFrame {
    /// Create an empty frame
    pub fn new() -> Self {
        Self::default()
    }

    /// True when there are no slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Top-level keys in order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// Look up a value by path
    pub fn get_path(&self, path: &str) -> Option<&KvpValue> {
        let parts = split_path(path);
        let (last, parents) = parts.split_last()?;
        let mut frame = self;
        for part in parents {
            frame = frame.slots.get(*part)?.as_frame()?;
        }
        frame.slots.get(*last)
    }

    /// Store a value at a path, creating intermediate frames
    ///
    /// A non-frame value sitting where an intermediate frame is needed is
    /// replaced.
    pub fn set_path(&mut self, path: &str, value: KvpValue) {
        let parts = split_path(path);
        let Some((last, parents)) = parts.split_last() else {
            return;
        };
        let mut frame = self;
        for part in parents {
            let slot = frame
                .slots
                .entry((*part).to_string())
                .or_insert_with(|| KvpValue::Frame(KvpFrame::new()));
            if !matches!(slot, KvpValue::Frame(_)) {
                *slot = KvpValue::Frame(KvpFrame::new());
            }
            frame = match slot {
                KvpValue::Frame(inner) => inner,
                _ => return,
            };
        }
        frame.slots.insert((*last).to_string(), value);
    }

    /// Remove and return the value at a path; emptied parent frames are pruned
    pub fn remove_path(&mut self, path: &str) -> Option<KvpValue> {
        let parts = split_path(path);
        Self::remove_parts(self, &parts)
    }

    fn remove_parts(frame: &mut KvpFrame, parts: &[&str]) -> Option<KvpValue> {
        match parts {
            [] => None,
            [last] => frame.slots.remove(*last),
            [first, rest @ ..] => {
                let (removed, now_empty) = match frame.slots.get_mut(*first) {
                    Some(KvpValue::Frame(inner)) => {
                        let removed = Self::remove_parts(inner, rest);
                        (removed, inner.is_empty())
                    }
                    _ => return None,
                };
                if now_empty {
                    frame.slots.remove(*first);
                }
                removed
            }
        }
    }

    /// Integer at a path
    pub fn get_i64(&self, path: &str) -> Option<i64> {
        self.get_path(path).and_then(KvpValue::as_i64)
    }

    /// Text at a path
    pub fn get_string(&self, path: &str) -> Option<&str> {
        self.get_path(path).and_then(KvpValue::as_str)
    }

    /// GUID at a path
    pub fn get_guid(&self, path: &str) -> Option<Guid> {
        self.get_path(path).and_then(KvpValue::as_guid)
    }

    /// Numeric at a path
    pub fn get_numeric(&self, path: &str) -> Option<&Numeric> {
        self.get_path(path).and_then(KvpValue::as_numeric)
    }

    /// Timestamp at a path
    pub fn get_timestamp(&self, path: &str) -> Option<DateTime<Utc>> {
        self.get_path(path).and_then(KvpValue::as_timestamp)
    }

    /// Store text, or remove the slot when `value` is empty
    pub fn set_string(&mut self, path: &str, value: &str) {
        if value.is_empty() {
            self.remove_path(path);
        } else {
            self.set_path(path, KvpValue::String(value.to_string()));
        }
    }

    /// The frames stored in the bag at `path`
    pub fn bag(&self, path: &str) -> Vec<&KvpFrame> {
        match self.get_path(path) {
            Some(KvpValue::List(items)) => items.iter().filter_map(KvpValue::as_frame).collect(),
            Some(KvpValue::Frame(frame)) => vec![frame],
            _ => Vec::new(),
        }
    }

    fn take_bag(&mut self, path: &str) -> Vec<KvpValue> {
        match self.remove_path(path) {
            Some(KvpValue::List(items)) => items,
            Some(frame @ KvpValue::Frame(_)) => vec![frame],
            _ => Vec::new(),
        }
    }

    /// Append a frame to the bag at `path`
    pub fn bag_add(&mut self, path: &str, entry: KvpFrame) {
        let mut items = self.take_bag(path);
        items.push(KvpValue::Frame(entry));
        self.set_path(path, KvpValue::List(items));
    }

    /// Index of the first bag frame whose `guid_name` slot equals `guid`
    pub fn bag_find_by_guid(&self, path: &str, guid_name: &str, guid: Guid) -> Option<usize> {
        self.bag(path)
            .iter()
            .position(|frame| frame.get_guid(guid_name) == Some(guid))
    }

    /// Remove the bag frame at `index`; an emptied bag is removed entirely
    pub fn bag_remove_frame(&mut self, path: &str, index: usize) -> Option<KvpFrame> {
        let mut items = self.take_bag(path);
        let removed = if index < items.len() {
            match items.remove(index) {
                KvpValue::Frame(frame) => Some(frame),
                _ => None,
            }
        } else {
            None
        };
        if !items.is_empty() {
            self.set_path(path, KvpValue::List(items));
        }
        removed
    }

    /// Append every frame of `source`'s bag at `path` to this frame's bag
    pub fn bag_merge(&mut self, path: &str, source: &KvpFrame) {
        for entry in source.bag(path) {
            self.bag_add(path, entry.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_paths() {
        let mut frame = KvpFrame::new();
        frame.set_path("/lot-mgmt/next-id", KvpValue::Int64(3));
        frame.set_path("lot-mgmt/gains-acct/USD", KvpValue::Guid(Guid::null()));

        assert_eq!(frame.get_i64("lot-mgmt/next-id"), Some(3));
        assert_eq!(frame.get_guid("/lot-mgmt/gains-acct/USD"), Some(Guid::null()));
        assert_eq!(frame.get_i64("lot-mgmt/missing"), None);
        assert_eq!(frame.keys().collect::<Vec<_>>(), vec!["lot-mgmt"]);
    }

    #[test]
    fn test_remove_prunes_empty_parents() {
        let mut frame = KvpFrame::new();
        frame.set_path("a/b/c", KvpValue::Int64(1));
        assert_eq!(frame.remove_path("a/b/c"), Some(KvpValue::Int64(1)));
        assert!(frame.is_empty());
    }

    #[test]
    fn test_set_string_empty_removes() {
        let mut frame = KvpFrame::new();
        frame.set_string("notes", "hello");
        assert_eq!(frame.get_string("notes"), Some("hello"));
        frame.set_string("notes", "");
        assert!(frame.get_path("notes").is_none());
    }

    #[test]
    fn test_bag_operations() {
        let a = Guid::new();
        let b = Guid::new();
        let mut frame = KvpFrame::new();
        for guid in [a, b] {
            let mut entry = KvpFrame::new();
            entry.set_path("peer_guid", KvpValue::Guid(guid));
            frame.bag_add("lot-split", entry);
        }

        assert_eq!(frame.bag("lot-split").len(), 2);
        assert_eq!(frame.bag_find_by_guid("lot-split", "peer_guid", b), Some(1));
        assert_eq!(frame.bag_find_by_guid("lot-split", "peer_guid", Guid::null()), None);

        let removed = frame.bag_remove_frame("lot-split", 0).unwrap();
        assert_eq!(removed.get_guid("peer_guid"), Some(a));
        frame.bag_remove_frame("lot-split", 0);
        assert!(frame.get_path("lot-split").is_none());
    }

    #[test]
    fn test_bag_merge() {
        let mut left = KvpFrame::new();
        let mut right = KvpFrame::new();
        let mut entry = KvpFrame::new();
        entry.set_path("peer_guid", KvpValue::Guid(Guid::new()));
        right.bag_add("lot-split", entry.clone());
        right.bag_add("lot-split", entry);

        left.bag_merge("lot-split", &right);
        assert_eq!(left.bag("lot-split").len(), 2);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut frame = KvpFrame::new();
        frame.set_path("gncInvoice/invoice-guid", KvpValue::Guid(Guid::new()));
        frame.set_path("title", KvpValue::String("Lot 1".into()));
        let json = serde_json::to_string(&frame).unwrap();
        let back: KvpFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(back, frame);
    }
}
