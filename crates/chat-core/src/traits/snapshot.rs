//! Snapshot contract for mutable field values
//!
//! A snapshot is an independent copy: mutating the original afterwards never
//! shows through it. Owned data gets this from `Clone`; types holding shared
//! handles must copy what they point to.

use crate::value_objects::{Intents, Snowflake};
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// Produce a value that shares no mutable state with `self`
pub trait Snapshot: Sized {
    fn snapshot(&self) -> Self;
}

macro_rules! snapshot_by_clone {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Snapshot for $ty {
                #[inline]
                fn snapshot(&self) -> Self {
                    self.clone()
                }
            }
        )*
    };
}

snapshot_by_clone!(
    bool, char, u8, u16, u32, u64, i8, i16, i32, i64, f32, f64, usize, String,
    Snowflake, Intents, chrono::DateTime<chrono::Utc>, serde_json::Value,
);

impl<T: Snapshot> Snapshot for Option<T> {
    fn snapshot(&self) -> Self {
        self.as_ref().map(Snapshot::snapshot)
    }
}

impl<T: Snapshot> Snapshot for Vec<T> {
    fn snapshot(&self) -> Self {
        self.iter().map(Snapshot::snapshot).collect()
    }
}

impl<K: Clone + Eq + Hash, V: Snapshot> Snapshot for HashMap<K, V> {
    fn snapshot(&self) -> Self {
        self.iter().map(|(k, v)| (k.clone(), v.snapshot())).collect()
    }
}

impl<K: Clone + Ord, V: Snapshot> Snapshot for BTreeMap<K, V> {
    fn snapshot(&self) -> Self {
        self.iter().map(|(k, v)| (k.clone(), v.snapshot())).collect()
    }
}
