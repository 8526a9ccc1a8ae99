use futures::{StreamExt, stream::BoxStream};

use super::family::{FamilyDescriptor, RecordFamily};
use crate::store::{Store, StoreResult};

/// A store key matched to its family. Lives only for one sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedKey {
    pub key: String,
    pub family: RecordFamily,
}

/// Lazily enumerate the keys of one family.
///
/// Memory stays bounded by one store page. The stream is finite but cannot
/// be resumed mid-cursor; re-issue the scan instead.
pub fn scan<'a>(
    store: &'a dyn Store,
    descriptor: &'a FamilyDescriptor,
) -> BoxStream<'a, StoreResult<ScannedKey>> {
    let family = descriptor.family;
    store
        .scan(descriptor.pattern)
        .map(move |key| key.map(|key| ScannedKey { key, family }))
        .boxed()
}
