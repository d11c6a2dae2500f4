//! Reconciliation engine: pure application of snapshots and deltas.
//!
//! These functions fold server payloads onto cached or live data. They have
//! no side effects and no knowledge of the connection, so the full rule set
//! is unit-tested directly. Delta batches apply strictly in array order;
//! each change record's own `version.seq` advances the running sequence, and
//! the outer message's version is authoritative once the batch completes.

use serde_json::Value;

use crate::protocol::Change;
use crate::state::LiveData;

/// Shallow-merge `change`'s fields onto `target`, replacing `target`
/// outright when either side is not an object.
fn merge_shallow(target: &mut Value, change: &Value) {
    match (target.as_object_mut(), change.as_object()) {
        (Some(target_map), Some(change_map)) => {
            for (field, value) in change_map {
                target_map.insert(field.clone(), value.clone());
            }
        },
        _ => *target = change.clone(),
    }
}

/// Primary-key value of a collection element, when present.
fn element_id<'a>(element: &'a Value, primary_key: &str) -> Option<&'a Value> {
    element.get(primary_key)
}

/// Entity `added`: replaces current data unconditionally.
pub fn entity_added(current: &mut Option<Value>, entity: Value) {
    *current = Some(entity);
}

/// Entity `updated`: shallow-merge onto current data. A no-op when there is
/// nothing to merge onto (the entity was removed or never materialized).
pub fn entity_updated(current: &mut Option<Value>, change: &Value) {
    if let Some(existing) = current {
        merge_shallow(existing, change);
    }
}

/// Entity `removed`: the subscription stays active with empty data, so a
/// later `added` can repopulate it.
pub fn entity_removed(current: &mut Option<Value>) {
    *current = None;
}

/// Collection `added`: appends to the end; order is server-driven.
pub fn collection_added(items: &mut Vec<Value>, entity: Value) {
    items.push(entity);
}

/// Collection `updated`: merge onto the element whose primary key equals
/// `id`, position preserved. A no-op when no element matches.
pub fn collection_updated(items: &mut [Value], primary_key: &str, id: &Value, change: &Value) {
    if let Some(element) = items
        .iter_mut()
        .find(|element| element_id(element, primary_key) == Some(id))
    {
        merge_shallow(element, change);
    }
}

/// Collection `removed`: drops the element whose primary key equals `id`.
pub fn collection_removed(items: &mut Vec<Value>, primary_key: &str, id: &Value) {
    items.retain(|element| element_id(element, primary_key) != Some(id));
}

/// Apply one change record to entity or collection data.
pub fn apply_change(data: &mut LiveData, primary_key: &str, change: &Change) {
    match (data, change) {
        (LiveData::Entity(current), Change::Added { entity, .. }) => {
            entity_added(current, entity.clone());
        },
        (LiveData::Entity(current), Change::Updated { change, .. }) => {
            entity_updated(current, change);
        },
        (LiveData::Entity(current), Change::Removed { .. }) => {
            entity_removed(current);
        },
        (LiveData::Collection(items), Change::Added { entity, .. }) => {
            collection_added(items, entity.clone());
        },
        (LiveData::Collection(items), Change::Updated { id, change, .. }) => {
            collection_updated(items, primary_key, id, change);
        },
        (LiveData::Collection(items), Change::Removed { id, .. }) => {
            collection_removed(items, primary_key, id);
        },
    }
}

/// Fold a delta batch onto existing data in array order, advancing the
/// running sequence from each record's version. The caller overwrites the
/// result with the outer message's version afterwards; tracking the running
/// value here keeps a partially-applied batch resumable from the right spot.
pub fn apply_delta(
    data: &mut LiveData,
    primary_key: &str,
    changes: &[Change],
    last_seq: &mut Option<u64>,
) {
    for change in changes {
        apply_change(data, primary_key, change);
        *last_seq = Some(change.version().seq);
    }
}
