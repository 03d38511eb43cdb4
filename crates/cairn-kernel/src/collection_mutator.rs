//! Collection-level helpers shared by the slice operations.

use std::sync::Arc;

use cairn_types::{Collection, CollectionName, Slice};
use tracing::error;

use crate::command::{Message, Operation};
use crate::kernel::KernelError;

/// Returns `collection` with `slice` installed under the slice's name.
///
/// Every other slice is carried over by `Arc`, untouched.
///
/// # Errors
///
/// Returns [`KernelError::InvariantViolation`] if `collection_name` does not
/// name `collection`, or if `slice` records a different parent collection.
pub fn update_slice(
    collection_name: &CollectionName,
    collection: &Collection,
    slice: Slice,
) -> Result<Collection, KernelError> {
    if collection.name() != collection_name {
        return Err(KernelError::InvariantViolation {
            operation: None,
            collection: collection_name.clone(),
            detail: format!("snapshot is for collection '{}'", collection.name()),
        });
    }
    if slice.collection() != collection_name {
        return Err(KernelError::InvariantViolation {
            operation: None,
            collection: collection_name.clone(),
            detail: format!(
                "slice '{}' belongs to collection '{}'",
                slice.name(),
                slice.collection()
            ),
        });
    }

    let mut slices = collection.slices().clone();
    slices.insert(slice.name().clone(), Arc::new(slice));
    Ok(collection.copy_with_slices(slices))
}

/// True iff the message carries a non-empty collection name.
///
/// This checks the message shape only, not whether the collection exists.
pub fn check_collection_key_existence(message: &Message) -> bool {
    if message.collection().is_some() {
        return true;
    }
    let operation = message
        .get(crate::command::keys::OPERATION)
        .and_then(|op| op.parse::<Operation>().ok());
    error!(
        ?operation,
        "skipping invalid message because it has no collection specified"
    );
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_types::SliceState;

    fn collection() -> Collection {
        Collection::new("films")
            .with_slice(Slice::new("shard1", "films", SliceState::Active))
            .with_slice(Slice::new("shard2", "films", SliceState::Active))
    }

    #[test]
    fn update_slice_replaces_only_named_slice() {
        let original = collection();
        let updated = update_slice(
            &CollectionName::new("films"),
            &original,
            Slice::new("shard2", "films", SliceState::Inactive),
        )
        .unwrap();

        assert!(Arc::ptr_eq(
            updated.slice("shard1").unwrap(),
            original.slice("shard1").unwrap()
        ));
        assert_eq!(updated.slice("shard2").unwrap().state(), SliceState::Inactive);
        assert_eq!(updated.slice_count(), 2);
    }

    #[test]
    fn update_slice_rejects_foreign_slice() {
        let result = update_slice(
            &CollectionName::new("films"),
            &collection(),
            Slice::new("shard1", "books", SliceState::Active),
        );
        assert!(matches!(result, Err(KernelError::InvariantViolation { .. })));
    }

    #[test]
    fn update_slice_rejects_mismatched_collection_name() {
        let result = update_slice(
            &CollectionName::new("books"),
            &collection(),
            Slice::new("shard1", "books", SliceState::Active),
        );
        assert!(matches!(result, Err(KernelError::InvariantViolation { .. })));
    }

    #[test]
    fn collection_key_check_is_shape_only() {
        assert!(check_collection_key_existence(
            &Message::new().with("collection", "ghost")
        ));
        assert!(!check_collection_key_existence(
            &Message::new().with("collection", "")
        ));
        assert!(!check_collection_key_existence(
            &Message::new().with("shard", "shard1")
        ));
    }
}
