//! Optimistic inventory quantity edits.
//!
//! The edit is applied to every cached copy of the item before the remote
//! call goes out. If the call fails, the cache is put back exactly as it was.
//! Concurrent edits of one item are not coalesced: the last write the server
//! sees wins.

use secrecy::SecretString;
use sweetshop_core::{Sweet, SweetId};
use tracing::{instrument, warn};

use crate::api::{ApiError, ShopBackend};
use crate::catalog::{CachedSlice, CatalogCache, CatalogSnapshot};

/// A new available quantity for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantityEdit {
    pub sweet_id: SweetId,
    pub quantity: u32,
}

/// The cache contents from before an optimistic edit.
#[derive(Debug, Clone, PartialEq)]
pub struct Rollback {
    previous: CatalogSnapshot,
}

impl Rollback {
    /// The snapshot that will be restored.
    #[must_use]
    pub const fn snapshot(&self) -> &CatalogSnapshot {
        &self.previous
    }

    /// Consume the rollback, yielding the snapshot to restore.
    #[must_use]
    pub fn into_snapshot(self) -> CatalogSnapshot {
        self.previous
    }
}

/// Apply `edit` to every cached copy of the item.
///
/// Returns the optimistic snapshot and the rollback that undoes it. Slices
/// that don't contain the item are carried over untouched, and every slice
/// keeps its fetch time.
#[must_use]
pub fn apply_quantity_edit(
    snapshot: &CatalogSnapshot,
    edit: QuantityEdit,
) -> (CatalogSnapshot, Rollback) {
    let optimistic = snapshot
        .iter()
        .map(|(filter, slice)| {
            let items = slice
                .items
                .iter()
                .map(|item| with_quantity(item, edit))
                .collect();
            (
                filter.clone(),
                CachedSlice {
                    items,
                    fetched_at: slice.fetched_at,
                },
            )
        })
        .collect();

    (
        optimistic,
        Rollback {
            previous: snapshot.clone(),
        },
    )
}

fn with_quantity(item: &Sweet, edit: QuantityEdit) -> Sweet {
    let mut item = item.clone();
    if item.id == edit.sweet_id {
        item.quantity = edit.quantity;
    }
    item
}

/// Apply `edit` to the cache, send it, and restore the cache on failure.
///
/// On success every cached slice is invalidated, as with any inventory
/// mutation, so the next read picks up the server's view.
///
/// # Errors
///
/// Returns the backend's error after the cache has been restored.
#[instrument(skip(cache, backend, token), fields(sweet_id = %edit.sweet_id, quantity = edit.quantity))]
pub async fn update_quantity(
    cache: &CatalogCache,
    backend: &dyn ShopBackend,
    token: &SecretString,
    edit: QuantityEdit,
) -> Result<Sweet, ApiError> {
    let (optimistic, rollback) = apply_quantity_edit(&cache.snapshot().await, edit);
    cache.restore(optimistic).await;

    match backend
        .set_quantity(token, edit.sweet_id, edit.quantity)
        .await
    {
        Ok(updated) => {
            cache.invalidate_all().await;
            Ok(updated)
        }
        Err(e) => {
            warn!(error = %e, "Quantity update failed, rolling back");
            cache.restore(rollback.into_snapshot()).await;
            Err(e)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use sweetshop_core::SearchFilter;

    use super::*;
    use crate::api::{Credentials, InMemoryBackend, Operation};

    fn backend() -> InMemoryBackend {
        InMemoryBackend::seeded(SecretString::from("test-signing-secret"))
    }

    async fn admin_token(backend: &InMemoryBackend) -> SecretString {
        let response = backend
            .login(&Credentials {
                email: "admin@example.com".to_string(),
                password: "password".to_string(),
            })
            .await
            .unwrap();
        SecretString::from(response.token)
    }

    async fn warm(cache: &CatalogCache, backend: &InMemoryBackend) {
        cache.fetch(backend, &SearchFilter::all()).await.unwrap();
        cache
            .fetch(backend, &SearchFilter::all().with_category("Cakes"))
            .await
            .unwrap();
        cache
            .fetch(backend, &SearchFilter::all().with_category("Frozen"))
            .await
            .unwrap();
    }

    fn quantity_in(snapshot: &CatalogSnapshot, filter: &SearchFilter, id: SweetId) -> Option<u32> {
        snapshot
            .get(filter)?
            .items
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.quantity)
    }

    #[tokio::test]
    async fn test_pure_edit_touches_every_copy() {
        let backend = backend();
        let cache = CatalogCache::default();
        warm(&cache, &backend).await;
        let before = cache.snapshot().await;

        let edit = QuantityEdit {
            sweet_id: SweetId::new(1),
            quantity: 3,
        };
        let (after, rollback) = apply_quantity_edit(&before, edit);

        let cakes = SearchFilter::all().with_category("Cakes");
        assert_eq!(quantity_in(&after, &SearchFilter::all(), edit.sweet_id), Some(3));
        assert_eq!(quantity_in(&after, &cakes, edit.sweet_id), Some(3));
        assert_eq!(
            after.get(&SearchFilter::all().with_category("Frozen")),
            before.get(&SearchFilter::all().with_category("Frozen"))
        );
        assert_eq!(rollback.snapshot(), &before);
        for (filter, slice) in &after {
            assert_eq!(slice.fetched_at, before.get(filter).unwrap().fetched_at);
        }
    }

    #[tokio::test]
    async fn test_failed_update_restores_snapshot() {
        let backend = backend();
        let cache = CatalogCache::default();
        let token = admin_token(&backend).await;
        warm(&cache, &backend).await;
        let before = cache.snapshot().await;

        backend.fail_next(
            Operation::SetQuantity,
            ApiError::Server {
                status: 500,
                message: "boom".to_string(),
            },
        );
        let result = update_quantity(
            &cache,
            &backend,
            &token,
            QuantityEdit {
                sweet_id: SweetId::new(1),
                quantity: 0,
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(cache.snapshot().await, before);
        assert_eq!(backend.sweet(SweetId::new(1)).unwrap().quantity, 15);
    }

    #[tokio::test]
    async fn test_successful_update_invalidates() {
        let backend = backend();
        let cache = CatalogCache::default();
        let token = admin_token(&backend).await;
        warm(&cache, &backend).await;

        let updated = update_quantity(
            &cache,
            &backend,
            &token,
            QuantityEdit {
                sweet_id: SweetId::new(4),
                quantity: 7,
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.quantity, 7);
        assert!(cache.snapshot().await.is_empty());

        let fresh = cache.fetch(&backend, &SearchFilter::all()).await.unwrap();
        let ice_cream = fresh.iter().find(|s| s.id == SweetId::new(4)).unwrap();
        assert_eq!(ice_cream.quantity, 7);
    }
}
