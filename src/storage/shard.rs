//! User-based shard routing.
//!
//! Tracked shifts are spread over N request stores by user id. Request rows
//! live in the directory shard (shard 0) so a request can be looked up
//! without knowing which users it touched.

use futures::future::try_join_all;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::database::{
    DatabaseError, RequestStatus, RequestStore, ShiftRequest, TrackedShift,
};
use crate::reconcile::ShiftOutcome;

/// Index of the shard that stores request rows.
pub const DIRECTORY_SHARD: usize = 0;

/// Maps user ids onto shard indexes.
///
/// The mapping uses the first 8 bytes of SHA-256 of the user id, read
/// big-endian, modulo the shard count. It does not depend on the process,
/// platform or std hasher seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardRouter {
    shards: usize,
}

impl ShardRouter {
    /// Create a router over `shards` shards.
    pub fn new(shards: usize) -> Result<Self, DatabaseError> {
        if shards == 0 {
            return Err(DatabaseError::NoShards);
        }
        Ok(Self { shards })
    }

    /// Number of shards.
    pub fn shard_count(&self) -> usize {
        self.shards
    }

    /// Shard index owning `user_id`.
    pub fn shard_for(&self, user_id: &str) -> usize {
        let digest = Sha256::digest(user_id.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        (u64::from_be_bytes(prefix) % self.shards as u64) as usize
    }
}

/// A set of request stores addressed through a [`ShardRouter`].
#[derive(Debug, Clone)]
pub struct ShardedStore {
    router: ShardRouter,
    shards: Vec<RequestStore>,
}

impl ShardedStore {
    /// Wrap already-open stores. Their order defines the shard indexes.
    pub fn new(shards: Vec<RequestStore>) -> Result<Self, DatabaseError> {
        let router = ShardRouter::new(shards.len())?;
        Ok(Self { router, shards })
    }

    /// Open one store per URL, in order.
    pub async fn connect(urls: &[String]) -> Result<Self, DatabaseError> {
        let shards = try_join_all(urls.iter().map(|url| RequestStore::connect(url))).await?;
        Self::new(shards)
    }

    pub fn router(&self) -> ShardRouter {
        self.router
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// All shards, in index order.
    pub fn shards(&self) -> &[RequestStore] {
        &self.shards
    }

    /// The shard holding request rows.
    pub fn directory(&self) -> &RequestStore {
        &self.shards[DIRECTORY_SHARD]
    }

    /// The shard holding tracked shifts for `user_id`.
    pub fn shard_for_user(&self, user_id: &str) -> &RequestStore {
        &self.shards[self.router.shard_for(user_id)]
    }

    /// Run migrations on every shard.
    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        for (index, shard) in self.shards.iter().enumerate() {
            shard.run_migrations().await?;
            tracing::debug!(shard = index, "Shard migrated");
        }
        Ok(())
    }

    pub async fn insert_request(&self, request: &ShiftRequest) -> Result<(), DatabaseError> {
        self.directory().insert_request(request).await
    }

    pub async fn get_request(&self, id: Uuid) -> Result<Option<ShiftRequest>, DatabaseError> {
        self.directory().get_request(id).await
    }

    pub async fn update_request_status(
        &self,
        id: Uuid,
        next: RequestStatus,
    ) -> Result<ShiftRequest, DatabaseError> {
        self.directory().update_request_status(id, next).await
    }

    pub async fn list_requests_by_status(
        &self,
        statuses: &[RequestStatus],
    ) -> Result<Vec<ShiftRequest>, DatabaseError> {
        self.directory().list_requests_by_status(statuses).await
    }

    /// Store a tracked shift in its user's shard.
    pub async fn insert_shift(&self, tracked: &TrackedShift) -> Result<(), DatabaseError> {
        self.shard_for_user(&tracked.shift.user_id)
            .insert_shift(tracked)
            .await
    }

    /// Delete a tracked shift from its user's shard.
    pub async fn delete_shift(&self, tracked: &TrackedShift) -> Result<bool, DatabaseError> {
        self.shard_for_user(&tracked.shift.user_id)
            .delete_shift(tracked.id)
            .await
    }

    /// Gather a request's shifts from every shard, ordered by position.
    pub async fn shifts_for_request(
        &self,
        request_id: Uuid,
    ) -> Result<Vec<TrackedShift>, DatabaseError> {
        let per_shard = try_join_all(
            self.shards
                .iter()
                .map(|shard| shard.shifts_for_request(request_id)),
        )
        .await?;

        let mut shifts: Vec<TrackedShift> = per_shard.into_iter().flatten().collect();
        shifts.sort_by_key(|tracked| tracked.position);
        Ok(shifts)
    }

    pub async fn record_shift_outcome(
        &self,
        tracked: &TrackedShift,
        outcome: &ShiftOutcome,
    ) -> Result<TrackedShift, DatabaseError> {
        self.shard_for_user(&tracked.shift.user_id)
            .record_shift_outcome(tracked, outcome)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shift::Shift;
    use tempfile::TempDir;

    async fn temp_sharded(count: usize) -> (TempDir, ShardedStore) {
        let dir = tempfile::tempdir().unwrap();
        let urls: Vec<String> = (0..count)
            .map(|i| format!("sqlite://{}", dir.path().join(format!("shard-{i}.db")).display()))
            .collect();
        let store = ShardedStore::connect(&urls).await.unwrap();
        store.run_migrations().await.unwrap();
        (dir, store)
    }

    #[test]
    fn test_router_rejects_zero_shards() {
        assert!(matches!(ShardRouter::new(0), Err(DatabaseError::NoShards)));
    }

    #[test]
    fn test_router_single_shard() {
        let router = ShardRouter::new(1).unwrap();
        for user in ["a", "b", "user-1", ""] {
            assert_eq!(router.shard_for(user), 0);
        }
    }

    #[test]
    fn test_router_is_pinned() {
        let router = ShardRouter::new(4).unwrap();
        assert_eq!(router.shard_for("user-1"), 2);
        assert_eq!(router.shard_for("user-2"), 3);
        assert_eq!(router.shard_for("alice"), 3);
        assert_eq!(router.shard_for("bob"), 2);

        let router = ShardRouter::new(3).unwrap();
        assert_eq!(router.shard_for("user-1"), 0);
        assert_eq!(router.shard_for("user-2"), 1);
    }

    #[test]
    fn test_router_stays_in_range() {
        let router = ShardRouter::new(7).unwrap();
        for i in 0..500 {
            assert!(router.shard_for(&format!("user-{i}")) < 7);
        }
    }

    #[tokio::test]
    async fn test_empty_url_list_is_rejected() {
        assert!(matches!(
            ShardedStore::connect(&[]).await,
            Err(DatabaseError::NoShards)
        ));
    }

    #[tokio::test]
    async fn test_shift_lands_in_user_shard_and_request_in_directory() {
        let (_dir, store) = temp_sharded(4).await;
        let request = ShiftRequest::new(1);
        store.insert_request(&request).await.unwrap();

        // user-1 routes to shard 2 with four shards.
        let tracked = TrackedShift::new(
            request.id,
            0,
            Shift::new("acme", "user-1", "09:00", "17:00", "create"),
        );
        store.insert_shift(&tracked).await.unwrap();

        for (index, shard) in store.shards().iter().enumerate() {
            let held = shard.shifts_for_request(request.id).await.unwrap();
            assert_eq!(held.len(), usize::from(index == 2), "shard {index}");

            let has_request = shard.get_request(request.id).await.unwrap().is_some();
            assert_eq!(has_request, index == DIRECTORY_SHARD, "shard {index}");
        }
    }

    #[tokio::test]
    async fn test_shifts_for_request_merges_shards_in_order() {
        let (_dir, store) = temp_sharded(4).await;
        let request_id = Uuid::new_v4();
        let users = ["user-1", "user-2", "alice", "bob", "carol"];
        for (position, user) in users.iter().enumerate().rev() {
            let tracked = TrackedShift::new(
                request_id,
                position as u32,
                Shift::new("acme", *user, "09:00", "17:00", "create"),
            );
            store.insert_shift(&tracked).await.unwrap();
        }

        let merged = store.shifts_for_request(request_id).await.unwrap();
        let order: Vec<_> = merged.iter().map(|t| t.shift.user_id.as_str()).collect();
        assert_eq!(order, users);
    }
}
