//! An in-process repository for tests and local runs.

use std::sync::RwLock;

use futures::future::{BoxFuture, FutureExt};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::bhajan::{Bhajan, BhajanPatch, NewBhajan};
use crate::db::Repository;
use crate::errors::RepositoryError;

#[derive(Default)]
pub struct MemoryRepository {
    /// Newest first.
    bhajans: RwLock<Vec<Bhajan>>,
    rejection: RwLock<Option<String>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Default::default()
    }

    /// Makes every later create or update fail validation with `message`.
    pub fn reject_writes(&self, message: impl Into<String>) {
        *write(&self.rejection) = Some(message.into());
    }

    pub fn len(&self) -> usize {
        read(&self.bhajans).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_writable(&self) -> Result<(), RepositoryError> {
        match &*read(&self.rejection) {
            Some(message) => Err(RepositoryError::Validation(message.clone())),
            None => Ok(()),
        }
    }
}

impl Repository for MemoryRepository {
    fn create(&self, bhajan: NewBhajan) -> BoxFuture<'_, Result<Bhajan, RepositoryError>> {
        async move {
            self.check_writable()?;

            let NewBhajan { details, assets } = bhajan;
            details.validate().map_err(RepositoryError::Validation)?;

            let bhajan = Bhajan::new(
                Uuid::new_v4(),
                details,
                assets,
                0,
                0,
                OffsetDateTime::now_utc(),
            );
            write(&self.bhajans).insert(0, bhajan.clone());

            Ok(bhajan)
        }
        .boxed()
    }

    fn find_by_id(&self, id: &Uuid) -> BoxFuture<'_, Result<Bhajan, RepositoryError>> {
        let id = *id;

        async move {
            read(&self.bhajans)
                .iter()
                .find(|bhajan| *bhajan.id() == id)
                .cloned()
                .ok_or(RepositoryError::NotFound(id))
        }
        .boxed()
    }

    fn find_all(&self) -> BoxFuture<'_, Result<Vec<Bhajan>, RepositoryError>> {
        async move { Ok(read(&self.bhajans).clone()) }.boxed()
    }

    fn update_by_id(
        &self,
        id: &Uuid,
        patch: BhajanPatch,
    ) -> BoxFuture<'_, Result<Bhajan, RepositoryError>> {
        let id = *id;

        async move {
            self.check_writable()?;

            let mut bhajans = write(&self.bhajans);
            let stored = bhajans
                .iter_mut()
                .find(|bhajan| *bhajan.id() == id)
                .ok_or(RepositoryError::NotFound(id))?;

            let mut updated = stored.clone();
            updated.patch(&patch).map_err(RepositoryError::Validation)?;
            *stored = updated.clone();

            Ok(updated)
        }
        .boxed()
    }

    fn delete_by_id(&self, id: &Uuid) -> BoxFuture<'_, Result<Bhajan, RepositoryError>> {
        let id = *id;

        async move {
            let mut bhajans = write(&self.bhajans);
            let index = bhajans
                .iter()
                .position(|bhajan| *bhajan.id() == id)
                .ok_or(RepositoryError::NotFound(id))?;

            Ok(bhajans.remove(index))
        }
        .boxed()
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), RepositoryError>> {
        async move { Ok(()) }.boxed()
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}
