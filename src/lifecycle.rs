//! Create, read, update and delete of bhajans, keeping the records in the
//! repository consistent with the assets in the blob store.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, info, o, warn, Logger};
use url::Url;
use uuid::Uuid;

use crate::assets::{AssetPayloads, UploadCoordinator};
use crate::bhajan::{
    AssetReferences, AssetSlot, Bhajan, BhajanChanges, BhajanDetails, BhajanPatch, NewBhajan,
};
use crate::db::Repository;
use crate::errors::BackendError;

#[derive(Clone)]
pub struct Lifecycle {
    repository: Arc<dyn Repository>,
    coordinator: UploadCoordinator,
    logger: Arc<Logger>,
}

impl Lifecycle {
    pub fn new(
        repository: Arc<dyn Repository>,
        coordinator: UploadCoordinator,
        logger: Arc<Logger>,
    ) -> Self {
        Lifecycle {
            repository,
            coordinator,
            logger,
        }
    }

    /// Validates the submission, uploads its assets and saves the record.
    /// Nothing is uploaded for an invalid submission, and if the record
    /// cannot be saved the uploaded assets are deleted again.
    pub async fn create(
        &self,
        changes: BhajanChanges,
        payloads: AssetPayloads,
    ) -> Result<Bhajan, BackendError> {
        let details = BhajanDetails::from_changes(&changes).map_err(|message| {
            debug!(self.logger, "Rejected new bhajan"; "reason" => &message);
            BackendError::Validation(message)
        })?;

        debug!(self.logger, "Uploading assets..."; "slots" => ?payloads.keys().collect::<Vec<_>>());
        let uploaded = self.upload(payloads).await?;
        let urls = uploaded.values().cloned().collect::<Vec<_>>();

        let new_bhajan = NewBhajan {
            details,
            assets: AssetReferences::from(uploaded),
        };

        match self.repository.create(new_bhajan).await {
            Ok(bhajan) => {
                info!(self.logger, "Created bhajan"; "id" => %bhajan.id());
                Ok(bhajan)
            }
            Err(e) => {
                warn!(self.logger, "Failed to save bhajan; removing its assets"; "error" => %e);
                self.coordinator.discard(urls).await;
                Err(e.into())
            }
        }
    }

    pub async fn find(&self, id: &str) -> Result<Bhajan, BackendError> {
        let id = parse_id(id)?;

        Ok(self.repository.find_by_id(&id).await?)
    }

    /// Every bhajan, newest first.
    pub async fn list(&self) -> Result<Vec<Bhajan>, BackendError> {
        Ok(self.repository.find_all().await?)
    }

    /// Overwrites the supplied fields and replaces the assets of the
    /// supplied slots. Anything not supplied keeps its current value.
    ///
    /// The merged fields are validated before anything is uploaded. Once
    /// the record points at the new assets, the ones they replaced are
    /// deleted; if the record cannot be saved, the new ones are.
    pub async fn update(
        &self,
        id: &str,
        changes: BhajanChanges,
        payloads: AssetPayloads,
    ) -> Result<Bhajan, BackendError> {
        let id = parse_id(id)?;
        let logger = self.logger.new(o!("id" => id.to_string()));

        let existing = self.repository.find_by_id(&id).await?;

        let mut merged = existing.details().clone();
        merged.apply(&changes);
        merged.validate().map_err(|message| {
            debug!(logger, "Rejected changes"; "reason" => &message);
            BackendError::Validation(message)
        })?;

        if !payloads.is_empty() {
            debug!(logger, "Uploading replacement assets..."; "slots" => ?payloads.keys().collect::<Vec<_>>());
        }
        let uploaded = self.upload(payloads).await?;

        let superseded = uploaded
            .keys()
            .filter_map(|slot| existing.assets().get(*slot).cloned())
            .collect::<Vec<_>>();
        let new_urls = uploaded.values().cloned().collect::<Vec<_>>();

        let patch = BhajanPatch {
            changes,
            assets: uploaded,
        };

        let updated = match self.repository.update_by_id(&id, patch).await {
            Ok(updated) => updated,
            Err(e) => {
                warn!(logger, "Failed to save changes; removing new assets"; "error" => %e);
                self.coordinator.discard(new_urls).await;
                return Err(e.into());
            }
        };

        if !superseded.is_empty() {
            debug!(logger, "Removing superseded assets..."; "count" => superseded.len());
            self.coordinator.discard(superseded).await;
        }

        info!(logger, "Updated bhajan");
        Ok(updated)
    }

    /// Deletes the assets of a bhajan and then its record. Assets that
    /// cannot be deleted are logged and left behind; the record is
    /// removed regardless.
    pub async fn delete(&self, id: &str) -> Result<Bhajan, BackendError> {
        let id = parse_id(id)?;
        let logger = self.logger.new(o!("id" => id.to_string()));

        let existing = self.repository.find_by_id(&id).await?;

        let urls = existing.assets().iter().map(|(_, url)| url.clone());
        let failures = self.coordinator.discard(urls).await;
        if !failures.is_empty() {
            warn!(logger, "Some assets could not be deleted"; "urls" => ?failures.iter().map(|(url, _)| url.as_str()).collect::<Vec<_>>());
        }

        let deleted = self.repository.delete_by_id(&id).await?;
        info!(logger, "Deleted bhajan");

        Ok(deleted)
    }

    /// Checks that the repository is reachable.
    pub async fn ping(&self) -> Result<(), BackendError> {
        Ok(self.repository.ping().await?)
    }

    async fn upload(
        &self,
        payloads: AssetPayloads,
    ) -> Result<BTreeMap<AssetSlot, Url>, BackendError> {
        let references = self.coordinator.upload_all(payloads).await?;

        Ok(references
            .into_iter()
            .map(|(slot, reference)| (slot, reference.url))
            .collect())
    }
}

fn parse_id(id: &str) -> Result<Uuid, BackendError> {
    Uuid::parse_str(id).map_err(|_| BackendError::InvalidId(id.to_owned()))
}

#[cfg(test)]
mod test {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::assets::AssetPayload;
    use crate::db::memory::MemoryRepository;
    use crate::store::memory::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        repository: Arc<MemoryRepository>,
        lifecycle: Lifecycle,
    }

    fn fixture() -> Fixture {
        fixture_with_timeouts(Duration::from_secs(5), Duration::from_secs(5))
    }

    fn fixture_with_timeouts(upload_timeout: Duration, delete_timeout: Duration) -> Fixture {
        let store = Arc::new(MemoryStore::default());
        let repository = Arc::new(MemoryRepository::new());
        let logger = Arc::new(log::discard());

        let coordinator = UploadCoordinator::new(
            store.clone(),
            upload_timeout,
            delete_timeout,
            logger.clone(),
        );
        let lifecycle = Lifecycle::new(repository.clone(), coordinator, logger);

        Fixture {
            store,
            repository,
            lifecycle,
        }
    }

    fn hanuman_chalisa() -> BhajanChanges {
        BhajanChanges {
            title: Some("Hanuman Chalisa".to_owned()),
            artist: Some("Hariharan".to_owned()),
            language: Some("Hindi".to_owned()),
            duration: Some(540),
            ..Default::default()
        }
    }

    fn payload(slot: AssetSlot) -> AssetPayload {
        match slot {
            AssetSlot::Audio => AssetPayload::new(&b"ID3\x03"[..], "audio/mpeg"),
            AssetSlot::Video => AssetPayload::new(&b"\0\0\0\x18ftypmp42"[..], "video/mp4"),
            AssetSlot::Thumbnail => AssetPayload::new(&b"\xff\xd8\xff"[..], "image/jpeg"),
        }
    }

    fn payloads(slots: &[AssetSlot]) -> AssetPayloads {
        slots.iter().map(|&slot| (slot, payload(slot))).collect()
    }

    async fn create_with_all_assets(fixture: &Fixture) -> Bhajan {
        fixture
            .lifecycle
            .create(hanuman_chalisa(), payloads(AssetSlot::ALL))
            .await
            .expect("create bhajan")
    }

    #[tokio::test]
    async fn creating_uploads_exactly_the_supplied_slots() {
        for count in 0..=AssetSlot::ALL.len() {
            let fixture = fixture();
            let slots = &AssetSlot::ALL[..count];

            let bhajan = fixture
                .lifecycle
                .create(hanuman_chalisa(), payloads(slots))
                .await
                .expect("create bhajan");

            assert_eq!(fixture.store.uploads().len(), count);
            for slot in AssetSlot::ALL {
                let reference = bhajan.assets().get(*slot);
                assert_eq!(reference.is_some(), slots.contains(slot), "{} with {} files", slot, count);

                if let Some(url) = reference {
                    assert!(fixture.store.contains(url));
                }
            }
        }
    }

    #[tokio::test]
    async fn missing_required_fields_fail_before_uploading() {
        let blank_out: Vec<fn(&mut BhajanChanges)> = vec![
            |c: &mut BhajanChanges| c.title = None,
            |c: &mut BhajanChanges| c.artist = None,
            |c: &mut BhajanChanges| c.language = None,
            |c: &mut BhajanChanges| c.duration = None,
            |c: &mut BhajanChanges| c.title = Some("  ".to_owned()),
        ];

        for blank_out in blank_out {
            let fixture = fixture();
            let mut changes = hanuman_chalisa();
            blank_out(&mut changes);

            let result = fixture
                .lifecycle
                .create(changes, payloads(AssetSlot::ALL))
                .await;

            assert!(matches!(result, Err(BackendError::Validation(_))));
            assert!(fixture.store.uploads().is_empty());
            assert!(fixture.repository.is_empty());
        }
    }

    #[tokio::test]
    async fn failed_upload_creates_nothing() {
        let fixture = fixture();
        fixture.store.reject_uploads_of("video/mp4");

        let result = fixture
            .lifecycle
            .create(hanuman_chalisa(), payloads(AssetSlot::ALL))
            .await;

        match result {
            Err(BackendError::Ingestion(failure)) => assert_eq!(failure.slot, AssetSlot::Video),
            other => panic!("expected an ingestion failure, got {:?}", other),
        }
        assert!(fixture.repository.is_empty());
        assert!(fixture.store.is_empty());
    }

    #[tokio::test]
    async fn overlong_duration_fails_before_uploading() {
        let fixture = fixture();

        let result = fixture
            .lifecycle
            .create(
                BhajanChanges {
                    duration: Some(u32::MAX),
                    ..hanuman_chalisa()
                },
                payloads(AssetSlot::ALL),
            )
            .await;

        assert!(matches!(result, Err(BackendError::Validation(_))));
        assert!(fixture.store.uploads().is_empty());
        assert!(fixture.repository.is_empty());
    }

    #[tokio::test]
    async fn rejected_record_releases_its_assets() {
        let fixture = fixture();
        fixture.repository.reject_writes("schema rejected record");

        let result = fixture
            .lifecycle
            .create(hanuman_chalisa(), payloads(&[AssetSlot::Audio, AssetSlot::Thumbnail]))
            .await;

        assert!(matches!(result, Err(BackendError::Validation(_))));
        assert_eq!(fixture.store.uploads().len(), 2);
        assert!(fixture.store.is_empty());
    }

    #[tokio::test]
    async fn reading_unknown_or_malformed_ids() {
        let fixture = fixture();

        assert!(matches!(
            fixture.lifecycle.find(&Uuid::new_v4().to_string()).await,
            Err(BackendError::NonExistentId(_))
        ));

        let result = fixture.lifecycle.find("not-an-id").await;
        match result {
            Err(e @ BackendError::InvalidId(_)) => assert_eq!(e.kind(), "InvalidIdentifier"),
            other => panic!("expected an invalid ID, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn listing_an_empty_repository() {
        let fixture = fixture();

        assert!(fixture.lifecycle.list().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn field_only_update_leaves_assets_alone() {
        let fixture = fixture();
        let created = create_with_all_assets(&fixture).await;
        let uploads = fixture.store.uploads().len();

        let updated = fixture
            .lifecycle
            .update(
                &created.id().to_string(),
                BhajanChanges {
                    genre: Some("Chalisa".to_owned()),
                    is_featured: Some(true),
                    ..Default::default()
                },
                AssetPayloads::new(),
            )
            .await
            .expect("update bhajan");

        assert_eq!(fixture.store.uploads().len(), uploads);
        assert!(fixture.store.deletions().is_empty());
        assert_eq!(updated.assets(), created.assets());
        assert_eq!(updated.details().genre.as_deref(), Some("Chalisa"));
        assert!(updated.details().is_featured);
        assert_eq!(updated.details().title, "Hanuman Chalisa");
    }

    #[tokio::test]
    async fn replacing_one_slot_keeps_the_others() {
        let fixture = fixture();
        let created = create_with_all_assets(&fixture).await;
        let old_thumbnail = created.assets().thumbnail.clone().unwrap();

        let updated = fixture
            .lifecycle
            .update(
                &created.id().to_string(),
                BhajanChanges::default(),
                payloads(&[AssetSlot::Thumbnail]),
            )
            .await
            .expect("update bhajan");

        assert_eq!(updated.assets().audio, created.assets().audio);
        assert_eq!(updated.assets().video, created.assets().video);

        let new_thumbnail = updated.assets().thumbnail.clone().unwrap();
        assert_ne!(new_thumbnail, old_thumbnail);
        assert!(fixture.store.contains(&new_thumbnail));
        assert!(!fixture.store.contains(&old_thumbnail));
        assert_eq!(fixture.store.deletions(), vec![old_thumbnail]);
    }

    #[tokio::test]
    async fn invalid_changes_fail_before_uploading() {
        let fixture = fixture();
        let created = create_with_all_assets(&fixture).await;
        let uploads = fixture.store.uploads().len();

        let result = fixture
            .lifecycle
            .update(
                &created.id().to_string(),
                BhajanChanges {
                    artist: Some("".to_owned()),
                    ..Default::default()
                },
                payloads(&[AssetSlot::Audio]),
            )
            .await;

        assert!(matches!(result, Err(BackendError::Validation(_))));
        assert_eq!(fixture.store.uploads().len(), uploads);

        let stored = fixture.lifecycle.find(&created.id().to_string()).await.unwrap();
        assert_eq!(stored, created);
    }

    #[tokio::test]
    async fn failed_save_releases_new_assets_and_keeps_old_ones() {
        let fixture = fixture();
        let created = create_with_all_assets(&fixture).await;
        fixture.repository.reject_writes("schema rejected record");

        let result = fixture
            .lifecycle
            .update(
                &created.id().to_string(),
                BhajanChanges::default(),
                payloads(&[AssetSlot::Audio]),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(fixture.store.len(), 3);
        for (_, url) in created.assets().iter() {
            assert!(fixture.store.contains(url));
        }
    }

    #[tokio::test]
    async fn update_upload_failure_leaves_record_alone() {
        let fixture = fixture();
        let created = fixture
            .lifecycle
            .create(hanuman_chalisa(), payloads(&[AssetSlot::Audio]))
            .await
            .expect("create bhajan");
        let old_audio = created.assets().audio.clone().unwrap();
        fixture.store.reject_uploads_of("image/jpeg");

        let result = fixture
            .lifecycle
            .update(
                &created.id().to_string(),
                BhajanChanges {
                    genre: Some("Chalisa".to_owned()),
                    ..Default::default()
                },
                payloads(&[AssetSlot::Audio, AssetSlot::Thumbnail]),
            )
            .await;

        let error = result.unwrap_err();
        assert_eq!(error.kind(), "IngestionFailure");
        match error {
            BackendError::Ingestion(failure) => {
                assert_eq!(failure.slot, AssetSlot::Thumbnail);
                assert_eq!(failure.rolled_back, vec![AssetSlot::Audio]);
            }
            other => panic!("expected an ingestion failure, got {:?}", other),
        }

        let stored = fixture.lifecycle.find(&created.id().to_string()).await.unwrap();
        assert_eq!(stored, created);
        assert_eq!(fixture.store.len(), 1);
        assert!(fixture.store.contains(&old_audio));
    }

    #[tokio::test]
    async fn updating_unknown_id_uploads_nothing() {
        let fixture = fixture();

        let result = fixture
            .lifecycle
            .update(
                &Uuid::new_v4().to_string(),
                hanuman_chalisa(),
                payloads(&[AssetSlot::Audio]),
            )
            .await;

        assert!(matches!(result, Err(BackendError::NonExistentId(_))));
        assert!(fixture.store.uploads().is_empty());
    }

    #[tokio::test]
    async fn deleting_removes_every_asset() {
        let fixture = fixture();
        let created = create_with_all_assets(&fixture).await;

        fixture
            .lifecycle
            .delete(&created.id().to_string())
            .await
            .expect("delete bhajan");

        let mut deleted = fixture.store.deletions();
        let mut expected = created
            .assets()
            .iter()
            .map(|(_, url)| url.clone())
            .collect::<Vec<_>>();
        deleted.sort();
        expected.sort();

        assert_eq!(deleted, expected);
        assert!(fixture.store.is_empty());
        assert!(fixture.repository.is_empty());
    }

    #[tokio::test]
    async fn record_is_deleted_even_if_assets_are_not() {
        let fixture = fixture();
        let created = create_with_all_assets(&fixture).await;
        fixture.store.reject_deletes();

        fixture
            .lifecycle
            .delete(&created.id().to_string())
            .await
            .expect("delete bhajan");

        assert_eq!(fixture.store.deletions().len(), 3);
        assert!(matches!(
            fixture.lifecycle.find(&created.id().to_string()).await,
            Err(BackendError::NonExistentId(_))
        ));
    }

    #[tokio::test]
    async fn slow_asset_deletes_do_not_hold_up_deletion() {
        let fixture = fixture_with_timeouts(Duration::from_secs(5), Duration::from_millis(100));
        let created = create_with_all_assets(&fixture).await;
        fixture.store.delay_deletes(Duration::from_secs(5));

        let start = Instant::now();
        let deleted = fixture
            .lifecycle
            .delete(&created.id().to_string())
            .await
            .expect("delete bhajan");
        let elapsed = start.elapsed();

        assert_eq!(deleted.id(), created.id());
        assert!(elapsed < Duration::from_secs(1), "took {:?}", elapsed);
        assert!(fixture.repository.is_empty());
        assert_eq!(fixture.store.len(), 3);
    }

    #[tokio::test]
    async fn create_update_delete() {
        let fixture = fixture();

        let created = fixture
            .lifecycle
            .create(hanuman_chalisa(), payloads(&[AssetSlot::Audio]))
            .await
            .expect("create bhajan");

        assert!(created.assets().audio.is_some());
        assert_eq!(created.assets().video, None);
        assert_eq!(created.assets().thumbnail, None);
        assert_eq!(created.views(), 0);
        assert_eq!(created.likes(), 0);
        assert!(!created.details().is_featured);

        let id = created.id().to_string();
        let updated = fixture
            .lifecycle
            .update(&id, BhajanChanges::default(), payloads(&[AssetSlot::Thumbnail]))
            .await
            .expect("update bhajan");

        assert_eq!(updated.assets().audio, created.assets().audio);
        assert!(fixture.store.contains(updated.assets().thumbnail.as_ref().unwrap()));
        assert_eq!(updated.assets().video, None);

        let deleted = fixture.lifecycle.delete(&id).await.expect("delete bhajan");
        assert_eq!(deleted.id(), created.id());

        assert!(matches!(
            fixture.lifecycle.find(&id).await,
            Err(BackendError::NonExistentId(_))
        ));
    }
}
