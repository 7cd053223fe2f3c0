use std::{sync::Arc, time::SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database,
    bson::{DateTime, doc},
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoPollDocument, MongoStatusDocument, MongoVoteDocument, STATUS_DOC_ID, poll_doc_id,
        status_doc_id, status_value, uuid_as_binary,
    },
};
use crate::dao::{
    models::{ActivePollStatusEntity, PollEntity, PollStatus, VoteEntity},
    poll_store::{FinishOutcome, PollStore, SlotClaim, VoteInsert},
    storage::StorageResult,
};

const POLL_COLLECTION_NAME: &str = "polls";
const VOTE_COLLECTION_NAME: &str = "votes";
const STATUS_COLLECTION_NAME: &str = "app_status";

/// MongoDB-backed [`PollStore`].
///
/// The singleton lives in a single well-known document, so every guard on it
/// is a filtered single-document update and therefore atomic on the server.
#[derive(Clone)]
pub struct MongoPollStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoPollStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        // One vote per (poll, voter): this unique index is the "first writer
        // wins" backstop behind the service-level duplicate check.
        let vote_index = mongodb::IndexModel::builder()
            .keys(doc! {"poll_id": 1, "voter_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("vote_voter_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();

        self.vote_collection()
            .await
            .create_index(vote_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: VOTE_COLLECTION_NAME,
                index: "poll_id,voter_id",
                source,
            })?;

        // Serves the past-polls query (status filter, newest ended_at first).
        let archive_index = mongodb::IndexModel::builder()
            .keys(doc! {"status": 1, "ended_at": -1})
            .options(
                IndexOptions::builder()
                    .name(Some("poll_archive_idx".to_owned()))
                    .build(),
            )
            .build();

        self.poll_collection()
            .await
            .create_index(archive_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: POLL_COLLECTION_NAME,
                index: "status,ended_at",
                source,
            })?;

        Ok(())
    }

    async fn poll_collection(&self) -> Collection<MongoPollDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoPollDocument>(POLL_COLLECTION_NAME)
    }

    async fn vote_collection(&self) -> Collection<MongoVoteDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoVoteDocument>(VOTE_COLLECTION_NAME)
    }

    async fn status_collection(&self) -> Collection<MongoStatusDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoStatusDocument>(STATUS_COLLECTION_NAME)
    }

    /// Upsert the idle status document when none exists yet. The `_id` filter
    /// plus `$setOnInsert` keeps concurrent initializations idempotent.
    async fn ensure_status_document(&self) -> MongoResult<()> {
        self.status_collection()
            .await
            .update_one(
                status_doc_id(),
                doc! {"$setOnInsert": {"active_poll_id": null, "is_creating": false}},
            )
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::UpdateStatus { source })?;
        Ok(())
    }

    async fn insert_poll(&self, poll: PollEntity) -> MongoResult<()> {
        let id = poll.id;
        let document: MongoPollDocument = poll.into();
        self.poll_collection()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::SavePoll { id, source })?;
        Ok(())
    }

    async fn find_poll(&self, id: Uuid) -> MongoResult<Option<PollEntity>> {
        let document = self
            .poll_collection()
            .await
            .find_one(poll_doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadPoll { id, source })?;
        Ok(document.map(Into::into))
    }

    async fn past_polls(&self) -> MongoResult<Vec<PollEntity>> {
        let documents: Vec<MongoPollDocument> = self
            .poll_collection()
            .await
            .find(doc! {"status": {"$in": [
                status_value(PollStatus::Ended),
                status_value(PollStatus::Deleted),
            ]}})
            .sort(doc! {"ended_at": -1})
            .await
            .map_err(|source| MongoDaoError::ListPastPolls { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListPastPolls { source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn finish_poll(
        &self,
        id: Uuid,
        status: PollStatus,
        ended_at: SystemTime,
    ) -> MongoResult<FinishOutcome> {
        // CAS on the status field: only an active poll can be finished, so a
        // racing second finish loses cleanly instead of overwriting.
        let updated = self
            .poll_collection()
            .await
            .find_one_and_update(
                doc! {"_id": uuid_as_binary(id), "status": status_value(PollStatus::Active)},
                doc! {"$set": {
                    "status": status_value(status),
                    "ended_at": DateTime::from_system_time(ended_at),
                }},
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::FinishPoll { id, source })?;

        let Some(document) = updated else {
            return match self.find_poll(id).await? {
                Some(poll) => Ok(FinishOutcome::NotActive(poll.status)),
                None => Ok(FinishOutcome::Missing),
            };
        };

        // The pointer filter makes the clear a no-op unless the singleton
        // still names this poll, so a stale clear cannot happen.
        self.status_collection()
            .await
            .update_one(
                doc! {"_id": STATUS_DOC_ID, "active_poll_id": uuid_as_binary(id)},
                doc! {"$set": {"active_poll_id": null, "is_creating": false}},
            )
            .await
            .map_err(|source| MongoDaoError::UpdateStatus { source })?;

        Ok(FinishOutcome::Finished(document.into()))
    }

    async fn insert_vote(&self, vote: VoteEntity) -> MongoResult<VoteInsert> {
        let poll_id = vote.poll_id;
        let voter_id = vote.voter_id.clone();
        let document: MongoVoteDocument = vote.into();

        match self.vote_collection().await.insert_one(&document).await {
            Ok(_) => Ok(VoteInsert::Inserted),
            Err(err) if is_duplicate_key(&err) => Ok(VoteInsert::Duplicate),
            Err(source) => Err(MongoDaoError::SaveVote {
                poll_id,
                voter_id,
                source,
            }),
        }
    }

    async fn find_vote(&self, poll_id: Uuid, voter_id: &str) -> MongoResult<Option<VoteEntity>> {
        let document = self
            .vote_collection()
            .await
            .find_one(doc! {"poll_id": uuid_as_binary(poll_id), "voter_id": voter_id})
            .await
            .map_err(|source| MongoDaoError::LoadVotes { poll_id, source })?;
        Ok(document.map(Into::into))
    }

    async fn votes_for_poll(&self, poll_id: Uuid) -> MongoResult<Vec<VoteEntity>> {
        let documents: Vec<MongoVoteDocument> = self
            .vote_collection()
            .await
            .find(doc! {"poll_id": uuid_as_binary(poll_id)})
            .sort(doc! {"created_at": 1})
            .await
            .map_err(|source| MongoDaoError::LoadVotes { poll_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadVotes { poll_id, source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn active_status(&self) -> MongoResult<ActivePollStatusEntity> {
        let document = self
            .status_collection()
            .await
            .find_one(status_doc_id())
            .await
            .map_err(|source| MongoDaoError::LoadStatus { source })?;

        match document {
            Some(document) => Ok(document.into()),
            None => {
                self.ensure_status_document().await?;
                Ok(ActivePollStatusEntity::default())
            }
        }
    }

    async fn acquire_creation_slot(&self) -> MongoResult<SlotClaim> {
        self.ensure_status_document().await?;

        if self.try_claim_slot().await?.is_some() {
            return Ok(SlotClaim::Acquired);
        }

        // A failure between the status flip and the singleton clear in
        // `finish_poll` leaves the pointer naming a terminal poll, and no
        // later finish will touch it again. Release such a pointer here and
        // retry the claim once, so one interrupted finish cannot block
        // creation forever.
        if self.release_stale_pointer().await? && self.try_claim_slot().await?.is_some() {
            return Ok(SlotClaim::Acquired);
        }

        Ok(SlotClaim::Busy(self.active_status().await?))
    }

    async fn try_claim_slot(&self) -> MongoResult<Option<MongoStatusDocument>> {
        self.status_collection()
            .await
            .find_one_and_update(
                doc! {"_id": STATUS_DOC_ID, "active_poll_id": null, "is_creating": false},
                doc! {"$set": {"is_creating": true}},
            )
            .await
            .map_err(|source| MongoDaoError::UpdateStatus { source })
    }

    /// Clear the singleton if it names a poll that is no longer active. The
    /// update is filtered on the exact id just read, so an activation racing
    /// this check is never clobbered.
    async fn release_stale_pointer(&self) -> MongoResult<bool> {
        let Some(active_id) = self.active_status().await?.active_poll_id else {
            return Ok(false);
        };

        let pointed = self.find_poll(active_id).await?;
        if !pointer_is_stale(pointed.as_ref()) {
            return Ok(false);
        }

        let cleared = self
            .status_collection()
            .await
            .update_one(
                doc! {"_id": STATUS_DOC_ID, "active_poll_id": uuid_as_binary(active_id)},
                doc! {"$set": {"active_poll_id": null}},
            )
            .await
            .map_err(|source| MongoDaoError::UpdateStatus { source })?;

        Ok(cleared.modified_count > 0)
    }

    async fn write_status(&self, status: ActivePollStatusEntity) -> MongoResult<()> {
        let document: MongoStatusDocument = status.into();
        self.status_collection()
            .await
            .replace_one(status_doc_id(), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::UpdateStatus { source })?;
        Ok(())
    }
}

/// Whether a driver error is the unique-index violation for a second vote.
fn is_duplicate_key(err: &MongoError) -> bool {
    match *err.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref write_error)) => write_error.code == 11000,
        _ => false,
    }
}

/// Whether the singleton names a poll the finish path can no longer clear:
/// one that is already terminal, or one that does not exist at all.
fn pointer_is_stale(poll: Option<&PollEntity>) -> bool {
    match poll {
        Some(poll) => poll.status != PollStatus::Active,
        None => true,
    }
}

impl PollStore for MongoPollStore {
    fn insert_poll(&self, poll: PollEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_poll(poll).await.map_err(Into::into) })
    }

    fn find_poll(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<PollEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_poll(id).await.map_err(Into::into) })
    }

    fn past_polls(&self) -> BoxFuture<'static, StorageResult<Vec<PollEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.past_polls().await.map_err(Into::into) })
    }

    fn finish_poll(
        &self,
        id: Uuid,
        status: PollStatus,
        ended_at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<FinishOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .finish_poll(id, status, ended_at)
                .await
                .map_err(Into::into)
        })
    }

    fn insert_vote(&self, vote: VoteEntity) -> BoxFuture<'static, StorageResult<VoteInsert>> {
        let store = self.clone();
        Box::pin(async move { store.insert_vote(vote).await.map_err(Into::into) })
    }

    fn find_vote(
        &self,
        poll_id: Uuid,
        voter_id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<VoteEntity>>> {
        let store = self.clone();
        let voter_id = voter_id.to_owned();
        Box::pin(async move { store.find_vote(poll_id, &voter_id).await.map_err(Into::into) })
    }

    fn votes_for_poll(
        &self,
        poll_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<VoteEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.votes_for_poll(poll_id).await.map_err(Into::into) })
    }

    fn active_status(&self) -> BoxFuture<'static, StorageResult<ActivePollStatusEntity>> {
        let store = self.clone();
        Box::pin(async move { store.active_status().await.map_err(Into::into) })
    }

    fn acquire_creation_slot(&self) -> BoxFuture<'static, StorageResult<SlotClaim>> {
        let store = self.clone();
        Box::pin(async move { store.acquire_creation_slot().await.map_err(Into::into) })
    }

    fn commit_creation(&self, poll_id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .write_status(ActivePollStatusEntity {
                    active_poll_id: Some(poll_id),
                    is_creating: false,
                })
                .await
                .map_err(Into::into)
        })
    }

    fn release_creation_slot(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .write_status(ActivePollStatusEntity::default())
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
