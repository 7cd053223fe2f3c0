use mongodb::bson::{Binary, DateTime, Document, doc, spec::BinarySubtype};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{
    ActivePollStatusEntity, PollEntity, PollParticipantEntity, PollStatus, VoteEntity,
};

/// Well-known `_id` of the singleton status document.
pub const STATUS_DOC_ID: &str = "active_poll_status";

/// Poll document as stored in the `polls` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPollDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    name: String,
    creator_id: String,
    creator_display_name: String,
    participants: Vec<PollParticipantEntity>,
    status: PollStatus,
    created_at: DateTime,
    ended_at: Option<DateTime>,
}

impl From<PollEntity> for MongoPollDocument {
    fn from(value: PollEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            creator_id: value.creator_id,
            creator_display_name: value.creator_display_name,
            participants: value.participants,
            status: value.status,
            created_at: DateTime::from_system_time(value.created_at),
            ended_at: value.ended_at.map(DateTime::from_system_time),
        }
    }
}

impl From<MongoPollDocument> for PollEntity {
    fn from(value: MongoPollDocument) -> Self {
        Self {
            id: value.id,
            name: value.name,
            creator_id: value.creator_id,
            creator_display_name: value.creator_display_name,
            participants: value.participants,
            status: value.status,
            created_at: value.created_at.to_system_time(),
            ended_at: value.ended_at.map(|at| at.to_system_time()),
        }
    }
}

/// Vote document as stored in the `votes` collection. The server assigns the
/// `_id`; uniqueness of `(poll_id, voter_id)` comes from a dedicated index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoVoteDocument {
    pub(super) poll_id: Uuid,
    pub(super) voter_id: String,
    pub(super) voted_for_id: String,
    pub(super) created_at: DateTime,
}

impl From<VoteEntity> for MongoVoteDocument {
    fn from(value: VoteEntity) -> Self {
        Self {
            poll_id: value.poll_id,
            voter_id: value.voter_id,
            voted_for_id: value.voted_for_id,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl From<MongoVoteDocument> for VoteEntity {
    fn from(value: MongoVoteDocument) -> Self {
        Self {
            poll_id: value.poll_id,
            voter_id: value.voter_id,
            voted_for_id: value.voted_for_id,
            created_at: value.created_at.to_system_time(),
        }
    }
}

/// Singleton active-poll status document in the `app_status` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoStatusDocument {
    #[serde(rename = "_id")]
    id: String,
    active_poll_id: Option<Uuid>,
    is_creating: bool,
}

impl From<ActivePollStatusEntity> for MongoStatusDocument {
    fn from(value: ActivePollStatusEntity) -> Self {
        Self {
            id: STATUS_DOC_ID.to_owned(),
            active_poll_id: value.active_poll_id,
            is_creating: value.is_creating,
        }
    }
}

impl From<MongoStatusDocument> for ActivePollStatusEntity {
    fn from(value: MongoStatusDocument) -> Self {
        Self {
            active_poll_id: value.active_poll_id,
            is_creating: value.is_creating,
        }
    }
}

/// Encode a UUID the way the driver stores it (binary subtype 4).
pub fn uuid_as_binary(id: Uuid) -> Binary {
    Binary {
        subtype: BinarySubtype::Uuid,
        bytes: id.into_bytes().to_vec(),
    }
}

/// `_id` filter for a poll document.
pub fn poll_doc_id(id: Uuid) -> Document {
    doc! {"_id": uuid_as_binary(id)}
}

/// `_id` filter for the singleton status document.
pub fn status_doc_id() -> Document {
    doc! {"_id": STATUS_DOC_ID}
}

/// Wire value of a poll status, matching its serde representation.
pub fn status_value(status: PollStatus) -> &'static str {
    status.as_str()
}
