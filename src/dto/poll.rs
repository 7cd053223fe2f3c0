use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dao::models::{PollEntity, PollParticipantEntity, VoteEntity},
    dto::{format_system_time, validation::validate_poll_name},
};

/// Vote counts keyed by the id of the participant voted for.
///
/// Every participant appears with a zero-initialized count; ids outside the
/// participant set can still show up when such votes were recorded.
pub type VoteTally = IndexMap<String, u32>;

/// Payload used to open a brand-new poll.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePollRequest {
    /// Display name of the poll, at least 3 characters after trimming.
    pub name: String,
    /// Directory id of the creating user.
    pub creator_id: String,
    /// Directory ids of the other invited participants.
    #[serde(default)]
    pub participant_ids: Vec<String>,
}

impl Validate for CreatePollRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_poll_name(&self.name) {
            errors.add("name", e);
        }

        if self.creator_id.trim().is_empty() {
            let mut e = ValidationError::new("creator_required");
            e.message = Some("Creator ID is missing.".into());
            errors.add("creator_id", e);
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Payload used to cast a vote in the active poll.
#[derive(Debug, Deserialize, ToSchema)]
pub struct VoteRequest {
    /// Directory id of the voting user.
    pub voter_id: String,
    /// Directory id of the participant being voted for.
    pub voted_for_id: String,
}

/// Payload naming the user requesting an end or delete.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PollActionRequest {
    /// Directory id of the user performing the action.
    pub requested_by: String,
}

/// Public projection of a poll participant.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ParticipantSummary {
    pub id: String,
    pub display_name: String,
}

/// Public projection of a poll exposed to REST/SSE clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PollSummary {
    pub id: Uuid,
    pub name: String,
    pub creator_id: String,
    pub creator_display_name: String,
    pub participants: Vec<ParticipantSummary>,
    /// Lifecycle state: `active`, `ended` or `deleted`.
    pub status: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
}

/// Public projection of a single vote.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VoteSummary {
    pub voter_id: String,
    pub voted_for_id: String,
    pub created_at: String,
}

/// Archived poll together with its computed tally.
///
/// Deleted polls carry no tally; only ended ones do.
#[derive(Debug, Serialize, ToSchema)]
pub struct PastPollSummary {
    #[serde(flatten)]
    pub poll: PollSummary,
    /// Vote counts per participant id, present for ended polls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tally: Option<VoteTally>,
}

/// Structured result returned by the poll creation endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct CreatePollResponse {
    pub success: bool,
    pub message: String,
    pub poll: PollSummary,
}

/// Structured result returned by the vote endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct VoteResponse {
    pub success: bool,
    pub message: String,
}

/// Structured result returned by the end and delete endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct PollActionResponse {
    pub success: bool,
    pub message: String,
    /// Poll status after the action.
    pub status: String,
}

impl From<PollParticipantEntity> for ParticipantSummary {
    fn from(participant: PollParticipantEntity) -> Self {
        Self {
            id: participant.id,
            display_name: participant.display_name,
        }
    }
}

impl From<PollEntity> for PollSummary {
    fn from(poll: PollEntity) -> Self {
        Self {
            id: poll.id,
            name: poll.name,
            creator_id: poll.creator_id,
            creator_display_name: poll.creator_display_name,
            participants: poll.participants.into_iter().map(Into::into).collect(),
            status: poll.status.as_str().to_owned(),
            created_at: format_system_time(poll.created_at),
            ended_at: poll.ended_at.map(format_system_time),
        }
    }
}

impl From<VoteEntity> for VoteSummary {
    fn from(vote: VoteEntity) -> Self {
        Self {
            voter_id: vote.voter_id,
            voted_for_id: vote.voted_for_id,
            created_at: format_system_time(vote.created_at),
        }
    }
}

impl From<(PollEntity, Option<VoteTally>)> for PastPollSummary {
    fn from((poll, tally): (PollEntity, Option<VoteTally>)) -> Self {
        Self {
            poll: poll.into(),
            tally,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, creator_id: &str) -> CreatePollRequest {
        CreatePollRequest {
            name: name.to_owned(),
            creator_id: creator_id.to_owned(),
            participant_ids: Vec::new(),
        }
    }

    #[test]
    fn create_request_accepts_valid_input() {
        assert!(request("Lunch Pick", "user1").validate().is_ok());
    }

    #[test]
    fn create_request_rejects_short_name() {
        let err = request("ab", "user1").validate().unwrap_err();
        assert!(err.field_errors().contains_key("name"));
    }

    #[test]
    fn create_request_rejects_missing_creator() {
        let err = request("Lunch Pick", "  ").validate().unwrap_err();
        assert!(err.field_errors().contains_key("creator_id"));
    }
}
