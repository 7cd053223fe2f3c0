//! Business logic powering the poll REST routes. These helpers coordinate
//! storage writes, the active-poll singleton, and change-feed publication.

use std::time::SystemTime;

use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::{
        models::{
            ActivePollStatusEntity, PollEntity, PollParticipantEntity, PollStatus, VoteEntity,
        },
        poll_store::{FinishOutcome, PollStore, SlotClaim, VoteInsert},
    },
    dto::poll::{
        CreatePollRequest, CreatePollResponse, PastPollSummary, PollActionRequest,
        PollActionResponse, PollSummary, VoteRequest, VoteResponse, VoteTally,
    },
    error::ServiceError,
    state::{
        SharedState,
        lifecycle::{self, Advance, InvalidTransition, PollAction},
    },
};

/// Open a new poll, claiming the single active slot.
///
/// The slot is claimed before anything is written and rolled back if the
/// write fails, so a crashed creation never blocks the next one.
pub async fn create_poll(
    state: &SharedState,
    request: CreatePollRequest,
) -> Result<CreatePollResponse, ServiceError> {
    request.validate()?;

    let store = state.require_poll_store().await?;
    let participants = resolve_participants(state, &request)?;

    match store.acquire_creation_slot().await? {
        SlotClaim::Acquired => {}
        SlotClaim::Busy(_) => {
            return Err(ServiceError::Conflict(
                "An active poll already exists or is being created.".into(),
            ));
        }
    }

    state.feeds().publish_status(ActivePollStatusEntity {
        active_poll_id: None,
        is_creating: true,
    });

    let creator = &participants[0];
    let poll = PollEntity {
        id: Uuid::new_v4(),
        name: request.name.trim().to_owned(),
        creator_id: creator.id.clone(),
        creator_display_name: creator.display_name.clone(),
        participants,
        status: PollStatus::Active,
        created_at: SystemTime::now(),
        ended_at: None,
    };

    if let Err(err) = persist_new_poll(store.as_ref(), &poll).await {
        release_creation_slot(state, store.as_ref()).await;
        return Err(err);
    }

    state.feeds().publish_status(ActivePollStatusEntity {
        active_poll_id: Some(poll.id),
        is_creating: false,
    });
    // Opening both channels here scopes them to the poll's active lifetime;
    // they stay up until the finish path retires them.
    state.feeds().publish_poll(poll.id, Some(poll.clone()));
    state.feeds().publish_votes(poll.id, Vec::new());
    info!(poll_id = %poll.id, name = %poll.name, "poll created");

    Ok(CreatePollResponse {
        success: true,
        message: "Poll created successfully!".into(),
        poll: poll.into(),
    })
}

async fn persist_new_poll(store: &dyn PollStore, poll: &PollEntity) -> Result<(), ServiceError> {
    store.insert_poll(poll.clone()).await?;
    store.commit_creation(poll.id).await?;
    Ok(())
}

/// Roll the singleton back to idle after a failed creation.
async fn release_creation_slot(state: &SharedState, store: &dyn PollStore) {
    if let Err(err) = store.release_creation_slot().await {
        warn!(error = %err, "failed to roll back the creation slot");
    }
    state.feeds().publish_status(ActivePollStatusEntity::default());
}

/// Resolve and deduplicate the participant set, creator first.
fn resolve_participants(
    state: &SharedState,
    request: &CreatePollRequest,
) -> Result<Vec<PollParticipantEntity>, ServiceError> {
    let directory = state.directory();

    let Some(creator) = directory.find_by_id(&request.creator_id) else {
        return Err(ServiceError::validation("Creator user not found."));
    };

    let mut participants = vec![PollParticipantEntity {
        id: creator.id,
        display_name: creator.display_name,
    }];

    for other_id in &request.participant_ids {
        if *other_id == request.creator_id {
            continue;
        }

        let Some(user) = directory.find_by_id(other_id) else {
            return Err(ServiceError::field_validation(
                "participant_ids",
                format!("Selected participant with ID {other_id} not found."),
            ));
        };

        if participants.iter().all(|existing| existing.id != user.id) {
            participants.push(PollParticipantEntity {
                id: user.id,
                display_name: user.display_name,
            });
        }
    }

    if participants.len() < 2 {
        return Err(ServiceError::field_validation(
            "participant_ids",
            "Please select at least 1 other participant.",
        ));
    }

    Ok(participants)
}

/// Record one voter's choice in an active poll.
///
/// Self-votes and votes for ids outside the participant set are accepted;
/// only the one-vote-per-voter rule is enforced here.
pub async fn submit_vote(
    state: &SharedState,
    poll_id: Uuid,
    request: VoteRequest,
) -> Result<VoteResponse, ServiceError> {
    let store = state.require_poll_store().await?;

    let Some(poll) = store.find_poll(poll_id).await? else {
        return Err(ServiceError::NotActive("This poll is not active.".into()));
    };
    if poll.status != PollStatus::Active {
        return Err(ServiceError::NotActive("This poll is not active.".into()));
    }

    if store.find_vote(poll_id, &request.voter_id).await?.is_some() {
        return Err(ServiceError::DuplicateVote(
            "You have already voted in this poll.".into(),
        ));
    }

    let vote = VoteEntity {
        poll_id,
        voter_id: request.voter_id.clone(),
        voted_for_id: request.voted_for_id,
        created_at: SystemTime::now(),
    };

    // The unique index in storage backs up the read check above, so two
    // concurrent first votes still collapse to a single winner.
    match store.insert_vote(vote).await? {
        VoteInsert::Inserted => {}
        VoteInsert::Duplicate => {
            return Err(ServiceError::DuplicateVote(
                "You have already voted in this poll.".into(),
            ));
        }
    }

    refresh_vote_feed(state, store.as_ref(), poll_id).await;
    info!(poll_id = %poll_id, voter_id = %request.voter_id, "vote recorded");

    Ok(VoteResponse {
        success: true,
        message: "Vote submitted.".into(),
    })
}

/// Close a poll, keeping its record and tally in the archive.
pub async fn end_poll(
    state: &SharedState,
    poll_id: Uuid,
    request: PollActionRequest,
) -> Result<PollActionResponse, ServiceError> {
    finish_poll(state, poll_id, request, PollAction::End).await
}

/// Discard a poll. Repeating the delete is accepted as a no-op.
pub async fn delete_poll(
    state: &SharedState,
    poll_id: Uuid,
    request: PollActionRequest,
) -> Result<PollActionResponse, ServiceError> {
    finish_poll(state, poll_id, request, PollAction::Delete).await
}

async fn finish_poll(
    state: &SharedState,
    poll_id: Uuid,
    request: PollActionRequest,
    action: PollAction,
) -> Result<PollActionResponse, ServiceError> {
    let store = state.require_poll_store().await?;

    let Some(poll) = store.find_poll(poll_id).await? else {
        return Err(ServiceError::NotFound("Poll not found.".into()));
    };

    if !poll.is_creator(&request.requested_by) {
        return Err(ServiceError::Unauthorized(format!(
            "Only the creator can {} the poll.",
            action.as_str()
        )));
    }

    let next = match lifecycle::advance(poll.status, action)? {
        Advance::Changed(next) => next,
        Advance::Unchanged => {
            return Ok(PollActionResponse {
                success: true,
                message: "Poll already deleted.".into(),
                status: poll.status.as_str().to_owned(),
            });
        }
    };

    let finished = match store.finish_poll(poll_id, next, SystemTime::now()).await? {
        FinishOutcome::Finished(poll) => poll,
        FinishOutcome::NotActive(status) => {
            // Lost a race against a concurrent end or delete.
            if action == PollAction::Delete && status == PollStatus::Deleted {
                return Ok(PollActionResponse {
                    success: true,
                    message: "Poll already deleted.".into(),
                    status: status.as_str().to_owned(),
                });
            }
            return Err(InvalidTransition {
                from: status,
                action,
            }
            .into());
        }
        FinishOutcome::Missing => {
            return Err(ServiceError::NotFound("Poll not found.".into()));
        }
    };

    publish_after_finish(state, store.as_ref(), &finished).await;
    info!(poll_id = %poll_id, status = finished.status.as_str(), "poll closed");

    let message = match action {
        PollAction::End => "Poll ended.",
        PollAction::Delete => "Poll deleted.",
    };

    Ok(PollActionResponse {
        success: true,
        message: message.into(),
        status: finished.status.as_str().to_owned(),
    })
}

/// Load one poll as its public projection.
pub async fn poll_by_id(state: &SharedState, poll_id: Uuid) -> Result<PollSummary, ServiceError> {
    let store = state.require_poll_store().await?;

    let Some(poll) = store.find_poll(poll_id).await? else {
        return Err(ServiceError::NotFound("Poll not found.".into()));
    };

    Ok(poll.into())
}

/// Load the archive of ended and deleted polls, newest first. Ended polls
/// carry their computed tally; deleted polls carry none.
pub async fn past_polls(state: &SharedState) -> Result<Vec<PastPollSummary>, ServiceError> {
    let store = state.require_poll_store().await?;
    let polls = store.past_polls().await?;

    let mut summaries = Vec::with_capacity(polls.len());
    for poll in polls {
        let tally = if poll.status == PollStatus::Ended {
            let votes = store.votes_for_poll(poll.id).await?;
            Some(compute_tally(&poll, &votes))
        } else {
            None
        };
        summaries.push((poll, tally).into());
    }

    Ok(summaries)
}

/// Zero-initialize a count per participant, then add one per vote.
///
/// Votes for ids outside the participant set still count under their own
/// key, so the tally total always equals the number of votes.
pub fn compute_tally(poll: &PollEntity, votes: &[VoteEntity]) -> VoteTally {
    let mut tally: VoteTally = poll
        .participants
        .iter()
        .map(|participant| (participant.id.clone(), 0))
        .collect();

    for vote in votes {
        *tally.entry(vote.voted_for_id.clone()).or_insert(0) += 1;
    }

    tally
}

/// Reload the vote list from storage and push it to feed subscribers.
async fn refresh_vote_feed(state: &SharedState, store: &dyn PollStore, poll_id: Uuid) {
    match store.votes_for_poll(poll_id).await {
        Ok(votes) => state.feeds().publish_votes(poll_id, votes),
        Err(err) => warn!(poll_id = %poll_id, error = %err, "failed to refresh vote feed"),
    }
}

/// Push the closed poll snapshot and the refreshed singleton to subscribers,
/// then drop the poll's channels. Subscribers drain the final snapshot before
/// they observe the close.
async fn publish_after_finish(state: &SharedState, store: &dyn PollStore, poll: &PollEntity) {
    state.feeds().publish_poll(poll.id, Some(poll.clone()));

    match store.active_status().await {
        Ok(status) => state.feeds().publish_status(status),
        Err(err) => warn!(error = %err, "failed to refresh status feed"),
    }

    state.feeds().retire_poll(poll.id);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::poll_store::memory::MemoryPollStore,
        state::AppState,
    };

    async fn test_state() -> SharedState {
        let directory = Arc::new(AppConfig::default().user_directory());
        let state = AppState::new(directory);
        state
            .install_poll_store(Arc::new(MemoryPollStore::new()))
            .await;
        state
    }

    fn create_request(name: &str, creator: &str, others: &[&str]) -> CreatePollRequest {
        CreatePollRequest {
            name: name.to_owned(),
            creator_id: creator.to_owned(),
            participant_ids: others.iter().map(|id| (*id).to_owned()).collect(),
        }
    }

    async fn create_sample_poll(state: &SharedState) -> PollSummary {
        create_poll(state, create_request("Lunch Pick", "user1", &["user2", "user3"]))
            .await
            .unwrap()
            .poll
    }

    fn vote(voter: &str, voted_for: &str) -> VoteRequest {
        VoteRequest {
            voter_id: voter.to_owned(),
            voted_for_id: voted_for.to_owned(),
        }
    }

    fn action(requested_by: &str) -> PollActionRequest {
        PollActionRequest {
            requested_by: requested_by.to_owned(),
        }
    }

    #[tokio::test]
    async fn created_poll_is_active_with_creator_first() {
        let state = test_state().await;
        let poll = create_sample_poll(&state).await;

        assert_eq!(poll.status, "active");
        assert_eq!(poll.participants.len(), 3);
        assert_eq!(poll.participants[0].id, "user1");
        assert_eq!(poll.participants[0].display_name, "Alpha Player");
        assert!(poll.ended_at.is_none());
    }

    #[tokio::test]
    async fn second_create_conflicts_while_a_poll_is_active() {
        let state = test_state().await;
        create_sample_poll(&state).await;

        let err = create_poll(&state, create_request("Another", "user2", &["user3"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn short_name_is_rejected_with_field_error() {
        let state = test_state().await;

        let err = create_poll(&state, create_request("ab", "user1", &["user2"]))
            .await
            .unwrap_err();
        match err {
            ServiceError::Validation { fields, .. } => {
                assert!(fields.contains_key("name"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn whitespace_padding_does_not_satisfy_name_length() {
        let state = test_state().await;

        let err = create_poll(&state, create_request("  ab  ", "user1", &["user2"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation { .. }));
    }

    #[tokio::test]
    async fn unknown_creator_is_rejected() {
        let state = test_state().await;

        let err = create_poll(&state, create_request("Lunch Pick", "user99", &["user2"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation { .. }));
    }

    #[tokio::test]
    async fn unknown_participant_is_rejected() {
        let state = test_state().await;

        let err = create_poll(&state, create_request("Lunch Pick", "user1", &["user99"]))
            .await
            .unwrap_err();
        match err {
            ServiceError::Validation { fields, .. } => {
                assert!(fields.contains_key("participant_ids"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn creator_alone_is_not_enough() {
        let state = test_state().await;

        // The creator id repeated does not count as another participant.
        let err = create_poll(&state, create_request("Lunch Pick", "user1", &["user1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation { .. }));
    }

    #[tokio::test]
    async fn duplicate_participants_collapse() {
        let state = test_state().await;

        let poll = create_poll(
            &state,
            create_request("Lunch Pick", "user1", &["user2", "user2", "user1"]),
        )
        .await
        .unwrap()
        .poll;

        assert_eq!(poll.participants.len(), 2);
        assert_eq!(poll.participants[0].id, "user1");
        assert_eq!(poll.participants[1].id, "user2");
    }

    #[tokio::test]
    async fn failed_creation_releases_the_slot() {
        let state = test_state().await;

        let err = create_poll(&state, create_request("ab", "user1", &["user2"])).await;
        assert!(err.is_err());

        // Validation failed before the slot was claimed; creation still works.
        create_sample_poll(&state).await;
    }

    #[tokio::test]
    async fn vote_then_duplicate_vote() {
        let state = test_state().await;
        let poll = create_sample_poll(&state).await;

        let first = submit_vote(&state, poll.id, vote("user2", "user3"))
            .await
            .unwrap();
        assert!(first.success);

        let err = submit_vote(&state, poll.id, vote("user2", "user1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateVote(_)));
    }

    #[tokio::test]
    async fn vote_on_missing_poll_is_not_active() {
        let state = test_state().await;

        let err = submit_vote(&state, Uuid::new_v4(), vote("user2", "user3"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotActive(_)));
    }

    #[tokio::test]
    async fn vote_after_end_is_not_active() {
        let state = test_state().await;
        let poll = create_sample_poll(&state).await;

        end_poll(&state, poll.id, action("user1")).await.unwrap();

        let err = submit_vote(&state, poll.id, vote("user2", "user3"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotActive(_)));
    }

    #[tokio::test]
    async fn self_votes_and_outside_targets_are_accepted() {
        let state = test_state().await;
        let poll = create_sample_poll(&state).await;

        submit_vote(&state, poll.id, vote("user2", "user2"))
            .await
            .unwrap();
        submit_vote(&state, poll.id, vote("user3", "user7"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn non_creator_cannot_end() {
        let state = test_state().await;
        let poll = create_sample_poll(&state).await;

        let err = end_poll(&state, poll.id, action("user2")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));

        let unchanged = poll_by_id(&state, poll.id).await.unwrap();
        assert_eq!(unchanged.status, "active");
    }

    #[tokio::test]
    async fn non_creator_cannot_delete() {
        let state = test_state().await;
        let poll = create_sample_poll(&state).await;

        let err = delete_poll(&state, poll.id, action("user3"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));

        let unchanged = poll_by_id(&state, poll.id).await.unwrap();
        assert_eq!(unchanged.status, "active");
    }

    #[tokio::test]
    async fn ending_a_missing_poll_is_not_found() {
        let state = test_state().await;

        let err = end_poll(&state, Uuid::new_v4(), action("user1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn end_sets_ended_at_and_frees_the_slot() {
        let state = test_state().await;
        let poll = create_sample_poll(&state).await;

        let response = end_poll(&state, poll.id, action("user1")).await.unwrap();
        assert_eq!(response.status, "ended");

        let ended = poll_by_id(&state, poll.id).await.unwrap();
        assert!(ended.ended_at.is_some());

        // The slot is free again, so a second poll can open.
        create_poll(&state, create_request("Round Two", "user2", &["user3"]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn ended_poll_cannot_be_ended_or_deleted() {
        let state = test_state().await;
        let poll = create_sample_poll(&state).await;
        end_poll(&state, poll.id, action("user1")).await.unwrap();

        let err = end_poll(&state, poll.id, action("user1")).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotActive(_)));

        let err = delete_poll(&state, poll.id, action("user1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotActive(_)));
    }

    #[tokio::test]
    async fn delete_twice_is_a_no_op_success() {
        let state = test_state().await;
        let poll = create_sample_poll(&state).await;

        let first = delete_poll(&state, poll.id, action("user1")).await.unwrap();
        assert_eq!(first.status, "deleted");

        let second = delete_poll(&state, poll.id, action("user1")).await.unwrap();
        assert!(second.success);
        assert_eq!(second.status, "deleted");
    }

    #[tokio::test]
    async fn tally_zero_inits_every_participant() {
        let state = test_state().await;
        let poll = create_sample_poll(&state).await;

        submit_vote(&state, poll.id, vote("user2", "user3"))
            .await
            .unwrap();
        submit_vote(&state, poll.id, vote("user3", "user2"))
            .await
            .unwrap();
        end_poll(&state, poll.id, action("user1")).await.unwrap();

        let archive = past_polls(&state).await.unwrap();
        assert_eq!(archive.len(), 1);

        let tally = archive[0].tally.as_ref().unwrap();
        assert_eq!(tally.get("user1"), Some(&0));
        assert_eq!(tally.get("user2"), Some(&1));
        assert_eq!(tally.get("user3"), Some(&1));
        assert_eq!(tally.values().sum::<u32>(), 2);

        // Recomputing from the same votes yields the same counts.
        let again = past_polls(&state).await.unwrap();
        assert_eq!(again[0].tally, archive[0].tally);
    }

    #[tokio::test]
    async fn tally_counts_outside_targets_under_their_own_key() {
        let state = test_state().await;
        let poll = create_sample_poll(&state).await;

        submit_vote(&state, poll.id, vote("user2", "user7"))
            .await
            .unwrap();
        end_poll(&state, poll.id, action("user1")).await.unwrap();

        let archive = past_polls(&state).await.unwrap();
        let tally = archive[0].tally.as_ref().unwrap();
        assert_eq!(tally.get("user7"), Some(&1));
        assert_eq!(tally.values().sum::<u32>(), 1);
    }

    #[tokio::test]
    async fn deleted_polls_carry_no_tally() {
        let state = test_state().await;
        let poll = create_sample_poll(&state).await;

        submit_vote(&state, poll.id, vote("user2", "user3"))
            .await
            .unwrap();
        delete_poll(&state, poll.id, action("user1")).await.unwrap();

        let archive = past_polls(&state).await.unwrap();
        assert_eq!(archive.len(), 1);
        assert_eq!(archive[0].poll.status, "deleted");
        assert!(archive[0].tally.is_none());
    }

    #[tokio::test]
    async fn votes_feed_is_published_after_a_vote() {
        let state = test_state().await;
        let poll = create_sample_poll(&state).await;

        let mut receiver = state.feeds().subscribe_votes(poll.id).unwrap();
        submit_vote(&state, poll.id, vote("user2", "user3"))
            .await
            .unwrap();

        let votes = receiver.recv().await.unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].voter_id, "user2");
    }

    #[tokio::test]
    async fn finishing_a_poll_retires_its_feed_channels() {
        let state = test_state().await;
        let poll = create_sample_poll(&state).await;
        assert!(state.feeds().subscribe_poll(poll.id).is_some());
        assert!(state.feeds().subscribe_votes(poll.id).is_some());

        end_poll(&state, poll.id, action("user1")).await.unwrap();

        assert!(state.feeds().subscribe_poll(poll.id).is_none());
        assert!(state.feeds().subscribe_votes(poll.id).is_none());
    }

    #[tokio::test]
    async fn status_feed_returns_to_idle_after_end() {
        let state = test_state().await;
        let poll = create_sample_poll(&state).await;
        assert_eq!(state.feeds().current_status().active_poll_id, Some(poll.id));

        end_poll(&state, poll.id, action("user1")).await.unwrap();
        assert!(state.feeds().current_status().is_idle());
    }

    #[tokio::test]
    async fn degraded_state_rejects_operations() {
        let directory = Arc::new(AppConfig::default().user_directory());
        let state = AppState::new(directory);

        let err = create_poll(&state, create_request("Lunch Pick", "user1", &["user2"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Degraded));
    }

    #[tokio::test]
    async fn lunch_pick_scenario() {
        let state = test_state().await;

        let poll = create_sample_poll(&state).await;
        assert_eq!(poll.status, "active");
        assert_eq!(poll.participants.len(), 3);

        submit_vote(&state, poll.id, vote("user2", "user3"))
            .await
            .unwrap();
        submit_vote(&state, poll.id, vote("user3", "user2"))
            .await
            .unwrap();

        end_poll(&state, poll.id, action("user1")).await.unwrap();
        assert!(state.feeds().current_status().is_idle());

        let archive = past_polls(&state).await.unwrap();
        let tally = archive[0].tally.as_ref().unwrap();
        assert_eq!(tally.get("user1"), Some(&0));
        assert_eq!(tally.get("user2"), Some(&1));
        assert_eq!(tally.get("user3"), Some(&1));

        create_poll(&state, create_request("Dinner Pick", "user1", &["user2"]))
            .await
            .unwrap();
    }
}
