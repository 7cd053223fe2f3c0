use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

/// Result alias for MongoDB backend operations.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures specific to the MongoDB backend, each wrapping the driver error.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// The connection URI could not be parsed.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// The offending URI.
        uri: String,
        /// Driver-level parse failure.
        #[source]
        source: MongoError,
    },
    /// Client construction from parsed options failed.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Driver-level failure.
        #[source]
        source: MongoError,
    },
    /// The initial connectivity ping never succeeded.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        /// Number of attempts made before giving up.
        attempts: u32,
        /// Last ping failure.
        #[source]
        source: MongoError,
    },
    /// A routine health-check ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Driver-level failure.
        #[source]
        source: MongoError,
    },
    /// Index creation failed at startup.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Collection the index belongs to.
        collection: &'static str,
        /// Index key description.
        index: &'static str,
        /// Driver-level failure.
        #[source]
        source: MongoError,
    },
    /// Writing a poll document failed.
    #[error("failed to save poll `{id}`")]
    SavePoll {
        /// Poll primary key.
        id: Uuid,
        /// Driver-level failure.
        #[source]
        source: MongoError,
    },
    /// Reading a poll document failed.
    #[error("failed to load poll `{id}`")]
    LoadPoll {
        /// Poll primary key.
        id: Uuid,
        /// Driver-level failure.
        #[source]
        source: MongoError,
    },
    /// The archived-polls query failed.
    #[error("failed to list past polls")]
    ListPastPolls {
        /// Driver-level failure.
        #[source]
        source: MongoError,
    },
    /// The terminal-status flip for a poll failed.
    #[error("failed to finish poll `{id}`")]
    FinishPoll {
        /// Poll primary key.
        id: Uuid,
        /// Driver-level failure.
        #[source]
        source: MongoError,
    },
    /// Writing a vote document failed.
    #[error("failed to save vote by `{voter_id}` in poll `{poll_id}`")]
    SaveVote {
        /// Poll the vote belongs to.
        poll_id: Uuid,
        /// Voting user.
        voter_id: String,
        /// Driver-level failure.
        #[source]
        source: MongoError,
    },
    /// Reading votes for a poll failed.
    #[error("failed to load votes for poll `{poll_id}`")]
    LoadVotes {
        /// Poll the votes belong to.
        poll_id: Uuid,
        /// Driver-level failure.
        #[source]
        source: MongoError,
    },
    /// Reading the active-poll status document failed.
    #[error("failed to load active poll status")]
    LoadStatus {
        /// Driver-level failure.
        #[source]
        source: MongoError,
    },
    /// Writing the active-poll status document failed.
    #[error("failed to update active poll status")]
    UpdateStatus {
        /// Driver-level failure.
        #[source]
        source: MongoError,
    },
}
