use mongodb::error::Error as MongoError;
use thiserror::Error;

use crate::mention::{ContentRef, EntityRef};

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to allocate next id of sequence `{sequence}`")]
    NextId {
        sequence: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to save directory entry `{target}`")]
    SaveEntity {
        target: EntityRef,
        #[source]
        source: MongoError,
    },
    #[error("failed to query collection `{collection}`")]
    QueryDirectory {
        collection: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to save content `{owner}`")]
    SaveContent {
        owner: ContentRef,
        #[source]
        source: MongoError,
    },
    #[error("failed to load content `{owner}`")]
    LoadContent {
        owner: ContentRef,
        #[source]
        source: MongoError,
    },
    #[error("failed to delete content `{owner}`")]
    DeleteContent {
        owner: ContentRef,
        #[source]
        source: MongoError,
    },
    #[error("failed to save mention `{id}`")]
    SaveMention {
        id: i64,
        #[source]
        source: MongoError,
    },
    #[error("failed to update mention `{id}`")]
    UpdateMention {
        id: i64,
        #[source]
        source: MongoError,
    },
    #[error("failed to query mentions")]
    QueryMentions {
        #[source]
        source: MongoError,
    },
    #[error("failed to delete mentions")]
    DeleteMentions {
        #[source]
        source: MongoError,
    },
    #[error("unexpected document shape in `{collection}`: {reason}")]
    Decode {
        collection: &'static str,
        reason: String,
    },
}
