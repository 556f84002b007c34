//! Skill Core Library
//!
//! Event-driven skill handlers and the policy evaluation pipeline: subscription
//! facts and queries feed goal evaluators, results are diffed against the
//! previous run by content hash, stored write-once and transacted as entities.

pub mod async_client;
pub mod backend;
pub mod config;
pub mod continuation;
pub mod datasource;
pub mod digest;
pub mod error;
pub mod event;
pub mod handler;
pub mod metrics;
pub mod obs;
pub mod policy;
pub mod server;
pub mod status;
pub mod telemetry;
pub mod transact;
pub mod value;

pub use async_client::{AsyncQueryClient, AsyncQueryError, AsyncQueryRequest, AsyncQuerySubmitter};
pub use backend::{BackendError, HttpBackend, SkillBackend};
pub use config::SkillConfig;
pub use continuation::{AsyncResultMetadata, ContinuationError, ContinuationToken, EvaluationMetadata};
pub use datasource::{
    AsyncDataSource, ChainDataSource, DataSource, DataSourceError, DataSourceProvider,
    FixedDataProvider, FixedDataSource, GraphqlDataProvider, GraphqlDataSource, QueryResponse,
    QueryTarget, SubscriptionDataProvider, SubscriptionDataSource, Variables,
};
pub use digest::{canonical_json, compute_digest, DigestError};
pub use error::{Result, SkillError};
pub use event::{Configuration, SkillEvent};
pub use handler::{EventHandler, RequestContext};
pub use metrics::METRICS;
pub use policy::{
    EvaluationContext, EvaluatorRegistry, Goal, GoalEvaluationQueryResult, GoalEvaluator,
    ObjectEvaluationStorage, PolicyHandler, PolicyHandlerBuilder, StorageId,
};
pub use server::{run, start, Skill};
pub use status::{State, Status};
pub use telemetry::{init_tracing, TracingConfig};
pub use transact::{AttributeValue, Entity, HttpTransactor, Transaction, Transactor};
pub use value::{OneOrMany, Value, ValueMap};

pub use skill_state::{Environment, GcsConfig, GcsObjectStore, MemoryObjectStore, ObjectStore};
