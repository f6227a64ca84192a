//! Transactional execution core for a distributed in-memory property-graph
//! database: MVCC-versioned storage, a message-driven expert/pipeline
//! execution engine, and optimistic concurrency control (spec.md §1).
//!
//! Cluster transaction-id/timestamp allocation, cross-machine transport,
//! query compilation, bulk loading, and background GC are external
//! collaborators reached through the [`txn::trx_client::TrxClient`],
//! [`id_mapper::IdMapper`], [`mailbox::Mailbox`], and [`gc::GCProducer`]
//! traits respectively; this crate owns everything behind them.

pub mod alloc;
pub mod config;
pub mod engine;
pub mod error;
pub mod experts;
pub mod gc;
pub mod id_mapper;
pub mod ids;
pub mod mailbox;
pub mod mvcc;
pub mod plan;
pub mod storage;
pub mod txn;

pub use config::{Config, IsoLevel};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use gc::{GCProducer, NoopGc, RetireHint};
pub use id_mapper::{IdMapper, ModuloIdMapper};
pub use ids::{Eid, ElementKind, Pid, Timestamp, TrxId, Vid};
pub use mailbox::{LocalMailbox, Mailbox, Notification};
pub use plan::{Expert, ExpertType, Message, Meta, Plan, TrxType, Value};
pub use storage::{Graph, ProcessStat, ReadStat};
pub use txn::{InMemoryMaster, TrxClient, TrxStat};
