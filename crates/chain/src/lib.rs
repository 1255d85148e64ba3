//! Synchronous HTTP chains across collaborator services.
//!
//! An inbound request is fanned out to an ordered list of collaborator calls.
//! Every call carries the inbound trace headers and one shared request id,
//! and every call produces a [`ChainCallResult`], success or not:
//!
//! 1. [`TraceContext`] picks the allowlisted correlation headers
//! 2. [`ChainOrchestrator::run_chain`] attempts each [`CallSpec`] in order
//! 3. The [`ChainReport`] lists one result per step
//!
//! [`EventMeshForwarder`] covers the asynchronous direction: it re-emits
//! consumed events to an event mesh ingress as CloudEvents.

pub mod collaborator;
pub mod error;
pub mod forwarder;
pub mod orchestrator;
pub mod result;
pub mod trace;

pub use collaborator::{
    Collaborator, CollaboratorRequest, CollaboratorResponse, HttpCollaborator,
    InMemoryCollaborator,
};
pub use error::{ChainError, Result};
pub use forwarder::EventMeshForwarder;
pub use orchestrator::{CallSpec, ChainOrchestrator, InboundRequest, PayloadRule};
pub use result::{ChainCallResult, ChainReport};
pub use trace::{REQUEST_ID_HEADER, TRACE_HEADERS, TraceContext};
