//! The remote resource client contract.
//!
//! Every call is asynchronous and yields either a result or a [`RemoteError`].
//! Implementations must be cheap to share: the bot holds one behind an `Arc`
//! and calls it from many lanes at once.

use std::future::Future;
use std::sync::Arc;

use crate::types::{ContextId, MemberId, Resource, ResourceId, ResourceKind};

/// Failure reported by a remote call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("remote returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Operations against the platform's resources.
pub trait ResourceClient: Send + Sync + 'static {
    /// Create a resource and return it once the platform confirms.
    fn create_resource(
        &self,
        name: &str,
        kind: ResourceKind,
        context: ContextId,
    ) -> impl Future<Output = Result<Resource, RemoteError>> + Send;

    fn delete_resource(&self, id: ResourceId) -> impl Future<Output = Result<(), RemoteError>> + Send;

    fn get_resource(&self, id: ResourceId) -> impl Future<Output = Result<Resource, RemoteError>> + Send;

    /// Move a connected member into `resource`.
    fn relocate_member(
        &self,
        member: MemberId,
        context: ContextId,
        resource: ResourceId,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    fn list_resources(
        &self,
        context: ContextId,
    ) -> impl Future<Output = Result<Vec<Resource>, RemoteError>> + Send;
}

impl<T: ResourceClient> ResourceClient for Arc<T> {
    fn create_resource(
        &self,
        name: &str,
        kind: ResourceKind,
        context: ContextId,
    ) -> impl Future<Output = Result<Resource, RemoteError>> + Send {
        (**self).create_resource(name, kind, context)
    }

    fn delete_resource(&self, id: ResourceId) -> impl Future<Output = Result<(), RemoteError>> + Send {
        (**self).delete_resource(id)
    }

    fn get_resource(&self, id: ResourceId) -> impl Future<Output = Result<Resource, RemoteError>> + Send {
        (**self).get_resource(id)
    }

    fn relocate_member(
        &self,
        member: MemberId,
        context: ContextId,
        resource: ResourceId,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send {
        (**self).relocate_member(member, context, resource)
    }

    fn list_resources(
        &self,
        context: ContextId,
    ) -> impl Future<Output = Result<Vec<Resource>, RemoteError>> + Send {
        (**self).list_resources(context)
    }
}
