//! Per-request values threaded through the pipeline steps.

use crate::error::GatewayError;
use crate::operations::FsRequest;
use crate::security::{ClientKey, Decision, SafePath};

/// Where a request currently is in the gateway state machine. A request
/// that stops at any stage is answered from there with an error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Received,
    IdentityResolved,
    RateChecked,
    Authenticated,
    PathValidated,
    PermissionChecked,
    Audited,
    Executed,
}

/// Admission state for one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub(crate) stage: Stage,
    pub(crate) client: Option<ClientKey>,
    pub(crate) decision: Option<Decision>,
}

impl RequestContext {
    pub fn received() -> Self {
        Self {
            stage: Stage::Received,
            client: None,
            decision: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn client(&self) -> Option<&ClientKey> {
        self.client.as_ref()
    }

    /// The rate limiter's verdict, once the rate check ran.
    pub fn decision(&self) -> Option<&Decision> {
        self.decision.as_ref()
    }
}

/// Why admission stopped, with the rate decision if one was made so the
/// response can still carry rate-limit headers.
#[derive(Debug)]
pub struct Rejection {
    pub error: GatewayError,
    pub decision: Option<Decision>,
}

/// State for one filesystem operation moving through the guarded sub-chain.
#[derive(Debug, Clone)]
pub struct FsContext {
    pub(crate) stage: Stage,
    pub(crate) client: ClientKey,
    pub(crate) request: FsRequest,
    pub(crate) source: Option<SafePath>,
    pub(crate) destination: Option<SafePath>,
}

impl FsContext {
    pub fn new(client: ClientKey, request: FsRequest) -> Self {
        Self {
            stage: Stage::RateChecked,
            client,
            request,
            source: None,
            destination: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn request(&self) -> &FsRequest {
        &self.request
    }
}

/// A filesystem attempt refused before execution.
#[derive(Debug)]
pub struct Denial {
    pub ctx: FsContext,
    pub error: GatewayError,
}
