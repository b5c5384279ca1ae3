//! The ordered request pipeline.
//!
//! Admission (`admit`) runs for every gated request. Filesystem operations
//! then go through `execute_fs`, which validates paths, checks permissions,
//! writes exactly one audit record and runs the operation.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::http::HeaderMap;
use tokio::task::JoinHandle;

use crate::audit::{AuditOutcome, AuditRecord};
use crate::error::GatewayError;
use crate::gateway::context::{Denial, FsContext, Rejection, RequestContext, Stage};
use crate::gateway::Gateway;
use crate::observability::metrics;
use crate::operations::{fs, FsOutput, FsRequest, Requirement};
use crate::security::{
    identity, permissions, resolve_client_key, ClientKey, PathSecurityError, SafePath,
};

impl Gateway {
    /// Identity, rate check and authentication, in that order.
    pub fn admit(
        &self,
        headers: &HeaderMap,
        origin: Option<IpAddr>,
    ) -> Result<RequestContext, Rejection> {
        let ctx = RequestContext::received();
        let ctx = self.resolve_identity(ctx, headers, origin);
        let ctx = self.check_rate(ctx)?;
        self.authenticate(ctx, headers)
    }

    pub fn resolve_identity(
        &self,
        mut ctx: RequestContext,
        headers: &HeaderMap,
        origin: Option<IpAddr>,
    ) -> RequestContext {
        ctx.client = Some(resolve_client_key(headers, origin));
        ctx.stage = Stage::IdentityResolved;
        ctx
    }

    pub fn check_rate(&self, mut ctx: RequestContext) -> Result<RequestContext, Rejection> {
        let Some(client) = ctx.client.as_ref() else {
            return Err(Rejection {
                error: GatewayError::Internal("rate check ran before identity".to_string()),
                decision: None,
            });
        };

        let decision = self
            .limiter
            .admit(client, self.config.limit, self.window());
        ctx.decision = Some(decision);

        if !decision.allowed {
            tracing::warn!(
                client = %client,
                limit = self.config.limit,
                window_secs = self.config.window_secs,
                "Rate limit exceeded"
            );
            metrics::record_rate_limited("window_exhausted");
            return Err(Rejection {
                error: GatewayError::RateLimited {
                    limit: self.config.limit,
                    window_secs: self.config.window_secs,
                    retry_after_secs: decision.retry_after_secs(Instant::now()),
                },
                decision: Some(decision),
            });
        }

        ctx.stage = Stage::RateChecked;
        Ok(ctx)
    }

    pub fn authenticate(
        &self,
        mut ctx: RequestContext,
        headers: &HeaderMap,
    ) -> Result<RequestContext, Rejection> {
        if let Some(expected) = &self.api_key {
            let error = match identity::api_key(headers) {
                None => Some(GatewayError::Authentication(
                    "API key is required. Provide it in the X-API-Key header.".to_string(),
                )),
                Some(presented) if presented != expected.as_str() => {
                    tracing::warn!(client = ?ctx.client, "Invalid API key attempt");
                    Some(GatewayError::PermissionDenied("Invalid API key".to_string()))
                }
                Some(_) => None,
            };
            if let Some(error) = error {
                return Err(Rejection {
                    error,
                    decision: ctx.decision,
                });
            }
        }

        ctx.stage = Stage::Authenticated;
        Ok(ctx)
    }

    /// Run the guarded sub-chain for one filesystem operation.
    pub async fn execute_fs(
        &self,
        client: &ClientKey,
        request: FsRequest,
    ) -> Result<FsOutput, GatewayError> {
        let ctx = FsContext::new(client.clone(), request);
        let mut ctx = match self
            .validate_paths(ctx)
            .and_then(|ctx| self.check_permissions(ctx))
        {
            Ok(ctx) => ctx,
            Err(denial) => {
                self.audit_denial(&denial);
                return Err(denial.error);
            }
        };

        self.execute(&mut ctx).await
    }

    pub fn validate_paths(&self, mut ctx: FsContext) -> Result<FsContext, Box<Denial>> {
        let source = match self.validator.validate(ctx.request.raw_path()) {
            Ok(path) => path,
            Err(e) => return Err(self.path_rejected(ctx, e)),
        };
        ctx.source = Some(source);

        if let Some(raw) = ctx.request.raw_destination() {
            let destination = match self.validator.validate(raw) {
                Ok(path) => path,
                Err(e) => return Err(self.path_rejected(ctx, e)),
            };
            if ctx.source.as_ref() == Some(&destination) {
                return Err(Box::new(Denial {
                    ctx,
                    error: GatewayError::Validation(
                        "Source and destination paths are identical".to_string(),
                    ),
                }));
            }
            ctx.destination = Some(destination);
        }

        if let Err(error) = ctx.request.check_arguments() {
            return Err(Box::new(Denial { ctx, error }));
        }

        ctx.stage = Stage::PathValidated;
        Ok(ctx)
    }

    pub fn check_permissions(&self, mut ctx: FsContext) -> Result<FsContext, Box<Denial>> {
        let result = check_requirement(ctx.source.as_ref(), ctx.request.requirement()).and_then(
            |()| match ctx.request.destination_requirement() {
                Some(req) => check_requirement(ctx.destination.as_ref(), req),
                None => Ok(()),
            },
        );

        if let Err(error) = result {
            tracing::info!(
                client = %ctx.client,
                operation = %ctx.request.kind(),
                reason = %error,
                "Filesystem permission check failed"
            );
            return Err(Box::new(Denial { ctx, error }));
        }

        ctx.stage = Stage::PermissionChecked;
        Ok(ctx)
    }

    /// Audited → Executed. Waits for the operation started by `dispatch`.
    pub(crate) async fn execute(&self, ctx: &mut FsContext) -> Result<FsOutput, GatewayError> {
        let handle = self.dispatch(ctx);
        let result = handle.await?;
        ctx.stage = Stage::Executed;
        tracing::debug!(
            client = %ctx.client,
            operation = %ctx.request.kind(),
            ok = result.is_ok(),
            "Filesystem operation finished"
        );
        result
    }

    /// Audit then spawn, with no await in between: once the `allowed` record
    /// exists the operation runs to completion even if the caller is gone.
    fn dispatch(&self, ctx: &mut FsContext) -> JoinHandle<Result<FsOutput, GatewayError>> {
        self.audit.record(audit_record(ctx, AuditOutcome::Allowed));
        ctx.stage = Stage::Audited;

        let request = ctx.request.clone();
        let source = ctx.source.clone();
        let destination = ctx.destination.clone();
        let options = Arc::clone(&self.operations);

        tokio::spawn(async move {
            let Some(source) = source else {
                return Err(GatewayError::Internal(
                    "operation dispatched without a validated path".to_string(),
                ));
            };
            fs::execute(request, source, destination, &options).await
        })
    }

    fn path_rejected(&self, ctx: FsContext, error: PathSecurityError) -> Box<Denial> {
        tracing::warn!(
            client = %ctx.client,
            operation = %ctx.request.kind(),
            raw_path = ?ctx.request.raw_path(),
            reason = %error,
            "Path security violation"
        );
        metrics::record_path_rejected(error.reason());
        Box::new(Denial {
            ctx,
            error: error.into(),
        })
    }

    fn audit_denial(&self, denial: &Denial) {
        self.audit.record(
            audit_record(&denial.ctx, AuditOutcome::Denied).with_reason(denial.error.to_string()),
        );
    }
}

fn check_requirement(path: Option<&SafePath>, requirement: Requirement) -> Result<(), GatewayError> {
    let path = path.ok_or_else(|| {
        GatewayError::Internal("permission check ran before path validation".to_string())
    })?;
    match requirement {
        Requirement::File(grant) => permissions::check(path, grant)?,
        Requirement::Directory(grant) => permissions::check_directory(path, grant)?,
    }
    Ok(())
}

fn audit_record(ctx: &FsContext, outcome: AuditOutcome) -> AuditRecord {
    let destination = ctx
        .destination
        .as_ref()
        .map(ToString::to_string)
        .or_else(|| ctx.request.raw_destination().map(str::to_string));

    AuditRecord::new(&ctx.client, ctx.request.kind(), ctx.request.raw_path(), outcome)
        .with_resolved(ctx.source.as_ref().map(ToString::to_string))
        .with_destination(destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditLog, MemorySink, OperationKind};
    use crate::config::GatewayConfig;
    use crate::error::ErrorKind;
    use crate::gateway::StartupError;
    use crate::security::{RateLimiter, API_KEY_HEADER};
    use axum::http::HeaderValue;
    use std::sync::Arc;
    use std::time::Duration;

    struct Harness {
        _dir: tempfile::TempDir,
        gateway: Arc<Gateway>,
        sink: Arc<MemorySink>,
    }

    impl Harness {
        fn new(limit: u32) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let sink = Arc::new(MemorySink::new());
            let config = GatewayConfig {
                limit,
                window_secs: 60,
                safe_base_dir: dir.path().to_path_buf(),
            };
            let gateway = Gateway::new(
                config,
                Arc::new(RateLimiter::new(100)),
                AuditLog::new(sink.clone()),
            )
            .unwrap();
            Self {
                _dir: dir,
                gateway: Arc::new(gateway),
                sink,
            }
        }

        fn base(&self) -> &std::path::Path {
            self.gateway.validator().base()
        }

        fn client(&self) -> ClientKey {
            resolve_client_key(&HeaderMap::new(), Some("10.0.0.1".parse().unwrap()))
        }
    }

    #[test]
    fn test_admit_two_then_reject() {
        let h = Harness::new(2);
        let origin = Some("10.9.9.9".parse().unwrap());

        let first = h.gateway.admit(&HeaderMap::new(), origin).unwrap();
        assert_eq!(first.stage(), Stage::Authenticated);
        assert_eq!(first.decision().unwrap().remaining, 1);
        assert!(h.gateway.admit(&HeaderMap::new(), origin).is_ok());

        let rejection = h.gateway.admit(&HeaderMap::new(), origin).unwrap_err();
        assert_eq!(rejection.error.kind(), ErrorKind::RateLimit);
        assert_eq!(rejection.decision.unwrap().remaining, 0);
    }

    #[test]
    fn test_api_key_enforcement() {
        let dir = tempfile::tempdir().unwrap();
        let config = GatewayConfig {
            limit: 10,
            window_secs: 60,
            safe_base_dir: dir.path().to_path_buf(),
        };
        let gateway = Gateway::new(
            config,
            Arc::new(RateLimiter::new(100)),
            AuditLog::new(Arc::new(MemorySink::new())),
        )
        .unwrap()
        .with_api_key(Some("s3cret".to_string()));

        let missing = gateway.admit(&HeaderMap::new(), None).unwrap_err();
        assert_eq!(missing.error.status_code(), 401);
        assert!(missing.decision.is_some());

        let mut wrong = HeaderMap::new();
        wrong.insert(API_KEY_HEADER, HeaderValue::from_static("guess"));
        assert_eq!(gateway.admit(&wrong, None).unwrap_err().error.status_code(), 403);

        let mut right = HeaderMap::new();
        right.insert(API_KEY_HEADER, HeaderValue::from_static("s3cret"));
        let ctx = gateway.admit(&right, None).unwrap();
        assert_eq!(ctx.client().unwrap().as_str(), "key:s3cret");
    }

    #[test]
    fn test_zero_window_rejected_at_startup() {
        let dir = tempfile::tempdir().unwrap();
        let config = GatewayConfig {
            limit: 10,
            window_secs: 0,
            safe_base_dir: dir.path().to_path_buf(),
        };
        let result = Gateway::new(
            config,
            Arc::new(RateLimiter::new(10)),
            AuditLog::new(Arc::new(MemorySink::new())),
        );
        assert!(matches!(result, Err(StartupError::ZeroWindow)));
    }

    #[tokio::test]
    async fn test_read_is_audited_as_allowed() {
        let h = Harness::new(10);
        std::fs::write(h.base().join("notes.txt"), "hello").unwrap();

        let out = h
            .gateway
            .execute_fs(&h.client(), FsRequest::Read { path: "notes.txt".into() })
            .await
            .unwrap();
        assert!(matches!(out, FsOutput::Content { .. }));

        let records = h.sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].operation, OperationKind::Read);
        assert_eq!(records[0].outcome, AuditOutcome::Allowed);
        assert_eq!(
            records[0].resolved_path.as_deref(),
            Some(h.base().join("notes.txt").display().to_string().as_str())
        );
    }

    #[tokio::test]
    async fn test_traversal_denied_and_audited() {
        let h = Harness::new(10);
        let raw = format!("{}/../etc/passwd", h.base().display());

        let err = h
            .gateway
            .execute_fs(&h.client(), FsRequest::Read { path: raw.clone() })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);

        let records = h.sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, AuditOutcome::Denied);
        assert_eq!(records[0].raw_path, raw);
        assert!(records[0].resolved_path.is_none());
        assert!(records[0].reason.is_some());
    }

    #[tokio::test]
    async fn test_missing_file_denied_with_resolved_path() {
        let h = Harness::new(10);

        let err = h
            .gateway
            .execute_fs(&h.client(), FsRequest::Delete { path: "ghost.txt".into() })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);

        let records = h.sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, AuditOutcome::Denied);
        assert!(records[0].resolved_path.is_some());
    }

    #[tokio::test]
    async fn test_copy_onto_itself_rejected() {
        let h = Harness::new(10);
        std::fs::write(h.base().join("a.txt"), "x").unwrap();

        let err = h
            .gateway
            .execute_fs(
                &h.client(),
                FsRequest::Copy {
                    source: "a.txt".into(),
                    destination: "./a.txt".into(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(h.sink.records()[0].destination.as_deref(), Some("./a.txt"));
    }

    #[tokio::test]
    async fn test_copy_records_destination() {
        let h = Harness::new(10);
        std::fs::write(h.base().join("a.txt"), "x").unwrap();

        h.gateway
            .execute_fs(
                &h.client(),
                FsRequest::Copy {
                    source: "a.txt".into(),
                    destination: "b/a.txt".into(),
                },
            )
            .await
            .unwrap();

        let records = h.sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].destination.as_deref(),
            Some(h.base().join("b").join("a.txt").display().to_string().as_str())
        );
        assert!(h.base().join("b/a.txt").exists());
    }

    #[tokio::test]
    async fn test_every_attempt_audited_exactly_once() {
        let h = Harness::new(10);
        std::fs::write(h.base().join("a.txt"), "x").unwrap();
        let requests = vec![
            FsRequest::Read { path: "a.txt".into() },
            FsRequest::Read { path: "../a.txt".into() },
            FsRequest::List { path: ".".into() },
            FsRequest::Mkdir { path: "new".into() },
            FsRequest::Mkdir { path: "new".into() },
            FsRequest::Delete { path: "nope".into() },
            FsRequest::Move {
                source: "a.txt".into(),
                destination: "b.txt".into(),
            },
        ];
        let attempts = requests.len();

        for request in requests {
            let _ = h.gateway.execute_fs(&h.client(), request).await;
        }
        assert_eq!(h.sink.records().len(), attempts);
    }

    #[tokio::test]
    async fn test_stages_advance_to_executed() {
        let h = Harness::new(10);
        std::fs::write(h.base().join("a.txt"), "x").unwrap();

        let ctx = FsContext::new(h.client(), FsRequest::Read { path: "a.txt".into() });
        assert_eq!(ctx.stage(), Stage::RateChecked);

        let ctx = h.gateway.validate_paths(ctx).unwrap();
        assert_eq!(ctx.stage(), Stage::PathValidated);

        let mut ctx = h.gateway.check_permissions(ctx).unwrap();
        assert_eq!(ctx.stage(), Stage::PermissionChecked);

        h.gateway.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.stage(), Stage::Executed);
        assert_eq!(h.sink.records().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_marks_audited() {
        let h = Harness::new(10);
        std::fs::write(h.base().join("a.txt"), "x").unwrap();

        let ctx = FsContext::new(h.client(), FsRequest::Read { path: "a.txt".into() });
        let ctx = h.gateway.validate_paths(ctx).unwrap();
        let mut ctx = h.gateway.check_permissions(ctx).unwrap();

        let handle = h.gateway.dispatch(&mut ctx);
        assert_eq!(ctx.stage(), Stage::Audited);
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_bad_search_pattern_denied_before_execution() {
        let h = Harness::new(10);

        let err = h
            .gateway
            .execute_fs(
                &h.client(),
                FsRequest::Search {
                    path: ".".into(),
                    pattern: "a/b".into(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let records = h.sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].operation, OperationKind::Search);
        assert_eq!(records[0].outcome, AuditOutcome::Denied);
        assert!(records[0].resolved_path.is_some());
    }

    #[tokio::test]
    async fn test_delete_backup_written_by_audited_operation() {
        let h = Harness::new(10);
        let backups = tempfile::tempdir().unwrap();
        let gateway = Gateway::new(
            h.gateway.config().clone(),
            Arc::new(RateLimiter::new(10)),
            AuditLog::new(h.sink.clone()),
        )
        .unwrap()
        .with_operations(crate::config::OperationsConfig {
            delete_backup_dir: Some(backups.path().to_path_buf()),
            ..Default::default()
        });
        std::fs::write(h.base().join("draft.txt"), "v1").unwrap();

        let out = gateway
            .execute_fs(&h.client(), FsRequest::Delete { path: "draft.txt".into() })
            .await
            .unwrap();
        let FsOutput::Done { backup: Some(backup), .. } = out else {
            panic!("expected a backup");
        };
        assert_eq!(std::fs::read_to_string(backup).unwrap(), "v1");
        assert!(!h.base().join("draft.txt").exists());

        let records = h.sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, AuditOutcome::Allowed);
    }

    #[tokio::test]
    async fn test_cancelled_request_audit_matches_execution() {
        let h = Harness::new(10);
        let target = h.base().join("victim.txt");
        std::fs::write(&target, "x").unwrap();

        let gateway = h.gateway.clone();
        let client = h.client();
        let task = tokio::spawn(async move {
            gateway
                .execute_fs(&client, FsRequest::Delete { path: "victim.txt".into() })
                .await
        });
        tokio::task::yield_now().await;
        task.abort();
        let _ = task.await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        let records = h.sink.records();
        match records.as_slice() {
            [] => assert!(target.exists(), "operation ran without an audit record"),
            [record] => {
                assert_eq!(record.outcome, AuditOutcome::Allowed);
                assert!(!target.exists(), "audited operation did not run");
            }
            _ => panic!("more than one record for a single attempt"),
        }
    }
}
