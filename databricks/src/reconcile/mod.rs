//! Generic create/read/update/delete reconciliation against a remote API
//!
//! A [`Reconciler`] is built with its [`RemoteApi`] and configuration and
//! holds no other state, so one instance can serve concurrent lifecycle calls.

pub mod poll;

use crate::api::ApiError;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tfplug::Context;
use thiserror::Error;

pub use poll::{poll_until_ready, PollError, PollOutcome, Polled, StabilizationConfig};

/// Three-level `catalog.schema.name` identity of a catalog object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    pub catalog: String,
    pub schema: String,
    pub name: String,
}

impl QualifiedName {
    pub fn new(
        catalog: impl Into<String>,
        schema: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            catalog: catalog.into(),
            schema: schema.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid three-level name '{0}', expected catalog.schema.name")]
pub struct InvalidQualifiedName(pub String);

impl FromStr for QualifiedName {
    type Err = InvalidQualifiedName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        match parts.as_slice() {
            [catalog, schema, name]
                if !catalog.is_empty() && !schema.is_empty() && !name.is_empty() =>
            {
                Ok(Self::new(*catalog, *schema, *name))
            }
            _ => Err(InvalidQualifiedName(s.to_string())),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.catalog, self.schema, self.name)
    }
}

/// Outbound operations for one kind of remote object
///
/// `get_by_name` and `delete_by_name` must report an absent object as
/// [`ApiError::Missing`].
#[async_trait]
pub trait RemoteApi: Send + Sync {
    type Object: Send + Sync;
    type CreateRequest: Send + Sync;
    type UpdateRequest: Send + Sync;

    async fn create(
        &self,
        ctx: &Context,
        request: &Self::CreateRequest,
    ) -> Result<Self::Object, ApiError>;

    async fn get_by_name(
        &self,
        ctx: &Context,
        handle: &QualifiedName,
    ) -> Result<Self::Object, ApiError>;

    async fn update(
        &self,
        ctx: &Context,
        handle: &QualifiedName,
        request: &Self::UpdateRequest,
    ) -> Result<Self::Object, ApiError>;

    async fn delete_by_name(&self, ctx: &Context, handle: &QualifiedName) -> Result<(), ApiError>;

    /// Identity of an object returned by the API
    fn handle_of(&self, object: &Self::Object) -> Result<QualifiedName, InvalidQualifiedName>;
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("{0}")]
    Create(ApiError),

    #[error("{0}")]
    Read(ApiError),

    #[error("{0}")]
    Update(ApiError),

    #[error("{0}")]
    Delete(ApiError),

    #[error("{handle} does not exist")]
    NotFound { handle: QualifiedName },

    #[error("{handle} is not yet available after {timeout:?} ({attempts} attempts)")]
    StabilizationTimeout {
        handle: QualifiedName,
        timeout: Duration,
        attempts: u32,
    },

    #[error("failed to get {handle}: {source}")]
    PollFatal {
        handle: QualifiedName,
        attempts: u32,
        source: ApiError,
    },

    #[error("cancelled while waiting for {handle}")]
    Cancelled { handle: QualifiedName },

    #[error(transparent)]
    InvalidHandle(#[from] InvalidQualifiedName),
}

impl ReconcileError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ReconcileError::NotFound { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Short resource name used in logs, e.g. `function`
    pub resource_name: &'static str,
    /// Wait for created objects to become readable. None returns the
    /// provisional create response as-is.
    pub stabilization: Option<StabilizationConfig>,
}

pub struct Reconciler<A> {
    api: A,
    config: ReconcilerConfig,
}

impl<A: RemoteApi> Reconciler<A> {
    pub fn new(api: A, config: ReconcilerConfig) -> Self {
        Self { api, config }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Creates the object and, when configured, waits until it is readable.
    /// The converged object from the wait replaces the create response.
    pub async fn create(
        &self,
        ctx: &Context,
        desired: &A::CreateRequest,
    ) -> Result<A::Object, ReconcileError> {
        let resource = self.config.resource_name;

        let provisional = self.api.create(ctx, desired).await.map_err(|e| {
            tracing::warn!(resource, error = %e, "create failed");
            ReconcileError::Create(e)
        })?;

        let handle = self.api.handle_of(&provisional)?;
        tracing::info!(resource, handle = %handle, "created");

        match &self.config.stabilization {
            Some(stabilization) => self.wait_until_ready(ctx, &handle, stabilization).await,
            None => Ok(provisional),
        }
    }

    /// Polls `get_by_name` until the object exists. Missing keeps polling,
    /// any other error stops immediately.
    pub async fn wait_until_ready(
        &self,
        ctx: &Context,
        handle: &QualifiedName,
        stabilization: &StabilizationConfig,
    ) -> Result<A::Object, ReconcileError> {
        let resource = self.config.resource_name;
        let api = &self.api;

        let result = poll_until_ready(ctx, stabilization, move || async move {
            match api.get_by_name(ctx, handle).await {
                Ok(object) => PollOutcome::Ready(object),
                Err(e) if e.is_missing() => PollOutcome::NotYetAvailable(e),
                Err(e) => PollOutcome::Fatal(e),
            }
        })
        .await;

        match result {
            Ok(polled) => {
                tracing::debug!(
                    resource,
                    handle = %handle,
                    attempts = polled.attempts,
                    elapsed = ?polled.elapsed,
                    "stabilized"
                );
                Ok(polled.value)
            }
            Err(PollError::Timeout {
                timeout, attempts, ..
            }) => {
                tracing::warn!(resource, handle = %handle, attempts, "stabilization timed out");
                Err(ReconcileError::StabilizationTimeout {
                    handle: handle.clone(),
                    timeout,
                    attempts,
                })
            }
            Err(PollError::Fatal { attempts, error }) => {
                tracing::warn!(resource, handle = %handle, attempts, error = %error, "stabilization failed");
                Err(ReconcileError::PollFatal {
                    handle: handle.clone(),
                    attempts,
                    source: error,
                })
            }
            Err(PollError::Cancelled { attempts }) => {
                tracing::debug!(resource, handle = %handle, attempts, "stabilization cancelled");
                Err(ReconcileError::Cancelled {
                    handle: handle.clone(),
                })
            }
        }
    }

    /// Fetches the object. An absent object is `NotFound`, never `Read`.
    pub async fn read(
        &self,
        ctx: &Context,
        handle: &QualifiedName,
    ) -> Result<A::Object, ReconcileError> {
        let resource = self.config.resource_name;

        match self.api.get_by_name(ctx, handle).await {
            Ok(object) => Ok(object),
            Err(e) if e.is_missing() => {
                tracing::info!(resource, handle = %handle, "not found");
                Err(ReconcileError::NotFound {
                    handle: handle.clone(),
                })
            }
            Err(e) => {
                tracing::warn!(resource, handle = %handle, error = %e, "read failed");
                Err(ReconcileError::Read(e))
            }
        }
    }

    pub async fn update(
        &self,
        ctx: &Context,
        handle: &QualifiedName,
        desired: &A::UpdateRequest,
    ) -> Result<A::Object, ReconcileError> {
        let resource = self.config.resource_name;

        let updated = self.api.update(ctx, handle, desired).await.map_err(|e| {
            tracing::warn!(resource, handle = %handle, error = %e, "update failed");
            ReconcileError::Update(e)
        })?;

        tracing::info!(resource, handle = %handle, "updated");
        Ok(updated)
    }

    /// Deletes the object. An already absent object counts as deleted.
    pub async fn delete(&self, ctx: &Context, handle: &QualifiedName) -> Result<(), ReconcileError> {
        let resource = self.config.resource_name;

        match self.api.delete_by_name(ctx, handle).await {
            Ok(()) => {
                tracing::info!(resource, handle = %handle, "deleted");
                Ok(())
            }
            Err(e) if e.is_missing() => {
                tracing::debug!(resource, handle = %handle, "already absent");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(resource, handle = %handle, error = %e, "delete failed");
                Err(ReconcileError::Delete(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct Widget {
        handle: QualifiedName,
        owner: String,
    }

    /// In-memory remote that can hide freshly created objects for a number
    /// of reads and fail reads outright
    #[derive(Default)]
    struct FakeApi {
        objects: Mutex<HashMap<QualifiedName, Widget>>,
        hidden_reads: AtomicU32,
        always_missing: bool,
        fail_reads: bool,
        get_calls: AtomicU32,
        update_calls: AtomicU32,
    }

    fn missing(handle: &QualifiedName) -> ApiError {
        ApiError::from_response(
            404,
            Some("RESOURCE_DOES_NOT_EXIST".to_string()),
            format!("{} does not exist", handle),
        )
    }

    #[async_trait]
    impl RemoteApi for FakeApi {
        type Object = Widget;
        type CreateRequest = Widget;
        type UpdateRequest = String;

        async fn create(&self, _ctx: &Context, request: &Widget) -> Result<Widget, ApiError> {
            if request.owner.is_empty() {
                return Err(ApiError::from_response(
                    400,
                    Some("INVALID_PARAMETER_VALUE".to_string()),
                    "owner is required".to_string(),
                ));
            }
            self.objects
                .lock()
                .unwrap()
                .insert(request.handle.clone(), request.clone());
            Ok(request.clone())
        }

        async fn get_by_name(&self, _ctx: &Context, handle: &QualifiedName) -> Result<Widget, ApiError> {
            self.get_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_reads {
                return Err(ApiError::from_response(403, None, "permission denied".to_string()));
            }
            if self.always_missing {
                return Err(missing(handle));
            }
            let hidden = self.hidden_reads.load(Ordering::SeqCst);
            if hidden > 0 {
                self.hidden_reads.store(hidden - 1, Ordering::SeqCst);
                return Err(missing(handle));
            }
            self.objects
                .lock()
                .unwrap()
                .get(handle)
                .cloned()
                .ok_or_else(|| missing(handle))
        }

        async fn update(
            &self,
            _ctx: &Context,
            handle: &QualifiedName,
            owner: &String,
        ) -> Result<Widget, ApiError> {
            self.update_calls.fetch_add(1, Ordering::SeqCst);
            let mut objects = self.objects.lock().unwrap();
            let widget = objects.get_mut(handle).ok_or_else(|| missing(handle))?;
            widget.owner = owner.clone();
            Ok(widget.clone())
        }

        async fn delete_by_name(&self, _ctx: &Context, handle: &QualifiedName) -> Result<(), ApiError> {
            self.objects
                .lock()
                .unwrap()
                .remove(handle)
                .map(|_| ())
                .ok_or_else(|| missing(handle))
        }

        fn handle_of(&self, object: &Widget) -> Result<QualifiedName, InvalidQualifiedName> {
            Ok(object.handle.clone())
        }
    }

    fn fast_config() -> ReconcilerConfig {
        ReconcilerConfig {
            resource_name: "widget",
            stabilization: Some(StabilizationConfig {
                timeout: Duration::from_millis(150),
                interval: Duration::from_millis(10),
            }),
        }
    }

    fn widget(name: &str) -> Widget {
        Widget {
            handle: QualifiedName::new("main", "default", name),
            owner: "admins".to_string(),
        }
    }

    #[test]
    fn qualified_name_parses_and_displays() {
        let name: QualifiedName = "main.default.function_a".parse().unwrap();
        assert_eq!(name, QualifiedName::new("main", "default", "function_a"));
        assert_eq!(name.to_string(), "main.default.function_a");
    }

    #[test]
    fn qualified_name_rejects_malformed_input() {
        for bad in ["", "main", "main.default", "main..f", "a.b.c.d", ".b.c"] {
            assert_eq!(
                bad.parse::<QualifiedName>(),
                Err(InvalidQualifiedName(bad.to_string())),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[tokio::test]
    async fn create_waits_through_missing_polls() {
        let api = FakeApi {
            hidden_reads: AtomicU32::new(2),
            ..Default::default()
        };
        let reconciler = Reconciler::new(api, fast_config());

        let created = reconciler
            .create(&Context::new(), &widget("function_a"))
            .await
            .unwrap();

        assert_eq!(created, widget("function_a"));
        assert_eq!(reconciler.api().get_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn create_without_stabilization_returns_provisional_object() {
        let config = ReconcilerConfig {
            resource_name: "widget",
            stabilization: None,
        };
        let reconciler = Reconciler::new(FakeApi::default(), config);

        reconciler
            .create(&Context::new(), &widget("f"))
            .await
            .unwrap();
        assert_eq!(reconciler.api().get_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn create_times_out_when_object_never_appears() {
        let api = FakeApi {
            always_missing: true,
            ..Default::default()
        };
        let reconciler = Reconciler::new(api, fast_config());
        let started = std::time::Instant::now();

        let err = reconciler
            .create(&Context::new(), &widget("ghost"))
            .await
            .unwrap_err();

        assert!(started.elapsed() >= Duration::from_millis(150));
        match err {
            ReconcileError::StabilizationTimeout {
                handle, attempts, ..
            } => {
                assert_eq!(handle.to_string(), "main.default.ghost");
                assert!(attempts > 1);
            }
            other => panic!("Expected StabilizationTimeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn create_halts_on_fatal_poll_error() {
        let api = FakeApi {
            fail_reads: true,
            ..Default::default()
        };
        let reconciler = Reconciler::new(api, fast_config());

        let err = reconciler
            .create(&Context::new(), &widget("locked"))
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::PollFatal { attempts: 1, .. }));
        assert_eq!(
            err.to_string(),
            "failed to get main.default.locked: API returned error (HTTP 403): permission denied"
        );
        assert_eq!(reconciler.api().get_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn create_reports_api_failure_without_polling() {
        let reconciler = Reconciler::new(FakeApi::default(), fast_config());
        let mut request = widget("f");
        request.owner.clear();

        let err = reconciler
            .create(&Context::new(), &request)
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Create(_)));
        assert!(err.to_string().contains("owner is required"));
        assert_eq!(reconciler.api().get_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn create_stops_waiting_when_cancelled() {
        let api = FakeApi {
            always_missing: true,
            ..Default::default()
        };
        let config = ReconcilerConfig {
            resource_name: "widget",
            stabilization: Some(StabilizationConfig::default()),
        };
        let reconciler = Reconciler::new(api, config);
        let ctx = Context::new().with_timeout(Duration::from_millis(50));

        let started = std::time::Instant::now();
        let err = reconciler.create(&ctx, &widget("slow")).await.unwrap_err();

        assert!(matches!(err, ReconcileError::Cancelled { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn read_missing_object_is_not_found() {
        let reconciler = Reconciler::new(FakeApi::default(), fast_config());

        let err = reconciler
            .read(&Context::new(), &QualifiedName::new("main", "default", "nope"))
            .await
            .unwrap_err();

        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn read_other_failures_are_read_errors() {
        let api = FakeApi {
            fail_reads: true,
            ..Default::default()
        };
        let reconciler = Reconciler::new(api, fast_config());

        let err = reconciler
            .read(&Context::new(), &QualifiedName::new("main", "default", "f"))
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Read(_)));
    }

    #[tokio::test]
    async fn create_then_read_round_trips() {
        let reconciler = Reconciler::new(FakeApi::default(), fast_config());
        let ctx = Context::new();

        let created = reconciler.create(&ctx, &widget("f")).await.unwrap();
        let read = reconciler.read(&ctx, &created.handle).await.unwrap();

        assert_eq!(created, read);
    }

    #[tokio::test]
    async fn update_changes_mutable_fields() {
        let reconciler = Reconciler::new(FakeApi::default(), fast_config());
        let ctx = Context::new();
        let created = reconciler.create(&ctx, &widget("f")).await.unwrap();

        let updated = reconciler
            .update(&ctx, &created.handle, &"data-eng".to_string())
            .await
            .unwrap();

        assert_eq!(updated.owner, "data-eng");
        assert_eq!(updated.handle, created.handle);
    }

    #[tokio::test]
    async fn update_of_missing_object_is_update_error() {
        let reconciler = Reconciler::new(FakeApi::default(), fast_config());

        let err = reconciler
            .update(
                &Context::new(),
                &QualifiedName::new("main", "default", "gone"),
                &"x".to_string(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Update(_)));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let reconciler = Reconciler::new(FakeApi::default(), fast_config());
        let ctx = Context::new();
        let created = reconciler.create(&ctx, &widget("f")).await.unwrap();

        tokio_test::assert_ok!(reconciler.delete(&ctx, &created.handle).await);
        tokio_test::assert_ok!(reconciler.delete(&ctx, &created.handle).await);

        assert!(reconciler
            .read(&ctx, &created.handle)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn concurrent_creates_share_one_reconciler() {
        let reconciler = Reconciler::new(FakeApi::default(), fast_config());
        let ctx = Context::new();
        let requests: Vec<Widget> = (0..8).map(|i| widget(&format!("f{}", i))).collect();

        let results =
            futures::future::join_all(requests.iter().map(|w| reconciler.create(&ctx, w))).await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(reconciler.api().objects.lock().unwrap().len(), 8);
    }
}
