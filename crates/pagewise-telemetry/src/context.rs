//! Span and scope identifying the running CLI command.
//!
//! # Design
//! - [`CommandSpan`] owns an entered span naming the command and build, so
//!   every event the process logs carries them.
//! - [`CommandScope`] travels with the command future in task-local storage.
//!   The HTTP backend reads it to tag outbound calls with the trace id and the
//!   resource being synchronized; log lines get the same fields through an
//!   instrumented span.

use std::future::Future;
use std::sync::Arc;

use tracing::Instrument;
use tracing::span::EnteredSpan;

use crate::init::build_sha;

/// Process-wide span naming the command; exits when dropped.
pub struct CommandSpan {
    _entered: EnteredSpan,
}

impl CommandSpan {
    /// Enter a `pagewise` span tagged with `command` and the build SHA.
    #[must_use]
    pub fn enter(command: &str) -> Self {
        let span = tracing::info_span!("pagewise", command, build_sha = %build_sha());
        Self {
            _entered: span.entered(),
        }
    }
}

/// Trace id and resource of one command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandScope {
    trace_id: Arc<str>,
    resource: Arc<str>,
}

impl CommandScope {
    /// Scope for `resource`, correlated by `trace_id`.
    #[must_use]
    pub fn new(trace_id: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            trace_id: Arc::from(trace_id.into()),
            resource: Arc::from(resource.into()),
        }
    }

    /// Correlation id sent with every backend request.
    #[must_use]
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Resource the command operates on.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Scope of the command currently running on this task, if any.
    #[must_use]
    pub fn current() -> Option<Self> {
        ACTIVE_COMMAND.try_with(Clone::clone).ok()
    }

    /// Run `fut` with this scope visible through [`CommandScope::current`].
    pub fn run<Fut>(self, fut: Fut) -> impl Future<Output = Fut::Output>
    where
        Fut: Future,
    {
        let span = tracing::info_span!(
            "command",
            trace_id = %self.trace_id,
            resource = %self.resource
        );
        ACTIVE_COMMAND.scope(self, fut.instrument(span))
    }
}

tokio::task_local! {
    static ACTIVE_COMMAND: CommandScope;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_span_can_be_entered_and_left() {
        let span = CommandSpan::enter("ls");
        tracing::info!("inside the command span");
        drop(span);
    }

    #[tokio::test]
    async fn scope_is_visible_only_inside_run() {
        assert!(CommandScope::current().is_none());
        let seen = CommandScope::new("trace-42", "subscribers")
            .run(async {
                tokio::task::yield_now().await;
                CommandScope::current()
            })
            .await
            .expect("scope visible inside run");
        assert_eq!(seen.trace_id(), "trace-42");
        assert_eq!(seen.resource(), "subscribers");
        assert!(CommandScope::current().is_none());
    }

    #[tokio::test]
    async fn nested_runs_shadow_the_outer_scope() {
        let outer = CommandScope::new("outer", "users");
        let resources = outer
            .run(async {
                let inner = CommandScope::new("inner", "inventory")
                    .run(async { CommandScope::current().map(|scope| scope.resource().to_string()) })
                    .await;
                let after = CommandScope::current().map(|scope| scope.resource().to_string());
                (inner, after)
            })
            .await;
        assert_eq!(
            resources,
            (Some("inventory".to_string()), Some("users".to_string()))
        );
    }
}
