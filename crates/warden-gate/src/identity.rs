//! Caller identity scoped to the current task.
//!
//! Request handlers wrap their work in [`with_identity`]; the unit of work
//! captures [`current_identity`] when it begins and hands it to the bridge
//! explicitly, since neither blocking threads nor the bridge's own runtime
//! inherit task-local state.

use std::future::Future;

use warden_types::CallerIdentity;

tokio::task_local! {
    static CALLER: CallerIdentity;
}

/// Run `fut` with `identity` as the current caller.
pub async fn with_identity<F>(identity: CallerIdentity, fut: F) -> F::Output
where
    F: Future,
{
    CALLER.scope(identity, fut).await
}

/// The current caller, or an anonymous identity outside any scope.
pub fn current_identity() -> CallerIdentity {
    CALLER.try_with(Clone::clone).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_types::Actor;

    #[tokio::test]
    async fn scope_sets_and_restores_identity() {
        assert_eq!(current_identity(), CallerIdentity::anonymous());

        let identity = CallerIdentity::new(Actor::new(7, "ops@example.com", "operator"))
            .with_trace_id("req-1");
        let seen = with_identity(identity.clone(), async { current_identity() }).await;
        assert_eq!(seen, identity);

        assert_eq!(current_identity().actor, None);
    }
}
