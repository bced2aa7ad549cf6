use async_trait::async_trait;
use tonic::service::RoutesBuilder;

use crate::context::ServiceCtx;

/// A role the host can launch.
///
/// Lifecycle per launched service:
/// `before_run` → listener bound → `run` attaches handlers → server accepts
/// until the runtime is cancelled.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Pre-flight checks and warm-up. Runs before the listener is bound;
    /// an error here is fatal for the whole process.
    async fn before_run(&self, ctx: &ServiceCtx) -> anyhow::Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Attach RPC handlers. Pure wiring; must be sync.
    ///
    /// The server starts accepting once this returns.
    fn run(&self, ctx: &ServiceCtx, routes: &mut RoutesBuilder) -> anyhow::Result<()>;
}
