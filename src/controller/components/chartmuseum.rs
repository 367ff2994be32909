//! Chart museum, not built yet.

use crate::controller::reconciler::{ChildComposer, ComposeOutcome, ReconcilerError};
use crate::controller::resources::ResourceManager;
use crate::crd::{ChartMuseum, ChildKind};
use async_trait::async_trait;
use kube::ResourceExt;

#[derive(Debug, Default)]
pub struct ChartMuseumComposer;

#[async_trait]
impl ChildComposer<ChartMuseum> for ChartMuseumComposer {
    fn owned_kinds(&self) -> &'static [ChildKind] {
        &[]
    }

    async fn compose(
        &self,
        chart_museum: &ChartMuseum,
        resources: &ResourceManager,
    ) -> Result<ComposeOutcome, ReconcilerError> {
        resources.ensure_active()?;
        Err(ReconcilerError::Unimplemented(format!(
            "chart museum {}",
            chart_museum.name_any()
        )))
    }
}
