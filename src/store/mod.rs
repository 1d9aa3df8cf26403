pub mod fs;
pub mod pipelines;

use std::sync::Arc;

use crate::config::Config;
use crate::pipeline::build::BuildTrigger;
use crate::pipeline::lifecycle::PipelineLifecycle;
use crate::pipeline::registry::ActivePipelines;
use crate::secrets::Vault;
use pipelines::PipelineStore;

/// Everything a request handler needs, constructed once in `main` and injected.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub vault: Arc<Vault>,
    pub registry: Arc<ActivePipelines>,
    pub store: Arc<dyn PipelineStore>,
    pub builder: Arc<dyn BuildTrigger>,
    pub lifecycle: Arc<PipelineLifecycle>,
}
