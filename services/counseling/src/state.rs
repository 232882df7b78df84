//! Application state shared across handlers

use std::sync::Arc;

use crate::{
    codes::CodeService, mappings::MappingService, repositories::Store,
    workflow::ExtensionWorkflow,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub workflow: ExtensionWorkflow,
    pub mappings: MappingService,
    pub codes: CodeService,
}
