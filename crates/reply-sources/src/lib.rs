pub mod event_log;
pub mod task_export;

use reply_core::config::AppConfig;
use reply_core::event::SourceKind;
use reply_core::source::{SourceId, SourceRegistry};
use std::sync::Arc;

/// Register an adapter for every enabled source in the config.
///
/// Task sources read a completed-task export; every other kind reads a
/// JSON-lines event log.
pub fn register_all(registry: &mut SourceRegistry, config: &AppConfig) {
    for source in config.enabled_sources() {
        let Some(path) = source.path.clone() else {
            tracing::warn!("Skipping source '{}': no path configured", source.id);
            continue;
        };
        let id = SourceId::new(source.id.clone());

        match source.kind {
            SourceKind::Task => {
                registry.register(Arc::new(task_export::TaskExportSource::new(id, path)));
            }
            kind => {
                registry.register(Arc::new(event_log::EventLogSource::new(id, kind, path)));
            }
        }
    }
}
