use gantry_models::EngineApp;

use crate::domains::DesiredDomain;

/// Extension hook contributing nginx snippet lines to every synced
/// ingress. Deployments register plugins at start-up; both methods
/// default to contributing nothing.
pub trait IngressPlugin: Send + Sync {
    fn render_server_snippet(
        &self,
        _engine_app: &EngineApp,
        _domains: &[DesiredDomain],
    ) -> String {
        String::new()
    }

    fn render_configuration_snippet(
        &self,
        _engine_app: &EngineApp,
        _domains: &[DesiredDomain],
    ) -> String {
        String::new()
    }
}

/// Joins plugin contributions, skipping empty ones.
pub(crate) fn join_snippets(parts: Vec<String>) -> String {
    parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
