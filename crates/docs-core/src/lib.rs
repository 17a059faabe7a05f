//! Core orchestration for Narrabyte's documentation generation service:
//! the `Orchestrator`, its in-memory session/tab/reservation state, the
//! SQLite-backed `SessionStore`, the `EventBus`, and the org config layer
//! that ties a deployment to its registered projects.

pub mod branch_registry;
pub mod config;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod session;
pub mod store;
pub mod types;
pub mod validation;

pub use branch_registry::*;
pub use config::*;
pub use error::*;
pub use events::*;
pub use orchestrator::*;
pub use session::*;
pub use store::*;
pub use types::*;
pub use validation::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_root_reexports_core_types() {
        let project = Project {
            id: ProjectId::new("p1"),
            name: "demo".to_string(),
            code_root: std::path::PathBuf::from("/tmp/demo"),
            docs_root: std::path::PathBuf::from("/tmp/demo"),
            documentation_base_branch: None,
        };
        assert!(project.shared_with_code());

        let mut config = OrgConfig::default();
        config.upsert_project(project);
        assert!(config.project(&ProjectId::new("p1")).is_some());
    }

    #[test]
    fn crate_root_reexports_parse_helpers() {
        let org = parse_org_config(
            r#"
[http]
bind = "127.0.0.1:9842"
"#,
        )
        .expect("parse org");

        assert_eq!(org.http.bind, "127.0.0.1:9842");
    }
}
