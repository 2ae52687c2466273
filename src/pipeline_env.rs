//! Azure Pipelines environment: where the current build describes itself.
//!
//! When `buildboard report` runs as a pipeline step, the agent exposes the
//! running build through predefined variables. Explicit flags override all
//! of these.

use std::env;

/// Predefined variables of the running pipeline job. Unset or empty
/// variables are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineEnv {
    /// `SYSTEM_COLLECTIONURI`, e.g. `https://dev.azure.com/dnceng/`.
    pub collection_uri: Option<String>,
    /// `SYSTEM_TEAMPROJECT`.
    pub project: Option<String>,
    /// `BUILD_BUILDID`.
    pub build_id: Option<String>,
    /// `BUILD_DEFINITIONNAME`.
    pub definition_name: Option<String>,
    /// `AGENT_JOBSTATUS`.
    pub job_status: Option<String>,
}

impl PipelineEnv {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        Self {
            collection_uri: get("SYSTEM_COLLECTIONURI"),
            project: get("SYSTEM_TEAMPROJECT"),
            build_id: get("BUILD_BUILDID"),
            definition_name: get("BUILD_DEFINITIONNAME"),
            job_status: get("AGENT_JOBSTATUS"),
        }
    }

    /// Results page of a build in this pipeline's collection and project.
    ///
    /// Assumes the reported build lives in the same project as the running
    /// one, which holds for release pipelines queueing each other.
    pub fn build_url(&self, build_id: &str) -> Option<String> {
        let collection = self.collection_uri.as_deref()?;
        let project = self.project.as_deref()?;
        if build_id.is_empty() {
            return None;
        }
        let sep = if collection.ends_with('/') { "" } else { "/" };
        Some(format!(
            "{collection}{sep}{project}/_build/results?buildId={build_id}"
        ))
    }
}
