//! # Capability identifiers advertised by an engine.
//!
//! Computed once during init from the configuration, the saver and the
//! runtime's advertised features; never recomputed.
//!
//! | identifier (after the namespace)  | advertised when                |
//! |-----------------------------------|--------------------------------|
//! | `container-ordering`              | always                         |
//! | `essential-containers`            | always                         |
//! | `task-eni`                        | `eni_enabled`                  |
//! | `checkpoint`                      | the saver is durable           |
//! | `runtime.<feature>`               | per runtime feature            |

use std::sync::Arc;

use crate::core::EngineConfig;

pub(crate) const CONTAINER_ORDERING: &str = "container-ordering";
pub(crate) const ESSENTIAL_CONTAINERS: &str = "essential-containers";
pub(crate) const TASK_ENI: &str = "task-eni";
pub(crate) const CHECKPOINT: &str = "checkpoint";

/// Builds the sorted, de-duplicated capability list.
pub(crate) fn compute(
    config: &EngineConfig,
    durable_saver: bool,
    runtime_features: &[String],
) -> Arc<[String]> {
    let ns = config.capability_namespace.trim_end_matches('.');
    let mut caps: Vec<String> = [CONTAINER_ORDERING, ESSENTIAL_CONTAINERS]
        .into_iter()
        .chain(config.eni_enabled.then_some(TASK_ENI))
        .chain(durable_saver.then_some(CHECKPOINT))
        .map(|c| format!("{ns}.{c}"))
        .chain(
            runtime_features
                .iter()
                .filter(|f| !f.trim().is_empty())
                .map(|f| format!("{ns}.runtime.{}", f.trim())),
        )
        .collect();
    caps.sort_unstable();
    caps.dedup();
    caps.into()
}
