//! Cluster prerequisite orchestration
//!
//! The e2e suites need the Prometheus operator and OLM. A run installs each
//! one only if the cluster does not already serve its resource kinds, and at
//! teardown removes only what it installed itself.

use std::thread;
use std::time::{Duration, Instant};

use tracing::info;

use crate::capability::CommandRunner;
use crate::context::{warn_on_output_error, PrerequisiteState, TestContext};
use crate::error::ToolError;

/// Resource kind served once the Prometheus operator is installed.
pub const PROMETHEUS_RESOURCE: &str = "servicemonitors";

/// Resource kind served once OLM is installed.
pub const OLM_RESOURCE: &str = "clusterserviceversions";

/// Which prerequisites a cluster already provides, from `kubectl api-resources` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterPrerequisites {
    pub has_prometheus: bool,
    pub has_olm: bool,
}

impl ClusterPrerequisites {
    pub fn from_api_resources(output: &str) -> Self {
        Self {
            has_prometheus: output.contains(PROMETHEUS_RESOURCE),
            has_olm: output.contains(OLM_RESOURCE),
        }
    }
}

/// Ask the cluster which prerequisites it already serves.
pub fn check_prerequisites<R: CommandRunner>(
    tc: &TestContext<R>,
) -> Result<ClusterPrerequisites, ToolError> {
    info!("checking API resources applied on cluster");
    let output = tc.kubectl.api_resources(&tc.runner)?;
    Ok(ClusterPrerequisites::from_api_resources(&output))
}

/// Install the Prometheus operator and OLM where the cluster lacks them.
///
/// On entry `tc.prerequisites` says which prerequisites this run may manage.
/// On return it records only the ones that were actually installed, so
/// [`uninstall_prerequisites`] never removes something it did not put there,
/// even when an install step fails halfway.
pub fn install_prerequisites<R: CommandRunner>(tc: &mut TestContext<R>) -> Result<(), ToolError> {
    let allowed = tc.prerequisites;
    tc.prerequisites = PrerequisiteState::unmanaged();

    let present = check_prerequisites(tc)?;

    if allowed.prometheus_managed_by_suite && !present.has_prometheus {
        info!("installing Prometheus");
        tc.prometheus.install(&tc.runner, &tc.kubectl)?;
        tc.prerequisites.prometheus_managed_by_suite = true;

        info!("ensuring provisioned Prometheus Manager Service");
        let settings = &tc.config.prometheus;
        wait_until(
            Duration::from_secs(settings.ready_timeout_secs),
            Duration::from_secs(settings.poll_interval_secs),
            "Service prometheus-operator",
            || tc.prometheus.service_ready(&tc.runner, &tc.kubectl),
        )?;
    }

    if allowed.olm_managed_by_suite && !present.has_olm {
        info!("installing OLM");
        tc.install_olm_version(&tc.config.olm.version)?;
        tc.prerequisites.olm_managed_by_suite = true;
    }

    Ok(())
}

/// Remove whatever [`install_prerequisites`] installed.
///
/// Failures are logged as warnings; teardown always runs to completion.
pub fn uninstall_prerequisites<R: CommandRunner>(tc: &TestContext<R>) {
    if tc.prerequisites.prometheus_managed_by_suite {
        info!("uninstalling Prometheus");
        warn_on_output_error(
            tc.prometheus.uninstall(&tc.runner, &tc.kubectl),
            "uninstalling Prometheus",
        );
    }
    if tc.prerequisites.olm_managed_by_suite {
        info!("uninstalling OLM");
        tc.uninstall_olm();
    }
}

/// Poll `ready` every `interval` until it returns true or `timeout` elapses.
///
/// `ready` is always called at least once.
pub fn wait_until<F>(
    timeout: Duration,
    interval: Duration,
    what: &str,
    mut ready: F,
) -> Result<(), ToolError>
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    loop {
        if ready() {
            return Ok(());
        }
        let waited = start.elapsed();
        if waited >= timeout {
            return Err(ToolError::Timeout {
                what: what.to_string(),
                waited,
            });
        }
        thread::sleep(interval.min(timeout - waited));
    }
}
