//! Per-run e2e test context
//!
//! A [`TestContext`] carries everything one suite run needs: the scaffolded
//! project directory, derived image names, tool wrappers, and which cluster
//! prerequisites this run is responsible for.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use uuid::Uuid;

use crate::capability::{CommandRunner, SystemRunner};
use crate::cluster::{CmdContext, Kind, Kubectl, Olm, Prometheus};
use crate::config::SuiteConfig;
use crate::error::ToolError;
use crate::file_patcher::prepend_to_file;

/// Line prepended to PROJECT to allow APIs in several groups.
pub const MULTIGROUP_LINE: &str = "multigroup: true\n";

/// Project metadata file written by the scaffolding CLI.
pub const PROJECT_FILE: &str = "PROJECT";

/// Which prerequisites the current run manages.
///
/// Before [`crate::install_prerequisites`] the flags say what the run may
/// install; afterwards they say what it did install and must remove again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrerequisiteState {
    pub prometheus_managed_by_suite: bool,
    pub olm_managed_by_suite: bool,
}

impl PrerequisiteState {
    /// The run may install both prerequisites.
    pub fn managed() -> Self {
        Self {
            prometheus_managed_by_suite: true,
            olm_managed_by_suite: true,
        }
    }

    pub fn unmanaged() -> Self {
        Self {
            prometheus_managed_by_suite: false,
            olm_managed_by_suite: false,
        }
    }
}

pub fn make_image_name(project_name: &str) -> String {
    format!("quay.io/example/{project_name}:v0.0.1")
}

pub fn make_bundle_image_name(project_name: &str) -> String {
    format!("quay.io/example/{project_name}-bundle:v0.0.1")
}

fn project_name_from_dir(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn random_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..6].to_string()
}

pub struct TestContext<R: CommandRunner = SystemRunner> {
    pub runner: R,
    pub config: SuiteConfig,
    pub dir: PathBuf,
    pub project_name: String,
    pub image_name: String,
    pub bundle_image_name: String,
    pub kubectl: Kubectl,
    pub kind: Kind,
    pub olm: Olm,
    pub prometheus: Prometheus,
    pub prerequisites: PrerequisiteState,
}

impl<R: CommandRunner> TestContext<R> {
    /// Create a context backed by a fresh `e2e-<suffix>` project directory under `work_root`.
    ///
    /// The run starts out owning both prerequisites.
    pub fn new<I, K, V>(
        runner: R,
        config: SuiteConfig,
        work_root: &Path,
        env: I,
    ) -> Result<Self, ToolError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let suffix = random_suffix();
        let dir = work_root.join(format!("e2e-{suffix}"));
        fs::create_dir_all(&dir).map_err(|source| ToolError::Io {
            path: dir.clone(),
            source,
        })?;
        info!("created project directory {}", dir.display());

        let namespace = format!("e2e-{suffix}-system");
        Ok(Self::assemble(
            runner,
            config,
            dir,
            namespace,
            collect_env(env),
            PrerequisiteState::managed(),
        ))
    }

    /// Create a context for an existing project directory without touching the cluster or disk.
    ///
    /// Partial contexts never own prerequisites.
    pub fn new_partial<I, K, V>(
        runner: R,
        config: SuiteConfig,
        dir: &Path,
        env: I,
    ) -> Result<Self, ToolError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let dir = std::path::absolute(dir).map_err(|source| ToolError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let namespace = format!("{}-system", project_name_from_dir(&dir));
        Ok(Self::assemble(
            runner,
            config,
            dir,
            namespace,
            collect_env(env),
            PrerequisiteState::unmanaged(),
        ))
    }

    fn assemble(
        runner: R,
        config: SuiteConfig,
        dir: PathBuf,
        namespace: String,
        env: BTreeMap<String, String>,
        prerequisites: PrerequisiteState,
    ) -> Self {
        let project_name = project_name_from_dir(&dir);
        let cmd = CmdContext {
            dir: Some(dir.clone()),
            env,
        };

        Self {
            kubectl: Kubectl::new(config.tools.kubectl.clone(), namespace, cmd.clone()),
            kind: Kind::new(config.tools.kind.clone(), cmd.clone()),
            olm: Olm::new(config.tools.sdk_binary.clone(), cmd),
            prometheus: Prometheus::new(config.prometheus.resolved_bundle_url()),
            image_name: make_image_name(&project_name),
            bundle_image_name: make_bundle_image_name(&project_name),
            project_name,
            dir,
            config,
            runner,
            prerequisites,
        }
    }

    /// Path of `name` inside the project directory.
    pub fn project_file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Load a local docker image into the kind cluster ($KIND_CLUSTER or the configured name).
    pub fn load_image_to_kind_cluster(&self, image: &str) -> Result<(), ToolError> {
        let cluster = self.config.cluster.resolved_kind_cluster();
        self.kind.load_docker_image(&self.runner, &cluster, image)?;
        Ok(())
    }

    /// True when the current kube context is a kind cluster.
    pub fn is_running_on_kind(&self) -> Result<bool, ToolError> {
        let context = self.kubectl.current_context(&self.runner)?;
        Ok(context.contains("kind"))
    }

    pub fn install_olm_version(&self, version: &str) -> Result<(), ToolError> {
        self.olm
            .install(&self.runner, version, &self.config.olm.install_timeout)?;
        Ok(())
    }

    /// Uninstall OLM; failures are logged, not returned.
    pub fn uninstall_olm(&self) {
        warn_on_output_error(self.olm.uninstall(&self.runner), "uninstalling OLM");
    }

    /// Mark the project as multigroup by prepending to its PROJECT file.
    pub fn allow_project_be_multigroup(&self) -> Result<(), ToolError> {
        prepend_to_file(self.project_file(PROJECT_FILE), MULTIGROUP_LINE)?;
        Ok(())
    }
}

fn collect_env<I, K, V>(env: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    env.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

/// Log `result`'s error as a warning and carry on.
pub fn warn_on_error<E: std::fmt::Display>(result: Result<(), E>, what: &str) {
    if let Err(e) = result {
        warn!("warning: error when {}: {}", what, e);
    }
}

/// Like [`warn_on_error`] for commands that also produce output.
pub fn warn_on_output_error<T, E: std::fmt::Display>(result: Result<T, E>, what: &str) {
    warn_on_error(result.map(|_| ()), what);
}
