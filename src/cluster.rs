//! Thin wrappers over the cluster tooling the e2e suites shell out to
//!
//! Each wrapper only builds command lines and interprets exit status; the
//! actual process handling lives behind [`CommandRunner`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::capability::{run_checked, CommandRunner, CommandSpec};
use crate::error::ToolError;

/// Where and with what environment tool commands run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdContext {
    pub dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl CmdContext {
    fn spec<I, S>(&self, program: &str, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut spec = CommandSpec::new(program, args).envs(self.env.clone());
        if let Some(dir) = &self.dir {
            spec = spec.current_dir(dir.clone());
        }
        spec
    }
}

/// `kubectl` bound to a namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kubectl {
    pub binary: String,
    pub namespace: String,
    pub cmd: CmdContext,
}

impl Kubectl {
    pub fn new(binary: impl Into<String>, namespace: impl Into<String>, cmd: CmdContext) -> Self {
        Self {
            binary: binary.into(),
            namespace: namespace.into(),
            cmd,
        }
    }

    /// Run `kubectl <args>` and return stdout.
    pub fn command<R: CommandRunner + ?Sized>(
        &self,
        runner: &R,
        args: &[&str],
    ) -> Result<String, ToolError> {
        run_checked(runner, &self.cmd.spec(&self.binary, args.iter().copied()))
    }

    fn with_namespace(&self, verb: &str, in_namespace: bool, args: &[&str]) -> Vec<String> {
        let mut full = vec![verb.to_string()];
        if in_namespace {
            full.push("-n".to_string());
            full.push(self.namespace.clone());
        }
        full.extend(args.iter().map(|a| a.to_string()));
        full
    }

    fn run_verb<R: CommandRunner + ?Sized>(
        &self,
        runner: &R,
        verb: &str,
        in_namespace: bool,
        args: &[&str],
    ) -> Result<String, ToolError> {
        let full = self.with_namespace(verb, in_namespace, args);
        run_checked(runner, &self.cmd.spec(&self.binary, full))
    }

    /// `kubectl get [-n <namespace>] <args>`
    pub fn get<R: CommandRunner + ?Sized>(
        &self,
        runner: &R,
        in_namespace: bool,
        args: &[&str],
    ) -> Result<String, ToolError> {
        self.run_verb(runner, "get", in_namespace, args)
    }

    /// `kubectl apply [-n <namespace>] <args>`
    pub fn apply<R: CommandRunner + ?Sized>(
        &self,
        runner: &R,
        in_namespace: bool,
        args: &[&str],
    ) -> Result<String, ToolError> {
        self.run_verb(runner, "apply", in_namespace, args)
    }

    /// `kubectl delete [-n <namespace>] <args>`
    pub fn delete<R: CommandRunner + ?Sized>(
        &self,
        runner: &R,
        in_namespace: bool,
        args: &[&str],
    ) -> Result<String, ToolError> {
        self.run_verb(runner, "delete", in_namespace, args)
    }

    pub fn api_resources<R: CommandRunner + ?Sized>(&self, runner: &R) -> Result<String, ToolError> {
        self.command(runner, &["api-resources"])
    }

    pub fn current_context<R: CommandRunner + ?Sized>(&self, runner: &R) -> Result<String, ToolError> {
        self.command(runner, &["config", "current-context"])
    }
}

/// The `kind` CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kind {
    pub binary: String,
    pub cmd: CmdContext,
}

impl Kind {
    pub fn new(binary: impl Into<String>, cmd: CmdContext) -> Self {
        Self {
            binary: binary.into(),
            cmd,
        }
    }

    /// `kind load docker-image --name <cluster> <image>`
    pub fn load_docker_image<R: CommandRunner + ?Sized>(
        &self,
        runner: &R,
        cluster: &str,
        image: &str,
    ) -> Result<String, ToolError> {
        let args = ["load", "docker-image", "--name", cluster, image];
        run_checked(runner, &self.cmd.spec(&self.binary, args))
    }
}

/// OLM lifecycle through the scaffolding CLI's `olm` subcommands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Olm {
    pub sdk_binary: String,
    pub cmd: CmdContext,
}

impl Olm {
    pub fn new(sdk_binary: impl Into<String>, cmd: CmdContext) -> Self {
        Self {
            sdk_binary: sdk_binary.into(),
            cmd,
        }
    }

    /// `<sdk> olm install --version <version> --timeout <timeout>`
    pub fn install<R: CommandRunner + ?Sized>(
        &self,
        runner: &R,
        version: &str,
        timeout: &str,
    ) -> Result<String, ToolError> {
        let args = ["olm", "install", "--version", version, "--timeout", timeout];
        run_checked(runner, &self.cmd.spec(&self.sdk_binary, args))
    }

    /// `<sdk> olm uninstall`
    pub fn uninstall<R: CommandRunner + ?Sized>(&self, runner: &R) -> Result<String, ToolError> {
        run_checked(runner, &self.cmd.spec(&self.sdk_binary, ["olm", "uninstall"]))
    }
}

/// Prometheus operator installed from its release bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prometheus {
    pub bundle_url: String,
}

/// Service whose presence means the Prometheus operator is up.
pub const PROMETHEUS_OPERATOR_SERVICE: &str = "prometheus-operator";

impl Prometheus {
    pub fn new(bundle_url: impl Into<String>) -> Self {
        Self {
            bundle_url: bundle_url.into(),
        }
    }

    /// `kubectl apply -f <bundle>`
    pub fn install<R: CommandRunner + ?Sized>(
        &self,
        runner: &R,
        kubectl: &Kubectl,
    ) -> Result<String, ToolError> {
        kubectl.apply(runner, false, &["-f", self.bundle_url.as_str()])
    }

    /// `kubectl delete -f <bundle>`
    pub fn uninstall<R: CommandRunner + ?Sized>(
        &self,
        runner: &R,
        kubectl: &Kubectl,
    ) -> Result<String, ToolError> {
        kubectl.delete(runner, false, &["-f", self.bundle_url.as_str()])
    }

    /// Whether the operator service is visible yet.
    pub fn service_ready<R: CommandRunner + ?Sized>(&self, runner: &R, kubectl: &Kubectl) -> bool {
        kubectl
            .get(runner, false, &["Service", PROMETHEUS_OPERATOR_SERVICE])
            .is_ok()
    }
}
