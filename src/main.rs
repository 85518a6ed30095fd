use anyhow::Result;
use scaffold_testkit::cli::{parse_args, Args, GlobalOpts};
use scaffold_testkit::config::{self, SuiteConfig};
use scaffold_testkit::context::{MULTIGROUP_LINE, PROJECT_FILE};
use scaffold_testkit::diff_formatter::DiffFormatter;
use scaffold_testkit::error_helpers::{describe_patch_error, describe_tool_error};
use scaffold_testkit::file_patcher::{apply_patch, preview_patch, Patch};
use scaffold_testkit::prerequisites::{check_prerequisites, install_prerequisites, uninstall_prerequisites};
use scaffold_testkit::{logger, CommandRunner, CommandSpec, PrerequisiteState, SystemRunner, TestContext, ToolError};
use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    let (opts, args) = match parse_args() {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&opts, args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_suite_config(opts: &GlobalOpts) -> Result<SuiteConfig> {
    let config = match &opts.config {
        Some(path) => config::load_config_from(path)?,
        None => config::load_config()?,
    };
    config::validate_config(&config)?;
    Ok(config)
}

fn run(opts: &GlobalOpts, args: Args) -> Result<ExitCode> {
    let config = load_suite_config(opts)?;
    logger::init_logging(&config.logging, opts.verbose)?;

    match args {
        Args::Replace { file, old, new } => patch_file(opts, &file, &Patch::literal(old, new), "replace"),
        Args::ReplaceRegex { file, pattern, replacement } => match Patch::regex(&pattern, replacement) {
            Ok(patch) => patch_file(opts, &file, &patch, "replace-regex"),
            Err(e) => {
                eprintln!("{}", describe_patch_error(&e));
                Ok(ExitCode::FAILURE)
            }
        },
        Args::Uncomment { file, target, prefix } => {
            patch_file(opts, &file, &Patch::uncomment(target, prefix), "uncomment")
        }
        Args::Prepend { file, line } => patch_file(opts, &file, &Patch::prepend(line), "prepend"),
        Args::Multigroup { dir } => {
            let tc = TestContext::new_partial(SystemRunner, config, &dir, no_env())?;
            if opts.dry_run {
                let patch = Patch::prepend(MULTIGROUP_LINE);
                return patch_file(opts, &tc.project_file(PROJECT_FILE), &patch, "multigroup");
            }
            report_tool(tc.allow_project_be_multigroup())
        }
        Args::LoadImage { image } => {
            let cwd = std::env::current_dir()?;
            let tc = TestContext::new_partial(SystemRunner, config, &cwd, no_env())?;
            report_tool(tc.load_image_to_kind_cluster(&image))
        }
        Args::PrereqsCheck => {
            let cwd = std::env::current_dir()?;
            let tc = TestContext::new_partial(SystemRunner, config, &cwd, no_env())?;
            match check_prerequisites(&tc) {
                Ok(present) => {
                    println!("Prometheus operator: {}", presence(present.has_prometheus));
                    println!("OLM:                 {}", presence(present.has_olm));
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => report_tool(Err(e)),
            }
        }
        Args::PrereqsWith { command } => run_with_prerequisites(config, &command),
        Args::Config { show } => {
            if show {
                print!("{}", config::to_toml(&config)?);
            } else {
                match &opts.config {
                    Some(path) => println!("{}", path.display()),
                    None => println!("{}", config::config_file_path()?.display()),
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn no_env() -> std::iter::Empty<(String, String)> {
    std::iter::empty()
}

fn presence(present: bool) -> &'static str {
    if present { "present" } else { "missing" }
}

fn patch_file(opts: &GlobalOpts, file: &Path, patch: &Patch, operation: &str) -> Result<ExitCode> {
    if opts.dry_run {
        return match preview_patch(file, patch) {
            Ok(preview) => {
                print!("{}", DiffFormatter::format_dry_run_header(operation));
                print!("{}", DiffFormatter::format_preview(&preview, opts.context));
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                eprintln!("{}", describe_patch_error(&e));
                Ok(ExitCode::FAILURE)
            }
        };
    }

    match apply_patch(file, patch) {
        Ok(()) => {
            tracing::info!("{}: {}", operation, file.display());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{}", describe_patch_error(&e));
            Ok(ExitCode::FAILURE)
        }
    }
}

fn report_tool(result: Result<(), ToolError>) -> Result<ExitCode> {
    match result {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("{}", describe_tool_error(&e));
            Ok(ExitCode::FAILURE)
        }
    }
}

fn run_with_prerequisites(config: SuiteConfig, command: &[String]) -> Result<ExitCode> {
    let Some((program, rest)) = command.split_first() else {
        anyhow::bail!("Missing command to run");
    };

    let cwd = std::env::current_dir()?;
    let mut tc = TestContext::new_partial(SystemRunner, config, &cwd, no_env())?;
    // This process may install prerequisites and remove what it installed.
    tc.prerequisites = PrerequisiteState::managed();

    if let Err(e) = install_prerequisites(&mut tc) {
        eprintln!("{}", describe_tool_error(&e));
        uninstall_prerequisites(&tc);
        return Ok(ExitCode::FAILURE);
    }

    let spec = CommandSpec::new(program.clone(), rest.iter().cloned()).current_dir(cwd);
    let result = tc.runner.run_attached(&spec);
    uninstall_prerequisites(&tc);

    match result {
        Ok(Some(0)) => Ok(ExitCode::SUCCESS),
        Ok(Some(code)) => Ok(ExitCode::from(u8::try_from(code).unwrap_or(1))),
        Ok(None) => Ok(ExitCode::FAILURE),
        Err(e) => report_tool(Err(e)),
    }
}
