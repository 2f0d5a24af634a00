//! CLI command handling
//!
//! Builds scenarios from the command line or a matrix, runs them and
//! formats the results.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;

use crate::commands::{Commands, RunOptions};
use crate::common::config::Config;
use crate::common::{paths, Error, Result};
use crate::process::{
    CancelToken, ConsoleSink, Invocation, OutputSink, ProcessRunner, SystemRunner, TracingSink,
};
use crate::scenario::{
    print_report, print_summary, AuthMode, BuildConfiguration, Orchestrator, Scenario,
    ScenarioMatrix, ScenarioParams, ScenarioReport, TemplateKind, ToolchainVariant,
};

/// Settings resolved before dispatch
pub struct Context {
    pub config: Config,
    /// Config file in effect, if one was read or would be read
    pub config_path: Option<PathBuf>,
    pub verbose: bool,
}

impl Context {
    /// Load configuration from `explicit` or the default location
    pub fn load(explicit: Option<&Path>, verbose: bool) -> Result<Self> {
        let (config, config_path) = match explicit {
            Some(path) => (Config::load_from(path)?, Some(path.to_path_buf())),
            None => (Config::load()?, paths::config_path()),
        };
        Ok(Self {
            config,
            config_path,
            verbose,
        })
    }
}

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, ctx: Context) -> Result<()> {
    match command {
        Commands::Run {
            matrix,
            filter,
            run,
        } => {
            let mut matrix = load_matrix(matrix.as_deref())?;
            if let Some(needle) = filter {
                matrix = matrix.filter(&needle);
                if matrix.scenarios.is_empty() {
                    return Err(Error::Config(format!("No scenario matches '{}'", needle)));
                }
            }
            run_scenarios(&matrix.scenarios, ctx, &run).await
        }

        Commands::Scenario {
            template,
            configuration,
            toolchain,
            framework,
            auth,
            use_local_db,
            target_framework,
            run,
        } => {
            let template: TemplateKind = template.parse()?;
            let configuration: BuildConfiguration = configuration.parse()?;
            let mut params = ScenarioParams::new(template, configuration)
                .toolchain(toolchain.parse::<ToolchainVariant>()?)
                .local_db(use_local_db);
            if let Some(framework) = framework {
                params.framework = framework;
            }
            if let Some(auth) = auth {
                params = params.auth(auth.parse::<AuthMode>()?);
            }
            if let Some(tfm) = target_framework {
                params = params.target_framework(tfm);
            }
            run_scenarios(&[params], ctx, &run).await
        }

        Commands::List { matrix } => {
            let matrix = load_matrix(matrix.as_deref())?;
            for params in &matrix.scenarios {
                println!("{}", params.display_name());
            }
            println!("\n{} scenario(s)", matrix.scenarios.len());
            Ok(())
        }

        Commands::Exec {
            program,
            args,
            cwd,
            create_dir,
            timeout,
        } => {
            let cwd = match cwd {
                Some(dir) => dir,
                None => std::env::current_dir()?,
            };
            let invocation = Invocation::new(program, args, cwd)
                .create_dir_if_missing(create_dir)
                .timeout(timeout.map(Duration::from_secs))
                .envs(ctx.config.toolchain.env.clone());
            exec(&invocation).await
        }

        Commands::Check => check(&ctx),
    }
}

/// Load a matrix file, or the built-in matrix when none is given
fn load_matrix(path: Option<&Path>) -> Result<ScenarioMatrix> {
    match path {
        Some(path) => ScenarioMatrix::load(path),
        None => Ok(ScenarioMatrix::builtin()),
    }
}

/// Runner whose output goes to the console or to tracing
fn build_runner(stream: bool) -> SystemRunner {
    let sink: Arc<dyn OutputSink> = if stream {
        Arc::new(ConsoleSink)
    } else {
        Arc::new(TracingSink)
    };
    SystemRunner::with_sink(sink)
}

/// Token that fires on Ctrl-C
fn cancel_on_ctrl_c() -> CancelToken {
    let cancel = CancelToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping running process");
            token.cancel();
        }
    });
    cancel
}

async fn run_scenarios(params: &[ScenarioParams], ctx: Context, opts: &RunOptions) -> Result<()> {
    let mut config = ctx.config;
    config.workspace.keep_on_failure |= opts.keep;
    config.output.stream |= opts.stream;
    if let Some(secs) = opts.timeout {
        config.timeouts.set_all(secs);
    }

    let root = config.workspace.root();
    tokio::fs::create_dir_all(&root)
        .await
        .map_err(|source| Error::Infrastructure {
            path: root.clone(),
            source,
        })?;

    let scenarios = params
        .iter()
        .map(|p| Scenario::from_params(p, &config))
        .collect::<Result<Vec<_>>>()?;

    tracing::info!(count = scenarios.len(), root = %root.display(), "Running scenarios");

    let orchestrator = Orchestrator::from_config(build_runner(config.output.stream), &config);
    let cancel = cancel_on_ctrl_c();
    let json = opts.json;
    let verbose = ctx.verbose;

    let reports = orchestrator
        .run_all(&scenarios, &cancel, |report| {
            if !json {
                print_report(report, verbose);
            }
        })
        .await;

    finish(&reports, scenarios.len(), json, cancel.is_cancelled())
}

/// Print the final output and turn failures into an error exit
fn finish(reports: &[ScenarioReport], total: usize, json: bool, cancelled: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(reports)?);
    } else {
        print_summary(reports);
    }

    if cancelled {
        return Err(Error::Cancelled);
    }

    let failed = reports.iter().filter(|r| !r.passed()).count();
    if failed > 0 {
        return Err(Error::ScenariosFailed { failed, total });
    }
    Ok(())
}

async fn exec(invocation: &Invocation) -> Result<()> {
    let runner = build_runner(true);
    let cancel = cancel_on_ctrl_c();

    println!("{} {}", "$".dimmed(), invocation);
    let result = runner.execute(invocation, &cancel).await;

    match result.pid {
        Some(pid) => println!("pid: {}", pid),
        None => println!("pid: {}", "none".dimmed()),
    }
    match result.exit_code() {
        Some(code) => println!("exit code: {}", code),
        None => println!("exit code: {}", "none".dimmed()),
    }

    if result.success() {
        println!("{} {}", "✓".green(), result.outcome);
        Ok(())
    } else {
        println!("{} {}", "✗".red(), result.outcome);
        Err(Error::ProcessFailed {
            program: invocation.program().to_string(),
            outcome: result.outcome.to_string(),
        })
    }
}

/// Report where the configured toolchain resolves on PATH
fn check(ctx: &Context) -> Result<()> {
    let toolchain = &ctx.config.toolchain;

    match &ctx.config_path {
        Some(path) if path.exists() => println!("Config: {}", path.display()),
        Some(path) => println!("Config: {} {}", path.display(), "(not found, using defaults)".dimmed()),
        None => println!("Config: {}", "defaults".dimmed()),
    }
    println!("Workspace: {}", ctx.config.workspace.root().display());
    if let Some(dir) = paths::log_dir() {
        println!("Suggested log directory: {}", dir.display());
    }
    println!();

    let mut missing = Vec::new();
    for (role, program) in [("frontend", &toolchain.frontend), ("build tool", &toolchain.build_tool)] {
        match which::which(program) {
            Ok(path) => println!("{} {} ({}): {}", "✓".green(), program, role, path.display()),
            Err(e) => {
                println!("{} {} ({}): {}", "✗".red(), program, role, e);
                missing.push(program.clone());
            }
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Toolchain program(s) not found: {}",
            missing.join(", ")
        )))
    }
}
