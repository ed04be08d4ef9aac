use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{exit, Command};

use bakery_core::provisioning::{declare_stack, render_stack_json, StackConfig};
use clap::{Parser, Subcommand, ValueEnum};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const RUNTIME_PACKAGE: &str = "bakery_runtime";
const RUNTIME_BIN: &str = "bakery_runtime";
const LAMBDA_DIST_DIR: &str = "infra/aws_bakery/dist";
const DEMO_EXAMPLE: &str = "air_temperature_recipe";

const TESTED_PACKAGES: [&str; 3] = ["bakery_core", "bakery_array", "bakery_runtime"];

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the bakery pipeline workspace",
    long_about = "Runs CI checks, the local recipe demo, lambda packaging\n\
                  and agent stack rendering for the bakery workspace."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run CI checks (fmt, clippy, tests, demo)
    Ci {
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
    /// Run the air temperature recipe against a local store
    Demo {
        /// Directory that receives sources and the target store
        #[arg(long, default_value = "target/bakery-demo")]
        output_dir: String,
        /// Number of sources per batch
        #[arg(long, default_value_t = 6)]
        batch_size: usize,
    },
    /// Build the runtime lambda and package it as a zip artifact
    ServerlessPackage {
        /// Compilation target triple for the lambda binary
        #[arg(long, default_value = "x86_64-unknown-linux-gnu")]
        target: String,
        #[arg(value_enum, long, default_value_t = BuildProfile::Release)]
        profile: BuildProfile,
    },
    /// Render the agent infrastructure declaration as JSON
    RenderStack {
        /// Stack identifier, used as the resource name prefix
        #[arg(long, default_value = "bakery-agent")]
        identifier: String,
        /// Secrets Manager ARN holding the runner registration token
        #[arg(long, env = "RUNNER_TOKEN_SECRET_ARN")]
        runner_token_secret_arn: String,
        /// Docker build context for the agent image
        #[arg(long)]
        agent_build_context: Option<String>,
        /// Write to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// Formatting, clippy, and tests
    Check,
    /// Run the recipe demo end to end
    Demo,
    /// Run check + demo
    All,
}

#[derive(Clone, Copy, ValueEnum)]
enum BuildProfile {
    Debug,
    Release,
}

impl BuildProfile {
    fn dir_name(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
        }
    }

    fn as_cargo_flag(self) -> Option<&'static str> {
        match self {
            Self::Debug => None,
            Self::Release => Some("--release"),
        }
    }
}

// ── helpers ────────────────────────────────────────────────────────

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn run_cargo(args: &[&str]) {
    eprintln!("+ cargo {}", args.join(" "));
    let status = Command::new("cargo")
        .args(args)
        .status()
        .unwrap_or_else(|error| fail(format!("failed to execute cargo: {error}")));
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

fn fail(message: impl AsRef<str>) -> ! {
    eprintln!("error: {}", message.as_ref());
    exit(1);
}

fn run_demo(output_dir: &str, batch_size: usize) {
    let batch_size = batch_size.to_string();
    run_cargo(&[
        "run",
        "-p",
        "bakery_array",
        "--example",
        DEMO_EXAMPLE,
        "--",
        output_dir,
        &batch_size,
    ]);
}

// ── lambda packaging ───────────────────────────────────────────────

fn package_runtime_lambda(target: &str, profile: BuildProfile) {
    ensure_rust_target_installed(target);
    ensure_c_linker_available(target);

    step("Build runtime lambda binary");
    let mut cargo_args = vec![
        "build",
        "-p",
        RUNTIME_PACKAGE,
        "--target",
        target,
        "--bin",
        RUNTIME_BIN,
    ];
    cargo_args.extend(profile.as_cargo_flag());
    run_cargo(&cargo_args);

    step("Package lambda zip artifact");
    let binary_path = Path::new("target")
        .join(target)
        .join(profile.dir_name())
        .join(binary_name(RUNTIME_BIN, target));
    let dist_dir = Path::new(LAMBDA_DIST_DIR);
    if let Err(error) = fs::create_dir_all(dist_dir) {
        fail(format!("failed to create '{}': {error}", dist_dir.display()));
    }
    let zip_path = dist_dir.join("runtime.zip");
    if let Err(message) = write_bootstrap_zip(&binary_path, &zip_path) {
        fail(message);
    }

    eprintln!("\nPackaged artifact:\n- {}", zip_path.display());
}

fn ensure_rust_target_installed(target: &str) {
    let output = match Command::new("rustup")
        .args(["target", "list", "--installed"])
        .output()
    {
        Ok(output) => output,
        Err(error) => {
            eprintln!(
                "warning: failed to run `rustup target list --installed` ({error}); skipping target preflight"
            );
            return;
        }
    };

    if !output.status.success() {
        fail(format!(
            "failed to list installed rust targets: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    let installed = String::from_utf8_lossy(&output.stdout);
    if !installed.lines().any(|line| line.trim() == target) {
        fail(format!(
            "rust target `{target}` is not installed; run `rustup target add {target}` first"
        ));
    }
}

fn ensure_c_linker_available(target: &str) {
    // The runtime links parquet's native codecs, which need a linux C compiler
    // when the lambda is built from Windows.
    if !cfg!(windows) || !target.ends_with("unknown-linux-gnu") {
        return;
    }

    let overrides = [
        format!("CC_{}", target.replace('-', "_")),
        format!("CC_{target}"),
        "TARGET_CC".to_string(),
        "CC".to_string(),
    ];
    let configured = overrides
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    for candidate in configured {
        if tool_works(&candidate) {
            return;
        }
    }

    let canonical = "x86_64-linux-gnu-gcc";
    if !tool_works(canonical) {
        fail(format!(
            "missing C cross-linker for `{target}`; install `{canonical}` or set CC_x86_64_unknown_linux_gnu"
        ));
    }
}

fn tool_works(program: &str) -> bool {
    let mut parts = program.split_whitespace();
    let Some(bin) = parts.next() else {
        return false;
    };

    Command::new(bin)
        .args(parts)
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

fn binary_name(bin_name: &str, target: &str) -> String {
    if target.contains("windows") {
        format!("{bin_name}.exe")
    } else {
        bin_name.to_string()
    }
}

/// Lambda custom runtimes expect the executable at `bootstrap` in the zip root.
fn write_bootstrap_zip(binary_path: &Path, zip_path: &Path) -> Result<(), String> {
    let binary = fs::read(binary_path).map_err(|error| {
        format!(
            "expected lambda binary at '{}': {error}",
            binary_path.display()
        )
    })?;
    let file = fs::File::create(zip_path)
        .map_err(|error| format!("failed to create '{}': {error}", zip_path.display()))?;

    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o755);
    zip.start_file("bootstrap", options)
        .map_err(|error| format!("failed to start bootstrap entry: {error}"))?;
    zip.write_all(&binary)
        .map_err(|error| format!("failed to write bootstrap entry: {error}"))?;
    zip.finish()
        .map_err(|error| format!("failed to finish lambda zip: {error}"))?;
    Ok(())
}

// ── stack rendering ────────────────────────────────────────────────

fn render_stack(
    identifier: &str,
    runner_token_secret_arn: &str,
    agent_build_context: Option<&str>,
) -> Result<String, String> {
    let mut config = StackConfig::new(identifier, runner_token_secret_arn)
        .map_err(|error| error.message().to_string())?;
    if let Some(context) = agent_build_context {
        config = config
            .with_agent_build_context(context)
            .map_err(|error| error.message().to_string())?;
    }
    render_stack_json(&declare_stack(&config)).map_err(|error| error.message().to_string())
}

// ── CI jobs ────────────────────────────────────────────────────────

fn ci_check() {
    step("Check formatting");
    run_cargo(&["fmt", "--all", "--", "--check"]);

    step("Clippy");
    run_cargo(&[
        "clippy",
        "--all-targets",
        "--all-features",
        "--",
        "-D",
        "warnings",
    ]);

    for package in TESTED_PACKAGES {
        step(&format!("Test {package}"));
        run_cargo(&["test", "-p", package]);
    }
}

fn ci_demo() {
    step("Run air temperature recipe");
    run_demo("target/bakery-ci-demo", 6);
}

// ── main ───────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ci { job } => {
            match job {
                CiJob::Check => ci_check(),
                CiJob::Demo => ci_demo(),
                CiJob::All => {
                    ci_check();
                    ci_demo();
                }
            }
            eprintln!("\nCI job passed.");
        }
        Commands::Demo {
            output_dir,
            batch_size,
        } => run_demo(&output_dir, batch_size),
        Commands::ServerlessPackage { target, profile } => {
            package_runtime_lambda(&target, profile);
        }
        Commands::RenderStack {
            identifier,
            runner_token_secret_arn,
            agent_build_context,
            output,
        } => {
            let rendered = render_stack(
                &identifier,
                &runner_token_secret_arn,
                agent_build_context.as_deref(),
            )
            .unwrap_or_else(|message| fail(message));
            match output {
                Some(path) => {
                    if let Err(error) = fs::write(&path, rendered) {
                        fail(format!("failed to write '{}': {error}", path.display()));
                    }
                    eprintln!("Wrote stack declaration to {}", path.display());
                }
                None => println!("{rendered}"),
            }
        }
    }
}
