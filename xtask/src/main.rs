use std::process::{exit, Command};

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the driver locator workspace",
    long_about = "Runs the locator server, the proximity benchmarks, the ignored\n\
                  load tests and the CI gate for the driver locator workspace."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the locator server (release build)
    Serve {
        /// Listen address
        #[arg(long, default_value = "0.0.0.0:9999")]
        listen: String,
        /// Default search radius in metres
        #[arg(long, default_value_t = 50_000.0)]
        search_radius_m: f64,
    },
    /// Run the proximity benchmarks
    Bench,
    /// Run CI checks
    Ci {
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
    /// Run the ignored load tests in locator_core
    LoadTest,
}

#[derive(Clone, Copy, ValueEnum)]
enum CiJob {
    /// Formatting, clippy and the test suites of both crates
    Check,
    /// Benchmarks only
    Bench,
    /// Check, then benchmarks
    All,
}

/// One labelled `cargo` invocation.
struct Step {
    label: &'static str,
    args: Vec<String>,
}

impl Step {
    fn new(label: &'static str, args: &[&str]) -> Self {
        Self {
            label,
            args: args.iter().map(|arg| arg.to_string()).collect(),
        }
    }

    /// Runs the step and exits the task runner with cargo's code on failure.
    fn run(&self) {
        eprintln!("\n=== {} ===", self.label);
        eprintln!("+ cargo {}", self.args.join(" "));
        let status = match Command::new("cargo").args(&self.args).status() {
            Ok(status) => status,
            Err(error) => {
                eprintln!("failed to execute cargo: {error}");
                exit(1);
            }
        };
        if !status.success() {
            exit(status.code().unwrap_or(1));
        }
    }
}

fn check_steps() -> Vec<Step> {
    vec![
        Step::new("Check formatting", &["fmt", "--all", "--", "--check"]),
        Step::new(
            "Clippy",
            &["clippy", "--all-targets", "--all-features", "--", "-D", "warnings"],
        ),
        Step::new("Test locator_core", &["test", "-p", "locator_core"]),
        Step::new("Test locator_service", &["test", "-p", "locator_service"]),
    ]
}

fn bench_step() -> Step {
    Step::new(
        "Run proximity benchmarks",
        &["bench", "-p", "locator_core", "--bench", "performance"],
    )
}

fn plan(command: Commands) -> Vec<Step> {
    match command {
        Commands::Serve {
            listen,
            search_radius_m,
        } => {
            let radius = search_radius_m.to_string();
            vec![Step::new(
                "Serve",
                &[
                    "run",
                    "-p",
                    "locator_service",
                    "--bin",
                    "locator_server",
                    "--release",
                    "--",
                    "--listen",
                    &listen,
                    "--search-radius-m",
                    &radius,
                ],
            )]
        }
        Commands::Bench => vec![bench_step()],
        Commands::Ci { job } => match job {
            CiJob::Check => check_steps(),
            CiJob::Bench => vec![bench_step()],
            CiJob::All => {
                let mut steps = check_steps();
                steps.push(bench_step());
                steps
            }
        },
        Commands::LoadTest => vec![Step::new(
            "Load tests",
            &["test", "-p", "locator_core", "--test", "load_tests", "--", "--ignored"],
        )],
    }
}

fn main() {
    let steps = plan(Cli::parse().command);
    for step in &steps {
        step.run();
    }
    if steps.len() > 1 {
        eprintln!("\nAll {} steps passed.", steps.len());
    }
}
