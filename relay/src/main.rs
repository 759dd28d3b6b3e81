//! Cloud task pipeline CLI.
//!
//! Each command runs one stage. With `--pipe` the stage starts from the state
//! document on stdin; every successful stage writes its state to stdout.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use relay::exit_codes;
use relay::gateway::ExecutionMode;
use relay::io::aws_cli::AwsCli;
use relay::io::cloud::Backends;
use relay::io::config::{CONFIG_ENV, config_path, load_config};
use relay::io::env::Environment;
use relay::logging;
use relay::task::{GlobalOptions, Stage, TaskContext, run_task};
use relay::tasks::{Endpoint, Instantiate, Phase, Signal, SignalOp, Stub, Terminate};

#[derive(Parser)]
#[command(name = "relay", version, about = "Chained cloud provisioning stages")]
struct Cli {
    /// Read pipeline state from stdin.
    #[arg(short, long, global = true)]
    pipe: bool,
    /// Perform mutating operations (default).
    #[arg(long, global = true, overrides_with = "no_op")]
    op: bool,
    /// Validate mutating operations without performing them.
    #[arg(long = "no-op", global = true, overrides_with = "op")]
    no_op: bool,
    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn globals(&self) -> GlobalOptions {
        let mode = if self.no_op {
            ExecutionMode::Simulate
        } else {
            ExecutionMode::Apply
        };
        GlobalOptions {
            pipe: self.pipe,
            mode,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Print the relay version.
    Version,
    /// Print every RELAY_* environment variable as JSON.
    Env,
    /// Resolve the build network and launch an instance.
    Instantiate {
        #[arg(long, value_enum)]
        phase: Phase,
    },
    /// Terminate instances from --instance or from incoming state.
    Terminate {
        /// Comma-separated instance ids.
        #[arg(short, long, value_delimiter = ',')]
        instance: Vec<String>,
    },
    /// Increment the `message` counter in state.
    Stub {
        #[arg(short, long, default_value_t = 1, allow_negative_numbers = true)]
        increment: i64,
    },
    /// Record the endpoint address of a database instance.
    Endpoint {
        #[arg(long)]
        db: String,
    },
    /// Set, check, get or clear a storage semaphore.
    Semaphore {
        #[arg(value_enum, id = "signal_op", value_name = "OP")]
        op: SignalOp,
        #[arg(long)]
        name: String,
        #[arg(long)]
        payload: Option<String>,
    },
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(exit_codes::for_error(&err));
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let globals = cli.globals();
    let env = Environment::from_process();
    match cli.command {
        Command::Version => {
            println!("relay {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Env => cmd_env(&env),
        Command::Instantiate { phase } => cmd_stage(&Instantiate { phase }, &globals, &env),
        Command::Terminate { instance } => cmd_stage(
            &Terminate {
                instances: instance,
            },
            &globals,
            &env,
        ),
        Command::Stub { increment } => cmd_stage(&Stub { increment }, &globals, &env),
        Command::Endpoint { db } => cmd_stage(&Endpoint { db }, &globals, &env),
        Command::Semaphore { op, name, payload } => {
            cmd_stage(&Signal { op, name, payload }, &globals, &env)
        }
    }
}

fn cmd_env(env: &Environment) -> Result<()> {
    let rendered =
        serde_json::to_string_pretty(&env.relay_vars()).context("render environment")?;
    println!("{rendered}");
    Ok(())
}

fn cmd_stage(stage: &dyn Stage, globals: &GlobalOptions, env: &Environment) -> Result<()> {
    let cwd = std::env::current_dir().context("resolve current directory")?;
    let config = load_config(&config_path(env.get(CONFIG_ENV), &cwd))?;
    let aws = AwsCli::new(config.aws.clone());
    let ctx = TaskContext::new(env, &config, Backends::uniform(&aws), globals.mode);

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    run_task(stage, globals, &ctx, stdin.lock(), stdout.lock())?;
    Ok(())
}
