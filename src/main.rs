use clap::{Parser, Subcommand, ValueEnum};
use easypay::application::license::{LicenseGate, LicenseState};
use easypay::application::orchestrator::Orchestrator;
use easypay::domain::outcome::ResultCode;
use easypay::domain::ports::{SharedResultSink, SharedStatusPresenter, SharedTerminalSession};
use easypay::error::EasyPayError;
use easypay::infrastructure::config_store::{ConfigResolver, StatePaths};
use easypay::infrastructure::file_sink::FileResultSink;
use easypay::infrastructure::simulator::{ScriptedTerminal, TerminalScript};
use easypay::interfaces::console::ConsolePresenter;
use log::{error, warn};
use miette::{IntoDiagnostic, WrapErr};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Data directory shared with the supervisor. Defaults to
    /// EASYPAY_DATA_DIR, then ~/.easypay.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single payment or reversal transaction
    Run {
        /// Amount override in major units, e.g. 12.50
        #[arg(long)]
        amount: Option<Decimal>,

        /// Local configuration file consulted after the host store
        #[arg(long)]
        config: Option<PathBuf>,

        /// Scripted terminal scenario to run against
        #[arg(long, value_enum, default_value_t = Scenario::Success)]
        scenario: Scenario,
    },
    /// Manage the license artifact
    License {
        #[command(subcommand)]
        command: LicenseCommand,
    },
}

#[derive(Subcommand)]
enum LicenseCommand {
    /// Install a license artifact from the given path
    Install { path: PathBuf },
    /// Report the current license state
    Status,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Scenario {
    Success,
    Declined,
    ConnectFailure,
    RegisterFailure,
    Timeout,
    TerminalAbort,
}

impl Scenario {
    fn script(self) -> TerminalScript {
        match self {
            Scenario::Success => TerminalScript::success(),
            Scenario::Declined => TerminalScript::declined(),
            Scenario::ConnectFailure => TerminalScript::connect_failure(),
            Scenario::RegisterFailure => TerminalScript::register_failure(),
            Scenario::Timeout => TerminalScript::timeout(),
            Scenario::TerminalAbort => TerminalScript::terminal_abort(),
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let paths = cli
        .data_dir
        .map(StatePaths::new)
        .unwrap_or_else(StatePaths::from_env);

    let code = match cli.command {
        Command::Run {
            amount,
            config,
            scenario,
        } => run_transaction(&paths, amount, config, scenario).await,
        Command::License { command } => license_command(&paths, command),
    };
    std::process::exit(code);
}

fn license_command(paths: &StatePaths, command: LicenseCommand) -> i32 {
    let gate = LicenseGate::new(paths.root());
    match command {
        LicenseCommand::Install { path } => {
            let installed: miette::Result<()> = gate
                .submit(&path)
                .into_diagnostic()
                .wrap_err("could not install license artifact");
            match installed {
                Ok(()) => {
                    println!("License installed. Restart the application.");
                    0
                }
                Err(report) => {
                    eprintln!("{report:?}");
                    ResultCode::LicenseNotValid.exit_code()
                }
            }
        }
        LicenseCommand::Status => {
            match gate.state() {
                LicenseState::NoLicense => println!("No license installed."),
                LicenseState::Accepted => println!("License valid."),
                LicenseState::Rejected => println!("License present but not valid."),
            }
            0
        }
    }
}

async fn run_transaction(
    paths: &StatePaths,
    amount: Option<Decimal>,
    config_file: Option<PathBuf>,
    scenario: Scenario,
) -> i32 {
    if let Err(e) = paths.ensure() {
        error!("cannot prepare data directory {}: {e}", paths.root().display());
        return ResultCode::ConfigurationNotFound.exit_code();
    }

    let sink: SharedResultSink = Arc::new(FileResultSink::new(paths.outcome_path()));
    if let Err(e) = sink.activate().await {
        error!("cannot raise liveness flag: {e}");
    }

    let code = execute(paths, &sink, amount, config_file, scenario).await;

    if let Err(e) = sink.publish().await {
        error!("cannot publish outcome: {e}");
    }
    if let Err(e) = sink.deactivate().await {
        error!("cannot clear liveness flag: {e}");
    }
    code.exit_code()
}

async fn execute(
    paths: &StatePaths,
    sink: &SharedResultSink,
    amount: Option<Decimal>,
    config_file: Option<PathBuf>,
    scenario: Scenario,
) -> ResultCode {
    let mut resolver = ConfigResolver::new(paths).with_cli_amount(amount);
    if let Some(path) = config_file {
        resolver = resolver.with_local_file(path);
    }
    let config = match resolver.resolve() {
        Ok(config) => config,
        Err(e) => {
            let code = match e {
                EasyPayError::ConfigurationNotFound(_) => ResultCode::ConfigurationNotFound,
                _ => ResultCode::InvalidConfiguration,
            };
            error!("{e}");
            sink.set_outcome(code, &e.to_string());
            return code;
        }
    };

    let gate = LicenseGate::new(paths.root());
    if !gate.valid() {
        sink.set_outcome(ResultCode::LicenseNotValid, "license missing or not valid");
        return ResultCode::LicenseNotValid;
    }

    let session: SharedTerminalSession = Arc::new(ScriptedTerminal::new(scenario.script()));
    let presenter: SharedStatusPresenter = Arc::new(ConsolePresenter::new());
    let orchestrator = Orchestrator::new(
        SharedTerminalSession::clone(&session),
        SharedResultSink::clone(sink),
        presenter,
    );

    // Ctrl-C is the headless abort button: each press becomes one abort
    // request for the command in flight.
    let (abort_tx, abort_rx) = mpsc::channel(4);
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if abort_tx.send(()).await.is_err() {
                break;
            }
        }
    });

    let completion = tokio::select! {
        completion = orchestrator.run(&config, abort_rx) => completion,
        _ = forced_shutdown() => {
            warn!("forced shutdown requested");
            sink.set_outcome(ResultCode::ClosedByUser, "shutdown requested");
            session.dispose().await;
            return ResultCode::ClosedByUser;
        }
    };
    session.dispose().await;
    completion.code
}

#[cfg(unix)]
async fn forced_shutdown() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            terminate.recv().await;
        }
        Err(e) => {
            error!("cannot install shutdown handler: {e}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn forced_shutdown() {
    std::future::pending::<()>().await;
}
