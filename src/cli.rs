use crate::config::settings::FdscopeConfig;
use crate::exec::supervisor::{ExecutionRequest, Supervisor};
use crate::forensics::{build_forensic_report, inspect_process, summarize_or_fallback};
use crate::judge::{adapter_for, detect_language, run_source};
use crate::kernel::procfs::ProcessTable;
use crate::safety::workspace::Workspace;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./fdscope.json when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List host processes by open descriptor count
    Processes {
        /// Show only the first N processes
        #[arg(long)]
        limit: Option<usize>,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Analyze the descriptor table of a live process
    Inspect {
        #[arg(long)]
        pid: u32,
    },
    /// Run a Python or C source file under supervision
    Run {
        /// Source language (python or c); inferred from the extension when omitted
        #[arg(long)]
        language: Option<String>,
        /// Wall clock time limit in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Maximum number of open file descriptors
        #[arg(long)]
        fd_limit: Option<u64>,
        /// Source file to run
        file: PathBuf,
    },
    /// Supervise an arbitrary executable
    Exec {
        /// Wall clock time limit in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Maximum number of open file descriptors
        #[arg(long)]
        fd_limit: Option<u64>,
        /// Program and arguments to execute
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
}

pub fn run() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = FdscopeConfig::resolve(cli.config.as_ref())?;

    match cli.command {
        Commands::Processes { limit, json } => {
            let mut processes = ProcessTable::host().list_processes()?;
            if let Some(limit) = limit {
                processes.truncate(limit);
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&processes)?);
            } else {
                println!("{:>8}  {:>6}  {:<16}  {}", "PID", "FDS", "USER", "NAME");
                for p in &processes {
                    println!("{:>8}  {:>6}  {:<16}  {}", p.pid, p.fd_count, p.user, p.name);
                }
            }
            Ok(())
        }
        Commands::Inspect { pid } => {
            let analysis = inspect_process(&ProcessTable::host(), pid)?;
            println!("{}", serde_json::to_string_pretty(&analysis)?);
            Ok(())
        }
        Commands::Run {
            language,
            timeout,
            fd_limit,
            file,
        } => {
            let language = detect_language(&file, language.as_deref())?;
            let content = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;

            let mut workspace = Workspace::in_temp_dir()?;
            let source = workspace.import_source(&file)?;
            log::info!(
                "run {}: {} source staged at {}",
                workspace.run_id(),
                language,
                source.display()
            );

            let supervisor = Supervisor::new(config);
            let adapter = adapter_for(language);
            let report = run_source(&supervisor, adapter.as_ref(), &source, timeout, fd_limit)?;

            let forensic = build_forensic_report(report, Some(&content));
            let summary = summarize_or_fallback(None, &forensic);
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "raw_analysis": forensic,
                    "summary": summary,
                }))?
            );
            Ok(())
        }
        Commands::Exec {
            timeout,
            fd_limit,
            command,
        } => {
            let (program, args) = command
                .split_first()
                .ok_or_else(|| anyhow::anyhow!("missing program"))?;

            let mut request = ExecutionRequest::new(program).with_args(args.iter().cloned());
            request.timeout_seconds = timeout;
            request.descriptor_limit = fd_limit;

            let report = Supervisor::new(config).run(&request)?;
            let forensic = build_forensic_report(report, None);
            println!("{}", serde_json::to_string_pretty(&forensic)?);
            Ok(())
        }
    }
}
