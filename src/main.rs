use anyhow::Context;
use clap::{Parser, Subcommand};
use pnp_orchestrator::config::{Settings, load_settings_from_file};
use pnp_orchestrator::editor::{master_to_builder, scenario_to_builder};
use pnp_orchestrator::engine::RunStatus;
use pnp_orchestrator::error::EntityKind;
use pnp_orchestrator::executor::SimulatedMachine;
use pnp_orchestrator::gateway::LocalGateway;
use pnp_orchestrator::monitor::Severity;
use pnp_orchestrator::registry;
use pnp_orchestrator::scenario::{ScenarioDocument, load_document_from_file};
use pnp_orchestrator::session::Session;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// YAML 설정 파일.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 시나리오 목록을 출력한다.
    List,
    /// 마스터 시나리오 목록을 출력한다.
    Masters,
    /// 시나리오의 Step을 출력한다.
    Show { name: String },
    /// YAML 파일의 시나리오 또는 마스터 시나리오를 저장한다.
    Import { file: PathBuf },
    Delete {
        name: String,
        #[arg(short, long, help = "확인 없이 삭제")]
        yes: bool,
    },
    #[command(name = "delete-master")]
    DeleteMaster {
        name: String,
        #[arg(short, long, help = "확인 없이 삭제")]
        yes: bool,
    },
    Duplicate { name: String },
    /// 시뮬레이션 장비로 시나리오를 실행한다.
    Run { name: String },
    #[command(name = "run-master")]
    RunMaster { name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = match &cli.config {
        Some(path) => load_settings_from_file(path)
            .with_context(|| format!("설정 파일을 읽지 못했습니다: {}", path.display()))?,
        None => Settings::default(),
    };
    let machine = SimulatedMachine::from_settings(&settings.simulation);
    let gateway = LocalGateway::open(&settings, Arc::new(machine))?;
    let mut session = Session::new(gateway, settings.monitor.clone());
    session.refresh().await?;

    match cli.command {
        Commands::List => {
            for scenario in session.scenarios() {
                println!("{} ({} 단계)", scenario.name, scenario.len());
            }
        }
        Commands::Masters => {
            for master in session.masters() {
                println!("{}: {}", master.name, master.sequence.join(" → "));
            }
        }
        Commands::Show { name } => {
            let scenario = session
                .scenarios()
                .iter()
                .find(|s| s.name == name)
                .with_context(|| format!("시나리오를 찾을 수 없습니다: {name}"))?;
            for (index, step) in scenario.steps.iter().enumerate() {
                println!("{:>3}. {}", index + 1, registry::describe(step));
            }
        }
        Commands::Import { file } => {
            let message = match load_document_from_file(&file)
                .with_context(|| format!("파일을 읽지 못했습니다: {}", file.display()))?
            {
                ScenarioDocument::Scenario(scenario) => {
                    *session.builder_mut() = scenario_to_builder(&scenario);
                    session.save_scenario().await?
                }
                ScenarioDocument::Master(master) => {
                    *session.master_builder_mut() = master_to_builder(&master);
                    session.save_master().await?
                }
            };
            println!("{message}");
        }
        Commands::Delete { name, yes } => {
            delete(&mut session, EntityKind::Scenario, name, yes).await?;
        }
        Commands::DeleteMaster { name, yes } => {
            delete(&mut session, EntityKind::MasterScenario, name, yes).await?;
        }
        Commands::Duplicate { name } => {
            let copy = session.duplicate_scenario(&name).await?;
            println!("'{name}' → '{copy}'");
        }
        Commands::Run { name } => {
            let message = session.run_scenario(&name).await?;
            println!("{message}");
            follow(&mut session).await?;
        }
        Commands::RunMaster { name } => {
            let message = session.run_master(&name).await?;
            println!("{message}");
            follow(&mut session).await?;
        }
    }
    Ok(())
}

async fn delete(
    session: &mut Session<LocalGateway>,
    kind: EntityKind,
    name: String,
    yes: bool,
) -> anyhow::Result<()> {
    let pending = session.request_delete(kind, name);
    if !yes && !confirm(&pending.prompt())? {
        println!("취소되었습니다.");
        return Ok(());
    }
    println!("{}", session.confirm_delete(pending).await?);
    Ok(())
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

/// 실행이 끝날 때까지 모니터 로그를 출력한다.
async fn follow(session: &mut Session<LocalGateway>) -> anyhow::Result<()> {
    let terminal = session
        .watch(|_, monitor| {
            if let Some(entry) = monitor.log().last() {
                match entry.severity {
                    Severity::Error | Severity::Warning => eprintln!("{}", entry.text),
                    Severity::Info | Severity::Success => println!("{}", entry.text),
                }
            }
        })
        .await;
    match terminal {
        Some(RunStatus::Done) => Ok(()),
        Some(status) => anyhow::bail!("실행이 '{status}' 상태로 끝났습니다."),
        None => anyhow::bail!("실행 결과를 받지 못했습니다."),
    }
}
