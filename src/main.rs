// SPDX-License-Identifier: MIT

use anyhow::Context;
use clap::{Parser, Subcommand};
use deepflow_rs::deepflow::build_workflow;
use deepflow_rs::deepflow::config::{AppConfig, RunConfig, RunOverrides};
use deepflow_rs::deepflow::graph::{RunOptions, RunOutcome, Workflow};
use deepflow_rs::deepflow::interrupt::resume_text;
use deepflow_rs::deepflow::server;
use deepflow_rs::deepflow::state::{Message, State};
use deepflow_rs::deepflow::stream::{EventKind, StreamEvent};
use dotenv::dotenv;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the YAML configuration (defaults to ./conf.yaml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the HTTP chat stream
    Serve {
        #[arg(short, long, default_value_t = 8000)]
        port: u16,
    },
    /// Research a question from the terminal
    Run {
        /// The question to research
        #[arg(short, long)]
        query: String,

        /// Accept the first plan without asking
        #[arg(long)]
        auto_accept: bool,

        #[arg(long)]
        thread_id: Option<String>,

        /// Skip the web search before planning
        #[arg(long)]
        no_background: bool,

        #[arg(long)]
        max_plan_iterations: Option<u32>,

        #[arg(long)]
        max_step_num: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref())?;
    let workflow = build_workflow(&config)
        .await
        .context("Failed to build workflow")?;

    match args.command {
        Commands::Serve { port } => {
            server::serve(workflow, &config, port)
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
        }
        Commands::Run {
            query,
            auto_accept,
            thread_id,
            no_background,
            max_plan_iterations,
            max_step_num,
        } => {
            let thread_id = thread_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let overrides = RunOverrides {
                max_plan_iterations,
                max_step_num,
                ..Default::default()
            };
            let run_config = RunConfig::resolve(&overrides, Vec::new());

            let mut state = State::with_messages(vec![Message::user(query)]);
            state.auto_accepted_plan = auto_accept;
            state.enable_background_investigation = !no_background;

            let report = run_interactive(&workflow, &thread_id, state, run_config).await?;
            println!("\n{}", report);
        }
    }

    Ok(())
}

/// Drive a run to completion, asking on stdin whenever the plan needs review
async fn run_interactive(
    workflow: &Workflow,
    thread_id: &str,
    state: State,
    config: RunConfig,
) -> anyhow::Result<String> {
    let (options, printer) = printing_options(config.clone());
    let mut outcome = workflow.run(thread_id, state, options).await;
    let _ = printer.await;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match outcome? {
            RunOutcome::Completed(state) => return Ok(state.final_report),
            RunOutcome::Interrupted(checkpoint) => {
                if let Some(plan) = &checkpoint.state.current_plan {
                    println!("\n{}", plan.to_json_string());
                }
                let choices: Vec<String> = checkpoint
                    .options
                    .iter()
                    .map(|o| format!("{} [{}]", o.text, o.value))
                    .collect();
                println!("\n{} ({})", checkpoint.prompt, choices.join(", "));
                print!("Press enter to accept, or describe the changes you want: ");
                std::io::stdout().flush()?;

                let line = stdin.next_line().await?.unwrap_or_default();
                let feedback = match line.trim() {
                    "" => resume_text("ACCEPTED", ""),
                    edit => resume_text("EDIT_PLAN", edit),
                };

                let (options, printer) = printing_options(config.clone());
                outcome = workflow.resume(thread_id, &feedback, options).await;
                let _ = printer.await;
            }
        }
    }
}

/// Run options whose events are echoed to stdout as they stream
fn printing_options(config: RunConfig) -> (RunOptions, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<StreamEvent>(100);
    let printer = tokio::spawn(async move {
        let mut agent: Option<String> = None;
        while let Some(event) = rx.recv().await {
            let data = &event.data;
            if data.agent != agent {
                agent = data.agent.clone();
                if let Some(name) = &agent {
                    println!("\n== {} ==", name);
                }
            }
            match event.kind {
                EventKind::MessageChunk => print!("{}", data.content),
                EventKind::ToolCalls => {
                    for call in data.tool_calls.iter().flatten() {
                        println!("\n-> {}({})", call.name, call.args);
                    }
                }
                EventKind::Error => eprintln!("\nerror: {}", data.content),
                _ => {}
            }
            let _ = std::io::stdout().flush();
        }
    });
    (RunOptions::new(config).with_events(tx), printer)
}
