//! Runs the same scripted exchange through the parallel driver and the
//! sequential loop, then prints both timelines.

#[macro_use]
extern crate tracing;

use std::process::ExitCode;
use std::time::Duration;

use owo_colors::OwoColorize;
use toolgraph::core::event::Timeline;
use toolgraph::core::{EventKind, WorkflowBuilder};
use toolgraph::demo::DemoConfig;
use toolgraph::tools::WaitTool;

const BAR_CHAR: &str = "▎";
const BAR_WIDTH: f64 = 48.0;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = DemoConfig::from_env();
    debug!("demo config: {config:?}");

    let workflow =
        WorkflowBuilder::with_model_provider(config.scripted_provider())
            .with_tool(WaitTool::new())
            .with_config(config.executor_config())
            .build();
    let prompt = config.prompt();
    println!("{}{}", BAR_CHAR.bright_cyan(), prompt.bright_white());

    let answer = match workflow.run_prompt_with_tools(prompt.as_str()).await {
        Ok(answer) => answer,
        Err(err) => {
            eprintln!("parallel run failed: {err}");
            return ExitCode::FAILURE;
        }
    };
    println!("{}🤖 {}", BAR_CHAR.bright_cyan(), answer.bright_white());
    let parallel = workflow.events().timeline();

    workflow.events().clear();
    if let Err(err) = workflow.sequential_executor().run(prompt).await {
        eprintln!("sequential run failed: {err}");
        return ExitCode::FAILURE;
    }
    let sequential = workflow.events().timeline();

    // Both timelines share one scale so the bars compare.
    let scale = parallel.total().max(sequential.total());
    print_timeline("parallel", &parallel, scale);
    print_timeline("sequential", &sequential, scale);

    let speedup = sequential.total().as_secs_f64()
        / parallel.total().as_secs_f64().max(f64::EPSILON);
    println!("\n{} {speedup:.2}x", "speedup".bold());
    ExitCode::SUCCESS
}

fn print_timeline(title: &str, timeline: &Timeline, scale: Duration) {
    println!("\n{}", title.bold().underline());
    let scale = scale.as_secs_f64().max(f64::EPSILON);
    for entry in timeline.entries() {
        let lead = (entry.offset.as_secs_f64() / scale * BAR_WIDTH) as usize;
        let width = (entry.duration.as_secs_f64() / scale * BAR_WIDTH)
            .max(1.0) as usize;
        let bar = format!("{:<49}", " ".repeat(lead) + &"█".repeat(width));
        let bar = match entry.kind {
            EventKind::Inference => bar.bright_cyan().to_string(),
            EventKind::ToolInvocation => bar.bright_yellow().to_string(),
        };
        println!(
            "{:<14} {} {:>8.1}ms",
            entry.name,
            bar,
            entry.duration.as_secs_f64() * 1000.0
        );
    }
    println!(
        "{:<14} {:>58.1}ms",
        "total".dimmed(),
        timeline.total().as_secs_f64() * 1000.0
    );
}
