//! Subcommand implementations

use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use agentloom_core::{AgentPlan, ChatMode, Message, PlanStatus, Role, Settings, ToolCallStatus};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cli::args::{Args, Command};
use crate::cli::{Error, Result, EXIT_FAILURE, EXIT_SUCCESS};
use crate::llm::{
    self, ApprovalGate, ChatSession, EngineContext, HttpTransport, OrchestrationEvent, SessionEvent,
    StopHandle, Transport,
};
use crate::mcp::McpToolInvoker;

/// Run the parsed command; returns the process exit code
pub async fn run(args: Args, settings: Settings) -> Result<i32> {
    match args.command {
        Command::Config => {
            let rendered = toml::to_string_pretty(&settings).map_err(|e| Error::Serialization(e.to_string()))?;
            print!("{}", rendered);
            Ok(EXIT_SUCCESS)
        }
        Command::Tools => run_tools(settings).await,
        Command::Chat { prompt, mode } => {
            ensure_configured(&settings)?;
            let context = build_context(settings).await?;
            run_chat(context, &prompt, mode.into()).await
        }
        Command::Plan { request, yes } => {
            ensure_configured(&settings)?;
            let context = build_context(settings).await?;
            run_plan(context, &request, yes).await
        }
    }
}

fn ensure_configured(settings: &Settings) -> Result<()> {
    if settings.is_configured() {
        Ok(())
    } else {
        Err(llm::Error::NotConfigured("set a model with --model or AGENTLOOM_MODEL".to_string()).into())
    }
}

fn transport(settings: &Settings) -> Result<Transport> {
    let http = HttpTransport::with_timeout(Duration::from_secs(settings.request_timeout_secs))
        .map_err(llm::Error::from)?;
    Ok(Transport::Real(http))
}

/// Engine context with the MCP tool service attached when configured
///
/// An unreachable tool service is logged and the session runs without
/// tools.
pub async fn build_context(settings: Settings) -> Result<EngineContext> {
    let mcp_url = settings.mcp_url.clone();
    let mcp_key = settings.mcp_api_key.clone();
    let context = EngineContext::with_transport(settings.clone(), transport(&settings)?);

    let Some(url) = mcp_url else {
        return Ok(context);
    };
    let mcp = McpToolInvoker::new(&url, mcp_key, context.transport.clone());
    if let Err(e) = mcp.initialize().await {
        warn!("Tool service at {} unavailable: {}", url, e);
        return Ok(context);
    }
    let tools = match mcp.list_tools().await {
        Ok(tools) => tools,
        Err(e) => {
            warn!("Could not list tools: {}", e);
            Vec::new()
        }
    };
    info!("{} tool(s) available from {}", tools.len(), url);
    Ok(context.with_tools(tools).with_invoker(Arc::new(mcp)))
}

async fn run_tools(settings: Settings) -> Result<i32> {
    let Some(url) = settings.mcp_url.clone() else {
        eprintln!("No tool service configured (set mcp_url or AGENTLOOM_MCP_URL)");
        return Ok(EXIT_FAILURE);
    };
    let transport = Arc::new(transport(&settings)?);
    let mcp = McpToolInvoker::new(&url, settings.mcp_api_key.clone(), transport);
    mcp.initialize().await.map_err(llm::Error::from)?;

    for tool in mcp.list_tools().await.map_err(llm::Error::from)? {
        if tool.description.is_empty() {
            println!("{}", tool.name);
        } else {
            println!("{}  {}", tool.name, tool.description);
        }
    }
    Ok(EXIT_SUCCESS)
}

fn stop_on_ctrl_c(stop: StopHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nStopping...");
            stop.stop();
        }
    });
}

async fn run_chat(context: EngineContext, prompt: &str, mode: ChatMode) -> Result<i32> {
    let mut session = ChatSession::new(context);
    let events = session.subscribe();
    stop_on_ctrl_c(session.stop_handle());

    let printer = tokio::spawn(print_transcript(events));
    session.send(prompt, Vec::new(), mode).await;

    let failed = session
        .messages()
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
        .and_then(|m| m.error.clone());
    drop(session);
    let _ = printer.await;
    println!();

    match failed {
        Some(error) => {
            eprintln!("Error: {}", error);
            Ok(EXIT_FAILURE)
        }
        None => Ok(EXIT_SUCCESS),
    }
}

async fn run_plan(context: EngineContext, request: &str, auto_approve: bool) -> Result<i32> {
    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    let mut session = ChatSession::with_progress(context, progress_tx);
    stop_on_ctrl_c(session.stop_handle());

    let gate = session.approval_gate();
    let approver = tokio::spawn(approve_first_plan(gate.clone(), auto_approve));
    let progress = tokio::spawn(print_progress(progress_rx, gate));

    session.send(request, Vec::new(), ChatMode::Plan).await;
    approver.abort();

    let outcome = session
        .messages()
        .iter()
        .rev()
        .find(|m| matches!(m.role, Role::Agent | Role::Assistant | Role::Plan))
        .cloned();
    drop(session);
    progress.abort();

    match outcome {
        Some(Message { error: Some(error), .. }) => {
            eprintln!("Error: {}", error);
            Ok(EXIT_FAILURE)
        }
        Some(message) => {
            println!("\n{}", message.content);
            Ok(EXIT_SUCCESS)
        }
        None => Ok(EXIT_FAILURE),
    }
}

/// Wait for the first pending plan and decide it
async fn approve_first_plan(gate: Arc<ApprovalGate>, auto_approve: bool) {
    let mut plans = gate.subscribe();
    loop {
        let pending = plans
            .borrow_and_update()
            .clone()
            .filter(|p| p.status == PlanStatus::Pending);
        if let Some(plan) = pending {
            println!("{}", render_plan(&plan));
            let approved = auto_approve || confirm("Approve? [y/N] ").await;
            if approved {
                gate.approve_plan();
            } else {
                gate.reject_plan();
            }
            return;
        }
        if plans.changed().await.is_err() {
            return;
        }
    }
}

async fn confirm(prompt: &str) -> bool {
    print!("{}", prompt);
    let _ = io::stdout().flush();
    let answer = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line).map(|_| line)
    })
    .await;
    matches!(answer, Ok(Ok(line)) if matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Human-readable plan outline
pub fn render_plan(plan: &AgentPlan) -> String {
    let mut out = format!("Plan: {}\n", plan.title);
    for (i, group) in plan.parallel_groups.iter().enumerate() {
        let label = if group.len() > 1 { " (parallel)" } else { "" };
        out.push_str(&format!("\nStep {}{}\n", i + 1, label));
        for task in group {
            out.push_str(&format!("  - {}: {}\n", task.name, task.description));
        }
    }
    out
}

async fn print_progress(mut events: mpsc::UnboundedReceiver<OrchestrationEvent>, gate: Arc<ApprovalGate>) {
    let name_of = |task_id: &str| {
        gate.current_plan()
            .and_then(|p| p.find_task(task_id).map(|t| t.name.clone()))
            .unwrap_or_else(|| task_id.to_string())
    };
    while let Some(event) = events.recv().await {
        match event {
            OrchestrationEvent::GroupStarted { index, task_ids } => {
                eprintln!("[step {}] {} task(s)", index + 1, task_ids.len());
            }
            OrchestrationEvent::TaskStarted { task_id } => eprintln!("  started  {}", name_of(&task_id)),
            OrchestrationEvent::TaskFinished { task_id, status } => {
                eprintln!("  {:<8} {}", format!("{:?}", status).to_lowercase(), name_of(&task_id));
            }
            OrchestrationEvent::TaskUpdated { .. } | OrchestrationEvent::GroupFinished { .. } => {}
        }
    }
}

/// Stream assistant text to stdout and tool progress to stderr
async fn print_transcript(mut events: mpsc::UnboundedReceiver<SessionEvent>) {
    let mut printed: HashMap<String, usize> = HashMap::new();
    let mut tool_status: HashMap<String, ToolCallStatus> = HashMap::new();

    while let Some(event) = events.recv().await {
        let message = match event {
            SessionEvent::MessageAdded(m) | SessionEvent::MessageUpdated(m) => m,
            SessionEvent::MessageRemoved(_) | SessionEvent::Usage(_) => continue,
        };
        match message.role {
            Role::Assistant => {
                let done = printed.entry(message.id.clone()).or_insert(0);
                if let Some(fresh) = message.content.get(*done..) {
                    print!("{}", fresh);
                    let _ = io::stdout().flush();
                    *done = message.content.len();
                }
            }
            Role::Tool => {
                for call in &message.tool_calls {
                    if tool_status.get(&call.id) == Some(&call.status) {
                        continue;
                    }
                    tool_status.insert(call.id.clone(), call.status);
                    match call.status {
                        ToolCallStatus::Running => eprintln!("\n[tool] {} ...", call.name),
                        ToolCallStatus::Success => eprintln!("[tool] {} done", call.name),
                        ToolCallStatus::Error => eprintln!(
                            "[tool] {} failed: {}",
                            call.name,
                            call.error.as_deref().unwrap_or_default()
                        ),
                        ToolCallStatus::Pending => {}
                    }
                }
            }
            _ => {}
        }
    }
}
