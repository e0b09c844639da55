use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use client_logging::{client_info, client_warn};
use runboard_core::{HashSync, MemoryNavigation, Selection, SelectionStore};
use runboard_engine::{
    JobMachine, MachineState, ReqwestTransport, RunsPage, Transition, Transport,
};

use crate::cli::{Cli, Command};
use crate::render;

pub async fn run(cli: Cli) -> Result<()> {
    let transport = ReqwestTransport::new(cli.transport_settings())
        .with_context(|| format!("cannot use api url {}", cli.api_url))?;
    client_info!("using backend {}", transport.base_url());

    match &cli.command {
        Command::Projects => {
            let projects = transport.list_projects().await.context("listing projects")?;
            print!("{}", render::projects(&projects));
        }
        Command::Runs {
            project,
            limit,
            offset,
        } => show_runs(&transport, project, RunsPage::new(*limit, *offset)).await?,
        Command::Details { run } => show_details(&transport, run).await?,
        Command::Start { project } => {
            let machine = JobMachine::new(Arc::new(transport), cli.machine_settings());
            follow_job(&machine, project).await?;
        }
        Command::Open { link, project, run } => {
            open_link(&transport, link, project.as_deref(), run.as_deref()).await?
        }
    }
    Ok(())
}

async fn show_runs(transport: &dyn Transport, project: &str, page: RunsPage) -> Result<()> {
    let runs = transport
        .list_recent_runs(project, page)
        .await
        .with_context(|| format!("listing runs of {project}"))?;
    print!("{}", render::runs(&runs));
    Ok(())
}

async fn show_details(transport: &dyn Transport, run: &str) -> Result<()> {
    let details = transport
        .run_details(run)
        .await
        .with_context(|| format!("loading run {run}"))?;
    print!("{}", render::run_details(&details));
    Ok(())
}

async fn follow_job(machine: &JobMachine, project: &str) -> Result<()> {
    let _printer = machine.subscribe(|transition: &Transition| {
        println!("{}", render::transition(transition));
    });

    tokio::select! {
        submitted = machine.start(project) => {
            submitted.with_context(|| format!("submitting job for {project}"))?;
        }
        _ = tokio::signal::ctrl_c() => {
            client_warn!("interrupted during submission");
            machine.cancel();
            return Ok(());
        }
    }

    let state = tokio::select! {
        state = machine.wait() => state,
        _ = tokio::signal::ctrl_c() => {
            client_warn!("interrupted; cancelling job");
            machine.cancel();
            machine.wait().await
        }
    };

    match state {
        MachineState::Completed | MachineState::Cancelled => Ok(()),
        MachineState::Failed => {
            let message = machine
                .job()
                .and_then(|job| job.error_message().map(str::to_string))
                .unwrap_or_else(|| "backend reported failure".to_string());
            bail!("job failed: {message}")
        }
        MachineState::Errored => Err(machine
            .last_error()
            .map(anyhow::Error::from)
            .unwrap_or_else(|| anyhow!("job polling stopped")))
        .context("following job"),
        other => bail!("job stopped in unexpected state {other}"),
    }
}

async fn open_link(
    transport: &dyn Transport,
    link: &str,
    project: Option<&str>,
    run: Option<&str>,
) -> Result<()> {
    let navigation = Arc::new(
        MemoryNavigation::parse(link).with_context(|| format!("invalid link {link}"))?,
    );
    let store = SelectionStore::new();
    let sync = HashSync::attach(store.clone(), navigation.clone());

    if project.is_some() || run.is_some() {
        let current = sync.current();
        let next = Selection::new(
            project.unwrap_or(&current.project_id),
            run.unwrap_or(if project.is_some() { "" } else { &current.run_id }),
        );
        sync.select(&next);
    }

    let selection = store.get();
    println!("link: {}", navigation.url());
    let shown = if selection.has_run() {
        show_details(transport, &selection.run_id).await
    } else if !selection.project_id.is_empty() {
        show_runs(transport, &selection.project_id, RunsPage::default()).await
    } else {
        let projects = transport.list_projects().await.context("listing projects")?;
        print!("{}", render::projects(&projects));
        Ok(())
    };

    sync.teardown();
    store.teardown();
    shown
}
