use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use stepup_core::{FailureScope, RunOptions, SystemMemoryProbe, Version, VersionMap, WriteMode};
use stepup_lifecycle::{HostContext, Phase, PlanConsumer, StepPlan, UpgradeHost};
use stepup_store::FileVersionStore;

use crate::render::{
    current_output_style, format_phase_lines, format_phase_report_lines, format_status_lines,
    print_lines, render_status_line, OutputStyle,
};
use crate::{Cli, Commands, ContextArgs, RunOverrides};

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    let style = current_output_style();
    let state_root = match cli.state_root {
        Some(root) => root,
        None => default_state_root()?,
    };

    match cli.command {
        Commands::Status => {
            let store = FileVersionStore::new(&state_root);
            let versions = VersionMap::load(&store)?;
            print_lines(OutputStyle::Plain, &format_status_lines(&versions));
        }
        Commands::Phases => {
            print_lines(OutputStyle::Plain, &format_phase_lines());
        }
        Commands::Plan { plan, context } => {
            let store = FileVersionStore::new(&state_root);
            let versions = VersionMap::load(&store)?;
            let plan = StepPlan::load(&plan)?;
            let lines = format_plan_lines(&plan, &versions, &host_context(context));
            print_lines(style, &lines);
        }
        Commands::Run {
            plan,
            context,
            overrides,
        } => {
            let summary = execute_run(&state_root, &plan, context, overrides, style)?;
            print_lines(style, &summary.lines);
            if summary.halted_phases > 0 {
                return Err(anyhow!(
                    "upgrade halted in {} phase(s); rerun after fixing the failing step",
                    summary.halted_phases
                ));
            }
        }
    }

    Ok(())
}

pub(crate) fn default_state_root() -> Result<PathBuf> {
    if let Some(root) = env::var_os("STEPUP_STATE_ROOT").filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(root));
    }

    if cfg!(windows) {
        let local_app_data =
            env::var_os("LOCALAPPDATA").context("LOCALAPPDATA is not set; pass --state-root")?;
        return Ok(PathBuf::from(local_app_data).join("Stepup"));
    }

    let home = env::var_os("HOME").context("HOME is not set; pass --state-root")?;
    Ok(PathBuf::from(home).join(".stepup"))
}

pub(crate) fn host_context(args: ContextArgs) -> HostContext {
    HostContext {
        admin: args.admin,
        network: args.network,
    }
}

/// Applies command-line overrides on top of a plan's `[options]` table.
pub(crate) fn build_run_options(base: RunOptions, overrides: RunOverrides) -> RunOptions {
    let mut options = base;
    if overrides.isolate_members {
        options.failure_scope = FailureScope::IsolateMember;
    }
    if overrides.group_writes {
        options.write_mode = WriteMode::PerVersion;
    }
    if let Some(min_bytes) = overrides.min_headroom_bytes {
        options.min_headroom_bytes = min_bytes;
    }
    options
}

/// Lists what each applicable phase would register, assuming every earlier
/// step succeeds.
pub(crate) fn format_plan_lines(
    plan: &StepPlan,
    versions: &VersionMap,
    context: &HostContext,
) -> Vec<String> {
    let consumer = PlanConsumer::new("plan", plan);
    let mut expected: BTreeMap<String, Version> = versions
        .members()
        .map(|(member, version)| (member.to_string(), version.clone()))
        .collect();
    let mut lines = Vec::new();

    for phase in Phase::ALL {
        if !phase.applies_to(context) {
            continue;
        }

        let snapshot = VersionMap::from_versions(expected.clone());
        for step in consumer.pending(phase, &snapshot) {
            lines.push(format!(
                "{phase}: {} {} -> {} ({})",
                step.member,
                snapshot.current_version(&step.member),
                step.version,
                step.command.join(" ")
            ));
            let target = step.version.clone();
            let entry = expected
                .entry(step.member.clone())
                .or_insert_with(Version::initial);
            if target > *entry {
                *entry = target;
            }
        }
    }

    if lines.is_empty() {
        lines.push("nothing to upgrade".to_string());
    }
    lines
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RunSummary {
    pub(crate) lines: Vec<String>,
    pub(crate) halted_phases: usize,
}

pub(crate) fn execute_run(
    state_root: &Path,
    plan_path: &Path,
    context: ContextArgs,
    overrides: RunOverrides,
    style: OutputStyle,
) -> Result<RunSummary> {
    let plan = StepPlan::load(plan_path)?;
    let options = build_run_options(plan.options, overrides);
    let store = FileVersionStore::new(state_root);
    let lock = store.lock()?;
    tracing::debug!(
        state_root = %state_root.display(),
        plan = %plan_path.display(),
        steps = plan.steps.len(),
        "starting upgrade run"
    );

    let reports = {
        let mut host = UpgradeHost::new(store, SystemMemoryProbe, options);
        host.add_consumer(PlanConsumer::new(plan_path.display().to_string(), &plan));
        host.run_lifecycle(&host_context(context))?
    };
    lock.release()?;

    let mut lines = Vec::new();
    let mut halted_phases = 0;
    for report in &reports {
        lines.extend(format_phase_report_lines(report, style));
        if report.halted() {
            halted_phases += 1;
        }
    }
    if halted_phases == 0 {
        let writes: usize = reports.iter().map(|report| report.report.writes()).sum();
        lines.push(render_status_line(
            style,
            "ok",
            &format!("upgrade complete ({writes} write(s))"),
        ));
    }

    Ok(RunSummary {
        lines,
        halted_phases,
    })
}
