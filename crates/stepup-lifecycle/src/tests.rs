use std::cell::RefCell;
use std::rc::Rc;

use serial_test::serial;
use stepup_core::{
    step_fn, MemoryVersionStore, RunOptions, StepCallback, StepStatus, Unlimited,
    UpgradeRegistry, Version, VersionMap, WriteMode,
};

use super::*;

type EventLog = Rc<RefCell<Vec<String>>>;

fn event_log() -> EventLog {
    Rc::new(RefCell::new(Vec::new()))
}

fn events(log: &EventLog) -> Vec<String> {
    log.borrow().clone()
}

/// Registers `member` steps for the given phases while they are still pending.
struct MemberConsumer {
    member: String,
    steps: Vec<(Phase, &'static str, bool)>,
    log: EventLog,
}

impl MemberConsumer {
    fn new(member: &str, steps: &[(Phase, &'static str, bool)], log: &EventLog) -> Self {
        Self {
            member: member.to_string(),
            steps: steps.to_vec(),
            log: Rc::clone(log),
        }
    }
}

impl UpgradeConsumer for MemberConsumer {
    fn name(&self) -> &str {
        &self.member
    }

    fn prepare(&mut self, phase: Phase, versions: &VersionMap, registry: &mut UpgradeRegistry) {
        self.log.borrow_mut().push(format!(
            "{}:{}:prev={}:cur={}",
            phase,
            self.member,
            versions.previous_version(&self.member),
            versions.current_version(&self.member)
        ));
        for (step_phase, target, succeed) in &self.steps {
            let target = Version::from(*target);
            if *step_phase != phase || !versions.needs_upgrade(&self.member, &target) {
                continue;
            }
            let log = Rc::clone(&self.log);
            let member = self.member.clone();
            let succeed = *succeed;
            registry.register(
                self.member.clone(),
                target,
                step_fn(move |version| {
                    log.borrow_mut().push(format!("run {member}->{version}"));
                    succeed
                }),
            );
        }
    }
}

#[test]
fn phases_fire_in_declared_order_with_hook_names() {
    let hooks = Phase::ALL
        .iter()
        .flat_map(|phase| [phase.prepare_hook(), phase.parse_hook()])
        .collect::<Vec<_>>();
    assert_eq!(
        hooks,
        vec![
            "prepare-critical",
            "parse-critical",
            "prepare-admin",
            "parse-admin",
            "prepare-network-admin",
            "parse-network-admin",
            "prepare-always",
            "parse-always",
            "prepare-network-always",
            "parse-network-always",
        ]
    );
    assert!(Phase::Critical < Phase::Admin);
    assert!(Phase::Always < Phase::NetworkAlways);
}

#[test]
fn phase_names_parse_and_reject_unknown_values() {
    for phase in Phase::ALL {
        assert_eq!(phase.to_string().parse::<Phase>().expect("must parse"), phase);
    }
    let err = "boot".parse::<Phase>().expect_err("must reject unknown phase");
    assert!(err.to_string().contains("unknown upgrade phase: 'boot'"));
}

#[test]
fn phase_applicability_follows_host_context() {
    let front = HostContext::default();
    let admin = HostContext {
        admin: true,
        network: false,
    };
    let network_admin = HostContext {
        admin: true,
        network: true,
    };
    let network_front = HostContext {
        admin: false,
        network: true,
    };

    let applicable = |context: &HostContext| {
        Phase::ALL
            .into_iter()
            .filter(|phase| phase.applies_to(context))
            .map(|phase| phase.as_str())
            .collect::<Vec<_>>()
    };
    assert_eq!(applicable(&front), vec!["critical", "always"]);
    assert_eq!(applicable(&admin), vec!["critical", "admin", "always"]);
    assert_eq!(
        applicable(&network_admin),
        vec!["critical", "admin", "network-admin", "always", "network-always"]
    );
    assert_eq!(
        applicable(&network_front),
        vec!["critical", "always", "network-always"]
    );
}

#[test]
#[serial]
fn host_runs_phase_and_persists_progress() {
    let log = event_log();
    let mut host = UpgradeHost::new(MemoryVersionStore::new(), Unlimited, RunOptions::default());
    host.add_consumer(MemberConsumer::new(
        "core",
        &[(Phase::Always, "2500", true), (Phase::Always, "2700", true)],
        &log,
    ));

    let report = host.run_phase(Phase::Always).expect("must run phase");

    assert_eq!(report.phase, Phase::Always);
    assert_eq!(report.registered, 2);
    assert!(!report.halted());
    assert_eq!(host.current_version("core").expect("must read").as_str(), "2700");
    assert_eq!(host.previous_version("core").expect("must read").as_str(), "0");
    assert_eq!(host.store().writes().len(), 2);
    assert_eq!(
        events(&log),
        vec!["always:core:prev=0:cur=0", "run core->2500", "run core->2700"]
    );
}

#[test]
#[serial]
fn later_phases_see_versions_committed_by_earlier_phases() {
    let log = event_log();
    let mut host = UpgradeHost::new(MemoryVersionStore::new(), Unlimited, RunOptions::default());
    host.add_consumer(MemberConsumer::new(
        "core",
        &[(Phase::Critical, "2500", true), (Phase::Always, "2700", true)],
        &log,
    ));

    let reports = host
        .run_lifecycle(&HostContext::default())
        .expect("must run lifecycle");

    let phases = reports.iter().map(|report| report.phase).collect::<Vec<_>>();
    assert_eq!(phases, vec![Phase::Critical, Phase::Always]);
    assert_eq!(
        events(&log),
        vec![
            "critical:core:prev=0:cur=0",
            "run core->2500",
            "always:core:prev=2500:cur=2500",
            "run core->2700",
        ]
    );
    assert_eq!(host.previous_version("core").expect("must read").as_str(), "2500");
    assert_eq!(host.current_version("core").expect("must read").as_str(), "2700");
}

#[test]
#[serial]
fn halted_phase_does_not_prevent_later_phases() {
    let log = event_log();
    let mut host = UpgradeHost::new(MemoryVersionStore::new(), Unlimited, RunOptions::default());
    host.add_consumer(MemberConsumer::new(
        "core",
        &[(Phase::Critical, "2500", false)],
        &log,
    ));
    host.add_consumer(MemberConsumer::new("ext1", &[(Phase::Always, "10", true)], &log));

    let reports = host
        .run_lifecycle(&HostContext::default())
        .expect("must run lifecycle");

    assert!(reports[0].halted());
    assert_eq!(
        reports[0].report.outcomes[0].status,
        StepStatus::Failed
    );
    assert!(!reports[1].halted());
    assert_eq!(host.current_version("core").expect("must read").as_str(), "0");
    assert_eq!(host.current_version("ext1").expect("must read").as_str(), "10");
}

#[test]
#[serial]
fn rerunning_lifecycle_without_new_steps_writes_nothing() {
    let log = event_log();
    let mut host = UpgradeHost::new(MemoryVersionStore::new(), Unlimited, RunOptions::default());
    host.add_consumer(MemberConsumer::new(
        "core",
        &[(Phase::Critical, "2500", true), (Phase::Admin, "2700", true)],
        &log,
    ));
    let context = HostContext {
        admin: true,
        network: false,
    };

    host.run_lifecycle(&context).expect("must run lifecycle");
    assert_eq!(host.store().writes().len(), 2);

    let reports = host.run_lifecycle(&context).expect("must rerun lifecycle");
    assert!(reports.iter().all(|report| report.registered == 0));
    assert_eq!(host.store().writes().len(), 2);
}

#[test]
#[serial]
fn host_loads_versions_lazily_before_any_phase() {
    let store = MemoryVersionStore::with_versions([("core", "2500")]);
    let mut host = UpgradeHost::new(store, Unlimited, RunOptions::default());

    assert_eq!(host.current_version("core").expect("must read").as_str(), "2500");
    assert_eq!(host.versions().expect("must load").len(), 1);
    assert!(host.store().writes().is_empty());
}

#[test]
#[serial]
fn host_applies_configured_run_options() {
    let log = event_log();
    let options = RunOptions {
        write_mode: WriteMode::PerVersion,
        ..RunOptions::default()
    };
    let mut host = UpgradeHost::new(MemoryVersionStore::new(), Unlimited, options);
    host.add_consumer(MemberConsumer::new("core", &[(Phase::Always, "2500", true)], &log));
    host.add_consumer(MemberConsumer::new("core", &[(Phase::Always, "2500", true)], &log));

    let report = host.run_phase(Phase::Always).expect("must run phase");

    assert_eq!(host.options().write_mode, WriteMode::PerVersion);
    assert_eq!(report.registered, 2);
    assert_eq!(host.store().writes().len(), 1);
}

#[test]
#[serial]
fn dropped_host_allows_a_new_host() {
    let first = UpgradeHost::new(MemoryVersionStore::new(), Unlimited, RunOptions::default());
    drop(first);
    let second = UpgradeHost::new(MemoryVersionStore::new(), Unlimited, RunOptions::default());
    assert!(format!("{second:?}").contains("UpgradeHost"));
}

#[cfg(debug_assertions)]
#[test]
#[serial]
#[should_panic(expected = "only one upgrade host may be live per process")]
fn second_live_host_trips_debug_assertion() {
    let _first = UpgradeHost::new(MemoryVersionStore::new(), Unlimited, RunOptions::default());
    let _second = UpgradeHost::new(MemoryVersionStore::new(), Unlimited, RunOptions::default());
}

#[test]
fn step_plan_applies_defaults() {
    let plan = StepPlan::from_toml_str(
        r#"
[[steps]]
member = "core"
version = "2500"
command = ["true"]
"#,
    )
    .expect("plan must parse");

    assert_eq!(plan.version, 1);
    assert_eq!(plan.options, RunOptions::default());
    assert_eq!(plan.steps[0].phase, Phase::Always);
}

#[test]
fn step_plan_reads_options_and_phases() {
    let plan = StepPlan::from_toml_str(
        r#"
version = 1

[options]
min_headroom_bytes = 1048576
failure_scope = "isolate-member"
write_mode = "per-version"

[[steps]]
member = "core"
version = "2500"
phase = "critical"
command = ["sh", "-c", "exit 0"]

[[steps]]
member = "ext1"
version = "10"
phase = "network-admin"
command = ["true"]
"#,
    )
    .expect("plan must parse");

    assert_eq!(plan.options.min_headroom_bytes, 1_048_576);
    assert_eq!(
        plan.options.failure_scope,
        stepup_core::FailureScope::IsolateMember
    );
    assert_eq!(plan.options.write_mode, WriteMode::PerVersion);
    assert_eq!(plan.steps_for(Phase::Critical).count(), 1);
    assert_eq!(
        plan.steps_for(Phase::NetworkAdmin)
            .map(|step| step.member.as_str())
            .collect::<Vec<_>>(),
        vec!["ext1"]
    );
}

#[test]
fn step_plan_rejects_invalid_steps() {
    let cases = [
        (
            "[[steps]]\nmember = \"\"\nversion = \"1\"\ncommand = [\"true\"]\n",
            "has an empty member",
        ),
        (
            "[[steps]]\nmember = \"core\"\nversion = \" \"\ncommand = [\"true\"]\n",
            "invalid version: must not be empty",
        ),
        (
            "[[steps]]\nmember = \"core\"\nversion = \"1\"\ncommand = []\n",
            "has an empty command",
        ),
        (
            "version = 3\n",
            "unsupported upgrade plan version 3",
        ),
        (
            "[[steps]]\nmember = \"core\"\nversion = \"1\"\nphase = \"boot\"\ncommand = [\"true\"]\n",
            "failed to parse upgrade plan",
        ),
    ];

    for (input, expected) in cases {
        let err = StepPlan::from_toml_str(input).expect_err("plan must be rejected");
        assert!(
            format!("{err:#}").contains(expected),
            "unexpected error for {input:?}: {err:#}"
        );
    }
}

#[test]
fn plan_consumer_registers_only_pending_steps_of_the_phase() {
    let plan = StepPlan::from_toml_str(
        r#"
[[steps]]
member = "core"
version = "2500"
command = ["true"]

[[steps]]
member = "core"
version = "2700"
command = ["true"]

[[steps]]
member = "ext1"
version = "10"
phase = "critical"
command = ["true"]
"#,
    )
    .expect("plan must parse");
    let mut consumer = PlanConsumer::new("plan", &plan);
    let versions = VersionMap::from_versions([("core", "2500")]);

    let pending = consumer
        .pending(Phase::Always, &versions)
        .map(|step| format!("{}@{}", step.member, step.version))
        .collect::<Vec<_>>();
    assert_eq!(pending, vec!["core@2700"]);

    let mut registry = UpgradeRegistry::new();
    consumer.prepare(Phase::Always, &versions, &mut registry);
    assert_eq!(consumer.name(), "plan");
    let summary = registry.finalize().summary();
    assert_eq!(summary, vec![("core".to_string(), Version::from("2700"), 1)]);
}

#[cfg(unix)]
#[test]
#[serial]
fn padded_plan_version_runs_once() {
    let plan = StepPlan::from_toml_str(
        r#"
[[steps]]
member = "core"
version = " 2500 "
command = ["true"]
"#,
    )
    .expect("plan must parse");
    assert_eq!(plan.steps[0].version.as_str(), "2500");

    let mut host = UpgradeHost::new(MemoryVersionStore::new(), Unlimited, RunOptions::default());
    host.add_consumer(PlanConsumer::new("plan", &plan));

    let first = host.run_phase(Phase::Always).expect("must run phase");
    assert_eq!(first.registered, 1);
    assert_eq!(host.store().current().get("core").map(String::as_str), Some("2500"));

    let second = host.run_phase(Phase::Always).expect("must rerun phase");
    let third = host.run_phase(Phase::Always).expect("must rerun phase again");
    assert_eq!(second.registered, 0);
    assert_eq!(third.registered, 0);
    assert_eq!(host.store().writes().len(), 1);
}

#[test]
fn command_step_rejects_empty_argv() {
    let err = CommandStep::new("core", &[]).expect_err("must reject empty command");
    assert!(err.to_string().contains("must not be empty"));
}

#[cfg(unix)]
#[test]
fn command_step_passes_member_and_target_version() {
    let argv = [
        "sh".to_string(),
        "-c".to_string(),
        r#"test "$STEPUP_MEMBER" = core && test "$STEPUP_TARGET_VERSION" = 2500"#.to_string(),
    ];
    let mut step = CommandStep::new("core", &argv).expect("must build step");
    assert_eq!(step.program(), "sh");

    step.run(&Version::from("2500")).expect("command must succeed");
    let err = step
        .run(&Version::from("2700"))
        .expect_err("command must fail for other version");
    assert!(err.to_string().contains("upgrade command 'sh' exited with"));
}

#[cfg(unix)]
#[test]
fn command_step_reports_launch_failure() {
    let argv = ["/nonexistent/stepup-migration".to_string()];
    let mut step = CommandStep::new("core", &argv).expect("must build step");

    let err = step
        .run(&Version::from("1"))
        .expect_err("missing program must fail");
    assert!(err
        .to_string()
        .contains("failed to launch upgrade command '/nonexistent/stepup-migration'"));
}

#[cfg(unix)]
#[test]
#[serial]
fn plan_driven_host_runs_commands_in_phase_order() {
    let plan = StepPlan::from_toml_str(
        r#"
[[steps]]
member = "core"
version = "2700"
command = ["sh", "-c", "exit 0"]

[[steps]]
member = "core"
version = "2500"
phase = "critical"
command = ["sh", "-c", "exit 0"]

[[steps]]
member = "ext1"
version = "10"
command = ["sh", "-c", "exit 3"]
"#,
    )
    .expect("plan must parse");

    let mut host = UpgradeHost::new(MemoryVersionStore::new(), Unlimited, plan.options);
    host.add_consumer(PlanConsumer::new("plan", &plan));
    let reports = host
        .run_lifecycle(&HostContext::default())
        .expect("must run lifecycle");

    assert!(!reports[0].halted());
    assert!(reports[1].halted());
    assert_eq!(host.current_version("core").expect("must read").as_str(), "2700");
    assert_eq!(host.current_version("ext1").expect("must read").as_str(), "0");
    let halt = reports[1].report.halt.as_ref().expect("always phase must halt");
    assert_eq!(halt.member, "ext1");
    assert!(halt.reason.to_string().contains("exited with"));
}
