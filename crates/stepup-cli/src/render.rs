use std::io::IsTerminal;

use anstyle::{AnsiColor, Effects, Style};
use stepup_core::{StepStatus, VersionMap};
use stepup_lifecycle::{Phase, PhaseReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn current_output_style() -> OutputStyle {
    resolve_output_style(
        std::io::stdout().is_terminal(),
        std::io::stderr().is_terminal(),
    )
}

pub(crate) fn resolve_output_style(stdout_is_tty: bool, _stderr_is_tty: bool) -> OutputStyle {
    if stdout_is_tty {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "warn" => "[WARN]",
        "err" => "[ERR]",
        _ => "[..]",
    }
}

/// Colors the leading badge of a rich line for terminal output.
pub(crate) fn paint_line(style: OutputStyle, line: &str) -> String {
    if style == OutputStyle::Plain {
        return line.to_string();
    }
    let Some((badge, rest)) = line.split_once(' ') else {
        return line.to_string();
    };
    let color = match badge {
        "[OK]" => ok_style(),
        "[WARN]" => warn_style(),
        "[ERR]" => err_style(),
        "[..]" => step_style(),
        _ => return line.to_string(),
    };
    format!("{} {rest}", colorize(color, badge))
}

pub(crate) fn print_lines(style: OutputStyle, lines: &[String]) {
    for line in lines {
        println!("{}", paint_line(style, line));
    }
}

fn ok_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightGreen.into()))
        .effects(Effects::BOLD)
}

fn warn_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightYellow.into()))
        .effects(Effects::BOLD)
}

fn err_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightRed.into()))
        .effects(Effects::BOLD)
}

fn step_style() -> Style {
    Style::new().fg_color(Some(AnsiColor::BrightCyan.into()))
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

pub(crate) fn format_status_lines(versions: &VersionMap) -> Vec<String> {
    if versions.is_empty() {
        return vec!["no members recorded".to_string()];
    }
    versions
        .members()
        .map(|(member, version)| format!("{member} {version}"))
        .collect()
}

pub(crate) fn format_phase_lines() -> Vec<String> {
    Phase::ALL
        .iter()
        .map(|phase| {
            format!(
                "{} {} {}",
                phase.as_str(),
                phase.prepare_hook(),
                phase.parse_hook()
            )
        })
        .collect()
}

pub(crate) fn format_phase_report_lines(report: &PhaseReport, style: OutputStyle) -> Vec<String> {
    let phase = report.phase;
    if report.registered == 0 {
        return vec![render_status_line(
            style,
            "step",
            &format!("{phase}: nothing to upgrade"),
        )];
    }

    let mut lines = Vec::new();
    for outcome in &report.report.outcomes {
        let status = match outcome.status {
            StepStatus::Committed => "ok",
            StepStatus::Pending => "step",
            StepStatus::Failed | StepStatus::PersistFailed => "err",
        };
        lines.push(render_status_line(
            style,
            status,
            &format!(
                "{phase}: {} -> {} {}",
                outcome.member,
                outcome.version,
                outcome.status.as_str()
            ),
        ));
    }

    for blocked in &report.report.blocked {
        lines.push(render_status_line(
            style,
            "warn",
            &format!(
                "{phase}: {} blocked at {}: {}",
                blocked.member, blocked.version, blocked.reason
            ),
        ));
    }

    if let Some(halt) = &report.report.halt {
        lines.push(render_status_line(
            style,
            "warn",
            &format!(
                "{phase}: halted at {}@{}: {}",
                halt.member, halt.version, halt.reason
            ),
        ));
    }

    lines
}
