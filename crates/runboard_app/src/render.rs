//! Plain-text rendering of backend records for the terminal.

use chrono::{DateTime, Local};
use runboard_engine::{Job, MachineState, Project, RecentRun, RunDetails, TaskDetails, Transition};

pub fn projects(projects: &[Project]) -> String {
    if projects.is_empty() {
        return "no projects\n".to_string();
    }
    let width = projects.iter().map(|p| p.id.len()).max().unwrap_or(0);
    projects
        .iter()
        .map(|project| format_project_row(project, width))
        .collect()
}

fn format_project_row(project: &Project, width: usize) -> String {
    let mut row = format!("{:<width$}  {}\n", project.id, project.name);
    if !project.description.is_empty() {
        row.push_str(&format!("{:<width$}  {}\n", "", project.description));
    }
    row
}

pub fn runs(runs: &[RecentRun]) -> String {
    if runs.is_empty() {
        return "no runs\n".to_string();
    }
    let header = format!(
        "{:<38} {:<16} {:<12} {:>6} {:>5} {:>5} {:>5} {:>5}\n",
        "RUN", "DATE", "MODEL", "SCORE", "TESTS", "PASS", "FAIL", "REGR"
    );
    std::iter::once(header)
        .chain(runs.iter().map(format_run_row))
        .collect()
}

fn format_run_row(run: &RecentRun) -> String {
    format!(
        "{:<38} {:<16} {:<12} {:>5.1}% {:>5} {:>5} {:>5} {:>5}{}\n",
        run.id,
        local_date(&run.date),
        run.model,
        run.score * 100.0,
        run.total_tests,
        run.pass,
        run.fail,
        run.regression,
        flags(run),
    )
}

pub fn run_details(details: &RunDetails) -> String {
    let header = format!(
        "run {} of {} ({}) - {}\nstarted {}\n",
        details.id,
        details.project.name,
        details.project.id,
        details.status,
        local_date(&details.date)
    );
    std::iter::once(header)
        .chain(details.tasks.iter().map(format_task_row))
        .collect()
}

fn format_task_row(task: &TaskDetails) -> String {
    let verdict = match task.eval_passed {
        Some(true) => "pass",
        Some(false) => "FAIL",
        None => "-",
    };
    let score = task
        .eval_score
        .map(|score| format!("{score:.2}"))
        .unwrap_or_else(|| "-".to_string());
    let row = format!("  {:<24} {:<10} {:<4} {:>5}", task.id, task.status, verdict, score);
    match &task.error {
        Some(error) => format!("{row}  {error}\n"),
        None => format!("{row}\n"),
    }
}

/// One status line per machine transition.
pub fn transition(transition: &Transition) -> String {
    let mut line = format!("[{}]", transition.state);
    if let Some(job) = &transition.job {
        line.push_str(&format!(" job {}{}", job.job_id, progress(job)));
    }
    if let Some(error) = &transition.error {
        line.push_str(&format!(" - {error}"));
    }
    if transition.state == MachineState::Failed {
        if let Some(message) = transition.job.as_ref().and_then(Job::error_message) {
            line.push_str(&format!(" - {message}"));
        }
    }
    line
}

fn progress(job: &Job) -> String {
    let Some(fraction) = job.progress() else {
        return format!(" ({})", job.status);
    };
    let counts = job.task_counts();
    format!(
        " ({}) {}/{} tasks {:.0}%, {} passed, {} failed",
        job.status,
        job.current_task.unwrap_or(0),
        job.total_tasks,
        fraction * 100.0,
        counts.completed,
        counts.failed
    )
}

fn flags(run: &RecentRun) -> &'static str {
    match (run.bookmarked.unwrap_or(false), run.noted.unwrap_or(false)) {
        (true, true) => "  *+",
        (true, false) => "  *",
        (false, true) => "  +",
        (false, false) => "",
    }
}

/// Formats an RFC 3339 timestamp in local time, or returns it untouched.
fn local_date(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|date| date.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use runboard_engine::{ClientError, JobStatus};

    fn job(status: JobStatus, current: Option<u64>) -> Job {
        Job {
            project_id: "p".into(),
            job_id: "job-9".into(),
            status,
            total_tasks: 4,
            current_task: current,
            task_status_map: None,
            details: None,
        }
    }

    #[test]
    fn transition_line_shows_progress() {
        let line = transition(&Transition {
            state: MachineState::Polling,
            job: Some(job(JobStatus::Running, Some(2))),
            error: None,
        });
        assert_eq!(
            line,
            "[polling] job job-9 (running) 2/4 tasks 50%, 0 passed, 0 failed"
        );
    }

    #[test]
    fn transition_line_shows_error() {
        let line = transition(&Transition {
            state: MachineState::Errored,
            job: None,
            error: Some(ClientError::Http { status: 503 }),
        });
        assert_eq!(line, "[errored] - http status 503");
    }

    #[test]
    fn unparseable_dates_pass_through() {
        assert_eq!(local_date("yesterday"), "yesterday");
    }

    #[test]
    fn project_rows_indent_descriptions_under_names() {
        let listing = projects(&[
            Project {
                id: "proj-1".into(),
                name: "Support bot".into(),
                description: "Regression suite".into(),
            },
            Project {
                id: "p2".into(),
                name: "Search".into(),
                description: String::new(),
            },
        ]);
        assert_eq!(
            listing,
            "proj-1  Support bot\n        Regression suite\np2      Search\n"
        );
    }

    #[test]
    fn empty_listings_say_so() {
        assert_eq!(projects(&[]), "no projects\n");
        assert_eq!(runs(&[]), "no runs\n");
    }
}
