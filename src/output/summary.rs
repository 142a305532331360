use std::fmt::Write;

use comfy_table::Cell;
use openqa_client::jobs::{Job, JobResult, ResultGroup};

use super::styling::{heading, job_id, label, Tone};
use super::tables::{jobs_table, toned_cell};

/// Prints a table of job records to stdout, preceded by result counts.
///
/// Colors follow [`Tone`]: passed jobs green, soft failures yellow,
/// failures and incompletes red, aborted jobs grey. Jobs still running
/// show their state in yellow.
pub fn print_jobs(jobs: &[Job]) {
    println!("{}", render_jobs(jobs));
}

/// One line per finished job, as reported while waiting.
pub fn render_finished(job: &Job) -> String {
    format!(
        "  {} {} {} {}",
        job_id(job.id),
        job.test_name().unwrap_or("-"),
        Tone::of_result(job.result).paint(job.result),
        label(format!("({})", job.state))
    )
}

struct Counts {
    passed: usize,
    failed: usize,
    aborted: usize,
    pending: usize,
}

fn count_results(jobs: &[Job]) -> Counts {
    let mut counts = Counts {
        passed: 0,
        failed: 0,
        aborted: 0,
        pending: 0,
    };
    for job in jobs {
        if !job.is_final() {
            counts.pending += 1;
        } else if job.result.is_ok() {
            counts.passed += 1;
        } else if job.result.group() == Some(ResultGroup::Aborted) {
            counts.aborted += 1;
        } else {
            counts.failed += 1;
        }
    }
    counts
}

fn scenario(job: &Job) -> String {
    ["FLAVOR", "ARCH", "MACHINE"]
        .iter()
        .filter_map(|key| job.settings.get(*key).map(String::as_str))
        .collect::<Vec<_>>()
        .join(" / ")
}

fn render_jobs(jobs: &[Job]) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "{}", heading("📊", "Overview"));
    let counts = count_results(jobs);
    let _ = writeln!(
        output,
        "  {} {}\n  {} {}\n  {} {}\n  {} {}\n  {} {}\n",
        label("Jobs:"),
        Tone::Plain.paint(jobs.len()),
        label("Passed:"),
        Tone::Good.paint(counts.passed),
        label("Failed:"),
        Tone::Bad.paint(counts.failed),
        label("Aborted:"),
        Tone::Muted.paint(counts.aborted),
        label("Still running:"),
        Tone::Warning.paint(counts.pending),
    );

    if jobs.is_empty() {
        let _ = writeln!(output, "  {}", label("No jobs found"));
        return output;
    }

    let _ = writeln!(output, "{}", heading("🧪", "Jobs"));
    let mut table = jobs_table();
    for job in jobs {
        // a pending job's result is meaningless until it finishes
        let result = if job.is_final() {
            job.result
        } else {
            JobResult::None
        };
        table.add_row(vec![
            Cell::new(job.id),
            Cell::new(job.test_name().unwrap_or("-")),
            Cell::new(scenario(job)),
            toned_cell(job.state, Tone::of_state(job.state)),
            toned_cell(result, Tone::of_result(result)),
            Cell::new(job.clone_id.map_or_else(|| "-".to_string(), |id| id.to_string())),
        ]);
    }
    let _ = writeln!(output, "{table}");

    output
}
