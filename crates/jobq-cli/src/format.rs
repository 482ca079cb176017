//! Plain fixed-width table output for machine-legible CLI listings (spec
//! §4.7). No table crate, no color: `queue list`/`dlq list`/`status` are
//! aimed at scripts over a human terminal.

use jobq_core::Job;

pub fn queue_table(jobs: &[Job]) {
    println!("{:<6} {:<10} {:<9} {:<25} {}", "id", "state", "attempts", "next_run", "command");
    for job in jobs {
        println!(
            "{:<6} {:<10} {:<9} {:<25} {}",
            job.id,
            job.state.as_str(),
            job.attempts,
            job.next_run_at.to_rfc3339(),
            truncate_command(&job.command),
        );
    }
}

pub fn dlq_table(jobs: &[Job]) {
    println!("{:<6} {:<40} {}", "id", "error", "command");
    for job in jobs {
        println!(
            "{:<6} {:<40} {}",
            job.id,
            job.last_error.as_deref().unwrap_or(""),
            truncate_command(&job.command),
        );
    }
}

fn truncate_command(command: &str) -> String {
    const MAX: usize = 80;
    if command.len() <= MAX {
        return command.to_string();
    }
    let mut end = MAX;
    while !command.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &command[..end])
}
