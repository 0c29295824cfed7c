use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::Args;

use dash_feed::notify::TracingNotifier;
use dash_feed::run_logs::{RunLogArgs, RunLogQuery};
use dash_feed::tail::LogTail;
use dash_feed::{InfiniteList, LoadOutcome, LogEvent};

use crate::Context;

#[derive(Debug, Clone, Args)]
pub struct LogsArgs {
    /// Run name.
    pub run: String,

    /// Keep polling for new lines until interrupted.
    #[arg(long, short = 'f')]
    pub follow: bool,

    /// Restrict to one job submission.
    #[arg(long)]
    pub job: Option<String>,

    /// Lines fetched per request.
    #[arg(long, default_value_t = 500)]
    pub batch: usize,
}

pub fn format_log_line(event: &LogEvent, json: bool) -> String {
    if json {
        return serde_json::to_string(event).unwrap_or_default();
    }
    let at = DateTime::<Utc>::from_timestamp_millis(event.timestamp).unwrap_or_default();
    format!("{} {}", at.format("%Y-%m-%d %H:%M:%S%.3f"), event.message)
}

fn write_lines(events: &[LogEvent], json: bool, stdout: &mut dyn Write) -> Result<(), String> {
    for event in events {
        writeln!(stdout, "{}", format_log_line(event, json)).map_err(|err| err.to_string())?;
    }
    Ok(())
}

/// Fetch until the log has nothing more to give.
async fn drain(list: &InfiniteList<RunLogQuery>) -> Result<(), String> {
    loop {
        match list.load_more().await {
            LoadOutcome::Appended { .. } => {}
            LoadOutcome::Failed(err) => return Err(err.to_string()),
            LoadOutcome::Exhausted | LoadOutcome::InFlight | LoadOutcome::Stale => return Ok(()),
        }
    }
}

pub async fn run(
    ctx: &Context,
    project: &str,
    args: &LogsArgs,
    json: bool,
    stdout: &mut dyn Write,
) -> Result<(), String> {
    let mut run_args = RunLogArgs::new(project, &args.run);
    run_args.job_submission_id = args.job.clone();
    let list = RunLogQuery::new(ctx.api.clone(), args.batch)
        .into_list(run_args, Arc::new(TracingNotifier));

    drain(&list).await?;
    write_lines(&list.items(), json, stdout)?;
    if !args.follow {
        return Ok(());
    }

    let mut tail = LogTail::from_config(list, &ctx.tail, &args.run);
    let mut write_error = None;
    tail.follow(ctx.cancel.clone(), |batch| {
        if write_error.is_none() {
            write_error = write_lines(batch, json, stdout).err();
        }
    })
    .await;
    match write_error {
        Some(message) => Err(message),
        None => Ok(()),
    }
}
