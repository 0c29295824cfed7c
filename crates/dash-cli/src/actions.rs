use std::io::Write;

use clap::Args;

use dash_api::types::{DeleteVolumesRequest, StopRunsRequest};

use crate::Context;

#[derive(Debug, Clone, Args)]
pub struct StopArgs {
    /// Run names.
    #[arg(required = true)]
    pub runs: Vec<String>,

    /// Terminate immediately instead of stopping gracefully.
    #[arg(long)]
    pub abort: bool,
}

#[derive(Debug, Clone, Args)]
pub struct DeleteVolumesArgs {
    /// Volume names.
    #[arg(required = true)]
    pub names: Vec<String>,
}

pub async fn stop(
    ctx: &Context,
    project: &str,
    args: &StopArgs,
    stdout: &mut dyn Write,
) -> Result<(), String> {
    let request = StopRunsRequest {
        runs_names: args.runs.clone(),
        abort: args.abort,
    };
    ctx.api
        .stop_runs(project, &request)
        .await
        .map_err(|err| err.to_string())?;
    let verb = if args.abort { "Aborted" } else { "Stopping" };
    writeln!(stdout, "{verb} {} run(s)", args.runs.len()).map_err(|err| err.to_string())
}

pub async fn delete_volumes(
    ctx: &Context,
    project: &str,
    args: &DeleteVolumesArgs,
    stdout: &mut dyn Write,
) -> Result<(), String> {
    let request = DeleteVolumesRequest {
        names: args.names.clone(),
    };
    ctx.api
        .delete_volumes(project, &request)
        .await
        .map_err(|err| err.to_string())?;
    writeln!(stdout, "Deleted {} volume(s)", args.names.len()).map_err(|err| err.to_string())
}
