use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use tabwriter::TabWriter;

use dash_api::types::{Event, Instance, Run, Volume};
use dash_api::{ListEntity, ListFilter};
use dash_feed::infinite::EntityFeed;
use dash_feed::notify::TracingNotifier;
use dash_feed::{LoadOutcome, PageOutcome, PagedList};

use crate::Context;

#[derive(Debug, Clone, Args)]
pub struct ListArgs {
    /// How many pages to walk, starting from the newest.
    #[arg(long, default_value_t = 1)]
    pub pages: usize,

    /// Items per page; defaults to `pagination.page_size`.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Only items that are still active.
    #[arg(long)]
    pub active: bool,

    /// Do not filter by project.
    #[arg(long)]
    pub all_projects: bool,
}

impl ListArgs {
    fn filter(&self, project: &str) -> ListFilter {
        let filter = if self.all_projects {
            ListFilter::default()
        } else {
            ListFilter::project(project)
        };
        if self.active {
            filter.only_active(true)
        } else {
            filter
        }
    }
}

/// One table line per entity.
pub trait TableRow: Serialize {
    const HEADER: &'static str;

    fn row(&self) -> String;
}

pub fn format_table_time(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn or_dash(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or("-")
}

impl TableRow for Run {
    const HEADER: &'static str = "ID\tNAME\tUSER\tSTATUS\tSUBMITTED";

    fn row(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}",
            self.id,
            self.run_name,
            or_dash(Some(self.user.as_str())),
            self.status.as_str(),
            format_table_time(&self.submitted_at)
        )
    }
}

impl TableRow for Instance {
    const HEADER: &'static str = "NAME\tPROJECT\tFLEET\tBACKEND\tSTATUS\tPRICE\tCREATED";

    fn row(&self) -> String {
        let price = self
            .price
            .map_or_else(|| "-".to_string(), |p| format!("${p:.4}"));
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.name,
            self.project_name,
            or_dash(self.fleet_name.as_deref()),
            or_dash(self.backend.as_deref()),
            self.status,
            price,
            format_table_time(&self.created)
        )
    }
}

impl TableRow for Event {
    const HEADER: &'static str = "RECORDED\tACTOR\tTARGETS\tMESSAGE";

    fn row(&self) -> String {
        let targets = self
            .targets
            .iter()
            .map(|t| format!("{}:{}", t.kind, t.name))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "{}\t{}\t{}\t{}",
            format_table_time(&self.recorded_at),
            or_dash(self.actor_user.as_deref()),
            or_dash(Some(targets.as_str())),
            self.message
        )
    }
}

impl TableRow for Volume {
    const HEADER: &'static str = "NAME\tPROJECT\tBACKEND\tSTATUS\tCREATED";

    fn row(&self) -> String {
        let status = if self.deleted { "deleted" } else { self.status.as_str() };
        format!(
            "{}\t{}\t{}\t{}\t{}",
            self.name,
            self.project_name,
            or_dash(self.backend.as_deref()),
            status,
            format_table_time(&self.created_at)
        )
    }
}

fn write_items<T: TableRow>(
    items: &[T],
    json: bool,
    stdout: &mut dyn Write,
) -> Result<(), String> {
    if json {
        serde_json::to_writer_pretty(&mut *stdout, items).map_err(|err| err.to_string())?;
        writeln!(stdout).map_err(|err| err.to_string())?;
        return Ok(());
    }
    if items.is_empty() {
        return Ok(());
    }
    let mut tw = TabWriter::new(&mut *stdout).padding(2);
    writeln!(tw, "{}", T::HEADER).map_err(|err| err.to_string())?;
    for item in items {
        writeln!(tw, "{}", item.row()).map_err(|err| err.to_string())?;
    }
    tw.flush().map_err(|err| err.to_string())
}

fn write_footer(
    kind: &str,
    shown: usize,
    more: bool,
    pages: usize,
    stdout: &mut dyn Write,
) -> Result<(), String> {
    if shown == 0 {
        writeln!(stdout, "No {kind} found.").map_err(|err| err.to_string())?;
    } else if more {
        writeln!(stdout).map_err(|err| err.to_string())?;
        writeln!(stdout, "More {kind} available: --pages {}", pages + 1)
            .map_err(|err| err.to_string())?;
    }
    Ok(())
}

/// Walk `args.pages` pages with a [`PagedList`] and print every item seen.
pub async fn run_paged<T>(
    ctx: &Context,
    project: &str,
    args: &ListArgs,
    json: bool,
    stdout: &mut dyn Write,
) -> Result<(), String>
where
    T: ListEntity + TableRow,
{
    let page_size = args.limit.unwrap_or(ctx.page_size).max(1);
    let list = PagedList::<T>::new(
        ctx.api.clone(),
        Arc::new(TracingNotifier),
        args.filter(project),
        page_size,
    );

    let pages = args.pages.max(1);
    let mut items: Vec<T> = Vec::new();
    let mut more = true;
    for page in 1..=pages {
        let outcome = if page == 1 {
            list.load().await
        } else {
            list.next_page().await
        };
        match outcome {
            PageOutcome::Replaced { count } => {
                items.extend(list.items());
                if count < page_size {
                    more = false;
                    break;
                }
            }
            PageOutcome::Failed(err) => return Err(err.to_string()),
            _ => {
                more = false;
                break;
            }
        }
    }

    write_items(&items, json, stdout)?;
    if !json {
        write_footer(T::KIND.as_str(), items.len(), more, pages, stdout)?;
    }
    Ok(())
}

/// Grow the event feed by `args.pages` pages and print it.
pub async fn run_events(
    ctx: &Context,
    project: &str,
    args: &ListArgs,
    json: bool,
    stdout: &mut dyn Write,
) -> Result<(), String> {
    let page_size = args.limit.unwrap_or(ctx.page_size).max(1);
    let feed = EntityFeed::<Event>::new(ctx.api.clone(), page_size)
        .into_list(args.filter(project), Arc::new(TracingNotifier));

    let pages = args.pages.max(1);
    let mut more = true;
    for _ in 0..pages {
        match feed.load_more().await {
            LoadOutcome::Appended { added, .. } if added >= page_size => {}
            LoadOutcome::Appended { .. } | LoadOutcome::Exhausted => {
                more = false;
                break;
            }
            LoadOutcome::Failed(err) => return Err(err.to_string()),
            LoadOutcome::InFlight | LoadOutcome::Stale => break,
        }
    }

    let events = feed.items();
    write_items(&events, json, stdout)?;
    if !json {
        write_footer("events", events.len(), more, pages, stdout)?;
    }
    Ok(())
}
