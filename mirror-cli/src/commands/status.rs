//! `mirror status`: freshness of every profile.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use mirror_core::config;
use mirror_sync::{
    staleness::{check, format_datetime_age},
    state, Freshness,
};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, home: &Path) -> Result<()> {
        let rows = build_rows(home)?;
        if self.json {
            print_json(rows)
        } else {
            print_table(rows);
            Ok(())
        }
    }
}

#[derive(Debug, Clone)]
struct ProfileStatus {
    profile: String,
    freshness: Freshness,
    last_sync_at: Option<String>,
    last_sync_age: String,
    last_outcome: Option<String>,
    commit: Option<String>,
    next_run: String,
}

#[derive(Serialize)]
struct StatusReportJson {
    summary: StatusSummaryJson,
    profiles: Vec<ProfileStatusJson>,
}

#[derive(Serialize)]
struct StatusSummaryJson {
    profiles: usize,
    current: usize,
    needs_attention: usize,
}

#[derive(Serialize)]
struct ProfileStatusJson {
    profile: String,
    status: String,
    detail: String,
    last_sync_at: Option<String>,
    last_sync_age: String,
    last_outcome: Option<String>,
    commit: Option<String>,
    next_run: String,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "profile")]
    profile: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "detail")]
    detail: String,
    #[tabled(rename = "last sync")]
    last_sync: String,
    #[tabled(rename = "next run")]
    next_run: String,
}

fn build_rows(home: &Path) -> Result<Vec<ProfileStatus>> {
    let profiles = config::list_profiles_at(home).context("failed to load config")?;
    let now = Utc::now();

    let mut rows = Vec::new();
    for profile in profiles {
        let name = profile.name.0.clone();
        let record = state::load_at(home, &name)
            .with_context(|| format!("failed to load sync record for '{name}'"))?;
        let freshness = check(record.as_ref(), &profile.schedule, now);
        rows.push(ProfileStatus {
            profile: name,
            freshness,
            last_sync_at: record.as_ref().map(|r| r.synced_at.to_rfc3339()),
            last_sync_age: record
                .as_ref()
                .map(|r| format!("{} ago", format_datetime_age(r.synced_at)))
                .unwrap_or_else(|| "never".to_string()),
            last_outcome: record.as_ref().map(|r| r.outcome.as_str().to_string()),
            commit: record.as_ref().and_then(|r| r.commit.clone()),
            next_run: profile.schedule.next_after(now).format("%Y-%m-%d %H:%M UTC").to_string(),
        });
    }
    Ok(rows)
}

fn print_json(rows: Vec<ProfileStatus>) -> Result<()> {
    let current = rows
        .iter()
        .filter(|r| matches!(r.freshness, Freshness::Current))
        .count();
    let payload = StatusReportJson {
        summary: StatusSummaryJson {
            profiles: rows.len(),
            current,
            needs_attention: rows.len() - current,
        },
        profiles: rows
            .into_iter()
            .map(|row| ProfileStatusJson {
                status: freshness_key(&row.freshness).to_string(),
                detail: freshness_detail(&row.freshness),
                profile: row.profile,
                last_sync_at: row.last_sync_at,
                last_sync_age: row.last_sync_age,
                last_outcome: row.last_outcome,
                commit: row.commit,
                next_run: row.next_run,
            })
            .collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
    );
    Ok(())
}

fn print_table(rows: Vec<ProfileStatus>) {
    if rows.is_empty() {
        println!("No profiles configured.");
        println!("Run: mirror profile add <name> --source <url> --repo <path> --target <dir>");
        return;
    }

    let needs_attention = rows
        .iter()
        .any(|r| !matches!(r.freshness, Freshness::Current));
    let table_rows: Vec<StatusTableRow> = rows
        .into_iter()
        .map(|row| StatusTableRow {
            profile: row.profile,
            status: format!(
                "{} {}",
                freshness_indicator(&row.freshness),
                freshness_label(&row.freshness)
            ),
            detail: freshness_detail(&row.freshness),
            last_sync: row.last_sync_age,
            next_run: row.next_run,
        })
        .collect();
    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");

    if needs_attention {
        println!("Run 'mirror inspect <profile>' to investigate, or 'mirror sync --all' to retry.");
    }
}

fn freshness_key(freshness: &Freshness) -> &'static str {
    match freshness {
        Freshness::NeverSynced => "never_synced",
        Freshness::Current => "current",
        Freshness::Overdue { .. } => "overdue",
        Freshness::Failing { .. } => "failing",
    }
}

fn freshness_label(freshness: &Freshness) -> &'static str {
    match freshness {
        Freshness::NeverSynced => "NEVER SYNCED",
        Freshness::Current => "CURRENT",
        Freshness::Overdue { .. } => "OVERDUE",
        Freshness::Failing { .. } => "FAILING",
    }
}

fn freshness_indicator(freshness: &Freshness) -> String {
    match freshness {
        Freshness::NeverSynced => "■".bright_black().bold().to_string(),
        Freshness::Current => "■".green().bold().to_string(),
        Freshness::Overdue { .. } => "■".yellow().bold().to_string(),
        Freshness::Failing { .. } => "■".red().bold().to_string(),
    }
}

fn freshness_detail(freshness: &Freshness) -> String {
    match freshness {
        Freshness::NeverSynced => "no sync recorded".to_string(),
        Freshness::Current => "up to date".to_string(),
        Freshness::Overdue { last_success } => {
            format!("last success {} ago", format_datetime_age(*last_success))
        }
        Freshness::Failing { reason } => first_line(reason),
    }
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().to_string()
}
