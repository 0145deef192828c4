use anyhow::Result;
use pkgkit::Tool;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::Context;
use crate::cli::ConfigCommand;
use crate::config::Config;
use crate::output;
use crate::paths;
use crate::ui;

pub fn run(ctx: &Context, cmd: ConfigCommand, explicit: Option<&Path>) -> Result<bool> {
    match cmd {
        ConfigCommand::Show => show(ctx, explicit),
    }
}

#[derive(Debug, Serialize)]
struct ConfigReport<'a> {
    path: PathBuf,
    exists: bool,
    tool: Tool,
    jobs: usize,
    search_path: Vec<PathBuf>,
    config: &'a Config,
}

fn show(ctx: &Context, explicit: Option<&Path>) -> Result<bool> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => paths::config_file()?,
    };
    let options = ctx.config.tool_options(ctx.tool, ctx.path.as_deref());
    let report = ConfigReport {
        exists: path.exists(),
        path,
        tool: ctx.tool,
        jobs: ctx.jobs(None),
        search_path: options.search_path,
        config: &ctx.config,
    };

    output::emit(ctx, &report, |r| {
        ui::header("Configuration");
        let location = paths::display_path(&r.path);
        if r.exists {
            ui::kv("Config file", &location);
        } else {
            ui::kv("Config file", &format!("{location} (not found, using defaults)"));
        }
        ui::kv("Package manager", &r.tool.to_string());
        ui::kv("Jobs", &r.jobs.to_string());
        let dirs: Vec<String> = r
            .search_path
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        ui::kv("Search path", &ui::list_or_none(&dirs));

        if let Ok(content) = r.config.to_toml()
            && !content.trim().is_empty()
        {
            ui::section("Effective settings");
            for line in content.lines() {
                ui::dim(line);
            }
        }
    })?;
    Ok(true)
}
