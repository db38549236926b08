mod commands;
mod logging;
mod progress;

use std::io::{self, Write};
use std::process;

use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands, RunArgs};
use media_organizer_core::storage::Database;
use media_organizer_core::{
    AppConfig, ErrorPolicy, LivePhotoPolicy, NewRunSpec, OverwritePolicy, Phase, Pipeline,
    RunOptions, RunOutcome, ThumbsPolicy,
};
use progress::CliReporter;
use tracing::error;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _guard = logging::init_logger();

    let config = match media_organizer_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    let result = match args.command {
        Some(Commands::Run(run_args)) => cmd_run(&args.db_path, &config, run_args),
        Some(Commands::Resume { run_id }) => cmd_resume(&args.db_path, &config, run_id),
        Some(Commands::Rollback { run_id, yes }) => {
            cmd_rollback(&args.db_path, &config, run_id, yes)
        }
        Some(Commands::Status { run_id }) => cmd_status(&args.db_path, &config, run_id),
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:?}", config);
            Ok(())
        }
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("Error: {}", err);
        process::exit(1);
    }
    Ok(())
}

fn open_pipeline(db_path: &str, config: &AppConfig) -> Result<Pipeline, media_organizer_core::Error> {
    let db = Database::open(db_path)?;
    Ok(Pipeline::new(db, config.clone()))
}

fn parse_options(args: &RunArgs, config: &AppConfig) -> Result<RunOptions, String> {
    Ok(RunOptions {
        min_file_size: args.min_size.unwrap_or(config.min_file_size),
        overwrite_policy: OverwritePolicy::parse(&args.overwrite)
            .ok_or_else(|| format!("invalid overwrite policy '{}'", args.overwrite))?,
        error_policy: ErrorPolicy::parse(&args.on_error)
            .ok_or_else(|| format!("invalid error policy '{}'", args.on_error))?,
        link_duplicates: args.link_duplicates,
        live_photo_policy: LivePhotoPolicy::parse(&args.live_photos)
            .ok_or_else(|| format!("invalid live-photo policy '{}'", args.live_photos))?,
        thumbs_policy: ThumbsPolicy::parse(&args.thumbs)
            .ok_or_else(|| format!("invalid thumbnail policy '{}'", args.thumbs))?,
        cpu_limit_pct: args.cpu_limit,
        io_limit_mbps: args.io_limit,
    })
}

fn cmd_run(
    db_path: &str,
    config: &AppConfig,
    args: RunArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let options = parse_options(&args, config)?;
    let scan_config = AppConfig {
        min_file_size: config.min_file_size,
        include_photos: args.include_photos.unwrap_or(config.include_photos),
        include_videos: args.include_videos.unwrap_or(config.include_videos),
        include_raw: args.include_raw.unwrap_or(config.include_raw),
        include_other: args.include_other.unwrap_or(config.include_other),
    };
    let pipeline = open_pipeline(db_path, &scan_config)?;

    let name = args
        .name
        .clone()
        .unwrap_or_else(|| chrono::Local::now().format("Run_%Y%m%d_%H%M%S").to_string());
    let run_id = pipeline.create_run(&NewRunSpec {
        name,
        source_root: args.source.clone(),
        dest_root: args.dest.clone(),
        artifacts_root: None,
        options,
    })?;
    println!("Created run {}", run_id.to_string().cyan());

    let reporter = CliReporter::new();
    let outcome = if args.dry_run {
        pipeline.run_until(run_id, Phase::Plan, &reporter)?
    } else {
        pipeline.run(run_id, &reporter)?
    };
    print_outcome(&pipeline, run_id, outcome)
}

fn cmd_resume(
    db_path: &str,
    config: &AppConfig,
    run_id: Option<i64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = open_pipeline(db_path, config)?;
    let run_id = match run_id {
        Some(id) => id,
        None => match pipeline.latest_resumable()? {
            Some(run) => run.run_id,
            None => {
                println!("No resumable run found.");
                return Ok(());
            }
        },
    };
    println!("Resuming run {}", run_id.to_string().cyan());
    let reporter = CliReporter::new();
    let outcome = pipeline.run(run_id, &reporter)?;
    print_outcome(&pipeline, run_id, outcome)
}

fn cmd_rollback(
    db_path: &str,
    config: &AppConfig,
    run_id: i64,
    yes: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !yes
        && !prompt_confirm(
            &format!("Delete every file created by run {}?", run_id),
            Some(false),
        )?
    {
        return Ok(());
    }
    let pipeline = open_pipeline(db_path, config)?;
    let reporter = CliReporter::new();
    let outcome = pipeline.rollback(run_id, &reporter)?;
    println!(
        "Rollback: {} reverted, {} failed",
        outcome.items_reverted.to_string().green(),
        outcome.items_failed.to_string().red(),
    );
    Ok(())
}

fn cmd_status(
    db_path: &str,
    config: &AppConfig,
    run_id: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = open_pipeline(db_path, config)?;
    let run = pipeline.get_run(run_id)?;
    let counts = pipeline.counts(run_id)?;

    println!("Run {}: {}", run.run_id.to_string().cyan(), run.run_name);
    println!("  status:     {}", run.status.as_str().yellow());
    println!(
        "  checkpoint: {}",
        run.last_checkpoint.map(|p| p.as_str()).unwrap_or("-")
    );
    println!("  source:     {}", run.source_root);
    println!("  dest:       {}", run.dest_root);
    println!(
        "  files:      {} total ({} photos, {} videos, {} raw), {} bytes",
        counts.files_total, counts.photos, counts.videos, counts.raws, counts.bytes_total
    );
    println!(
        "  items:      {} done, {} pending, {} skipped, {} error",
        counts.items_done.to_string().green(),
        counts.items_pending,
        counts.items_skipped,
        counts.items_error.to_string().red(),
    );
    println!("  duplicates: {}", counts.duplicate_files);

    let errors = pipeline.recent_errors(run_id, 10)?;
    if !errors.is_empty() {
        println!("  recent errors:");
        for e in errors {
            println!(
                "    [{}] {} {}",
                e.phase,
                e.code.as_deref().unwrap_or("-").red(),
                e.message
            );
        }
    }
    Ok(())
}

fn print_outcome(
    pipeline: &Pipeline,
    run_id: i64,
    outcome: RunOutcome,
) -> Result<(), Box<dyn std::error::Error>> {
    let counts = pipeline.counts(run_id)?;
    match outcome {
        RunOutcome::Completed => println!("{}", "Run completed.".green()),
        RunOutcome::Stopped(phase) => {
            println!("Stopped after {} (dry run).", phase.as_str().yellow())
        }
        RunOutcome::Paused => println!("{}", "Run paused; resume to continue.".yellow()),
        RunOutcome::Failed => println!("{}", "Run failed; see errors below.".red()),
    }
    println!(
        "{} files, {} items done, {} skipped, {} errors",
        counts.files_total,
        counts.items_done.to_string().green(),
        counts.items_skipped,
        counts.items_error.to_string().red(),
    );
    Ok(())
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
