use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use imageops_web::cli::{ApplyArgs, Args, BatchArgs, Command, ServeArgs};
use imageops_web::config::Config;
use imageops_web::image_processing::batch::{discover_images, process_batch, BatchSummary};
use imageops_web::image_processing::{apply, list_operations, parse_key_values};
use imageops_web::report::{failures_table, operations_table};
use imageops_web::utils::{create_progress_bar, error_println, format_duration, info_println, warn_println};
use imageops_web::web;

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    match args.command() {
        Command::Serve(serve) => run_server(serve),
        Command::List => {
            init_tracing("imageops_web=warn");
            println!("{}", style("Supported operations").bold().blue());
            operations_table(&list_operations()).printstd();
            Ok(())
        }
        Command::Apply(apply_args) => {
            init_tracing("imageops_web=warn");
            run_apply(apply_args)
        }
        Command::Batch(batch_args) => {
            init_tracing("imageops_web=warn");
            run_batch(batch_args)
        }
    }
}

/// `RUST_LOG` wins over the built-in default filter
fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run_server(serve: ServeArgs) -> Result<()> {
    let mut config = Config::new().context("Failed to load configuration")?;
    if let Some(base_dir) = serve.base_dir {
        config.rebase(base_dir);
    }
    if let Some(host) = serve.host {
        config.host = host;
    }
    if let Some(port) = serve.port {
        config.port = port;
    }
    config.validate().context("Invalid configuration")?;

    let level = config.log_level().to_string().to_lowercase();
    init_tracing(&format!("imageops_web={},tower_http={}", level, level));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    runtime.block_on(web::serve(config))
}

fn run_apply(args: ApplyArgs) -> Result<()> {
    let start_time = Instant::now();
    let params = parse_key_values(&args.params);

    info_println(&format!(
        "Applying {} to {}",
        style(&args.operation).bold(),
        args.input.display()
    ));
    let output = apply(&args.input, &args.output, &args.operation, &params, &args.base_dir)
        .with_context(|| format!("Failed to process {}", args.input.display()))?;

    println!(
        "{} {} ({})",
        style("✓ Wrote").green().bold(),
        output.display(),
        format_duration(start_time.elapsed())
    );
    Ok(())
}

fn run_batch(args: BatchArgs) -> Result<()> {
    let start_time = Instant::now();

    if !args.input_dir.is_dir() {
        return Err(anyhow::anyhow!(
            "Input path is not a directory: {}",
            args.input_dir.display()
        ));
    }
    if args.jobs > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.jobs)
            .build_global()
            .context("Failed to initialize thread pool")?;
    }
    std::fs::create_dir_all(&args.output_dir).context("Failed to create output directory")?;

    let files = discover_images(&args.input_dir);
    if files.is_empty() {
        warn_println("No images found with supported extensions");
        return Ok(());
    }
    info_println(&format!(
        "Found {} images, applying {}",
        files.len(),
        style(&args.operation).bold()
    ));

    let params = parse_key_values(&args.params);
    let progress = create_progress_bar(files.len() as u64);
    progress.set_message("Processing images");

    let items = process_batch(
        &files,
        &args.input_dir,
        &args.output_dir,
        &args.operation,
        &params,
        &args.base_dir,
        |completed, eta| {
            progress.set_position(completed as u64);
            if let Some(eta) = eta {
                progress.set_message(format!("Processing images, about {} left", format_duration(eta)));
            }
        },
    )?;
    progress.finish_with_message("✓ Processing complete!");
    println!();

    let summary = BatchSummary::from_items(&items);
    println!("{}", style("Summary").bold());
    println!("  Total:      {}", summary.total);
    println!("  Successful: {}", style(summary.successful).green());
    println!("  Failed:     {}", style(summary.failed).red());
    println!("  Success:    {:.1}%", summary.success_rate());
    println!("  Time:       {}", format_duration(start_time.elapsed()));

    if summary.failed > 0 {
        println!();
        failures_table(&items).printstd();
        error_println(&format!("{} of {} images failed", summary.failed, summary.total));
    }
    Ok(())
}
