use clap::Parser;
use eoka_capture::{Config, RunDir, Session, WorkflowRunner};
use std::path::PathBuf;
use tracing::{warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "eoka-capture")]
#[command(about = "Walk a disclosures wizard, print the document and screenshot every step")]
#[command(version)]
struct Cli {
    /// Workflow config file
    config: PathBuf,

    /// Run in headless mode (overrides config)
    #[arg(long)]
    headless: bool,

    /// Start URL (overrides config)
    #[arg(long)]
    url: Option<String>,

    /// Output root directory (overrides config)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Validate config without running
    #[arg(long)]
    check: bool,

    /// Quiet mode (only errors)
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> eoka_capture::Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };

    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string())),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let mut config = Config::load(&cli.config)?;
    if cli.headless {
        config.browser.headless = true;
    }
    if let Some(url) = cli.url {
        config.target.url = url;
    }
    if let Some(output) = cli.output {
        config.output.root = output;
    }
    config.validate()?;

    if cli.check {
        let targets = &config.steps;
        println!("Config valid: {}", config.name);
        println!("  Target: {}", config.target.url);
        println!("  Output: {}", config.output.root.display());
        for (key, target) in [
            ("consent", &targets.consent),
            ("confirm_customer", &targets.confirm_customer),
            ("continue_without_sign_on", &targets.continue_without_sign_on),
            ("disclosures", &targets.disclosures),
            ("print", &targets.print),
        ] {
            println!("  {}: {} candidate(s)", key, target.candidates.len());
        }
        return Ok(());
    }

    println!("Running: {}", config.name);

    let dir = RunDir::create(&config.output.root)?;
    let dir_path = dir.path().to_path_buf();
    let session = Session::launch(&config.browser).await?;
    let runner = WorkflowRunner::from_config(&config);

    let finished = tokio::select! {
        report = runner.execute(session.page(), dir) => Some(report),
        _ = tokio::signal::ctrl_c() => None,
    };

    let Some(report) = finished else {
        eprintln!("Interrupted; partial artifacts in {}", dir_path.display());
        if let Err(e) = session.close().await {
            warn!("Failed to close browser: {}", e);
        }
        std::process::exit(130);
    };

    println!();
    for step in &report.steps {
        let mark = if step.outcome.is_failure() { "✗" } else { "✓" };
        println!("  {} {}: {}", mark, step.name, step.outcome);
    }
    println!();
    println!("Artifacts saved to: {}", report.output_dir.display());
    match report.document {
        Some(ref path) => println!("Saved PDF: {}", path.display()),
        None => println!("No PDF file captured via print; see screenshots for details."),
    }

    session.close().await?;
    Ok(())
}
