//! LogoBatch CLI
//!
//! Commands: run, catalog, clients
//! Outputs JSON to stdout, logs to stderr
//! Returns non-zero on a fatal error

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use logobatch_core::{
    load_clients, AssetCatalog, AssetLayout, BatchDriver, BatchError,
    CompositionPipeline, HttpLogoFetcher, MessageTemplate, Notifier, OpenAiCompositor,
    QualityTier, Settings, SmtpMailer,
};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "logobatch-cli")]
#[command(about = "LogoBatch CLI - composite client logos onto product images and mail them")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    layout: LayoutArgs,
}

#[derive(Args)]
struct LayoutArgs {
    /// Working directory holding the conventional layout
    #[arg(short, long, global = true, default_value = ".")]
    root: PathBuf,

    /// Client CSV file
    #[arg(long, global = true)]
    clients: Option<PathBuf>,

    /// Base product images
    #[arg(long, global = true)]
    products: Option<PathBuf>,

    /// Per-product masks
    #[arg(long, global = true)]
    masks: Option<PathBuf>,

    /// Images attached to every email unmodified
    #[arg(long, global = true)]
    passthrough: Option<PathBuf>,

    /// Staging directory for downloaded logos
    #[arg(long, global = true)]
    staging: Option<PathBuf>,

    /// Output directory for generated images
    #[arg(long, global = true)]
    output: Option<PathBuf>,
}

impl LayoutArgs {
    fn resolve(self) -> AssetLayout {
        let defaults = AssetLayout::rooted_at(&self.root);
        AssetLayout {
            clients_csv: self.clients.unwrap_or(defaults.clients_csv),
            products_dir: self.products.unwrap_or(defaults.products_dir),
            masks_dir: self.masks.unwrap_or(defaults.masks_dir),
            passthrough_dir: self.passthrough.unwrap_or(defaults.passthrough_dir),
            staging_dir: self.staging.unwrap_or(defaults.staging_dir),
            output_dir: self.output.unwrap_or(defaults.output_dir),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Process every client and print the batch report
    Run {
        /// Override COMPOSITOR_QUALITY
        #[arg(short, long, value_enum)]
        quality: Option<QualityTier>,

        /// Generate images without sending email
        #[arg(long)]
        no_email: bool,

        /// Email body template file ({{client_name}}, {{client_company_name}})
        #[arg(long)]
        body_template: Option<PathBuf>,

        /// Exit with status 2 when any client failed
        #[arg(long)]
        strict: bool,
    },

    /// Show products with their resolved masks, and pass-through images
    Catalog,

    /// Show the parsed client records
    Clients,
}

struct RunOptions {
    quality: Option<QualityTier>,
    no_email: bool,
    body_template: Option<PathBuf>,
    strict: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logobatch_core=info,logobatch_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let layout = cli.layout.resolve();

    let result = match cli.command {
        Commands::Run {
            quality,
            no_email,
            body_template,
            strict,
        } => {
            let options = RunOptions {
                quality,
                no_email,
                body_template,
                strict,
            };
            run(&layout, options).await
        }
        Commands::Catalog => show_catalog(&layout),
        Commands::Clients => show_clients(&layout),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Fatal");
            let output = serde_json::json!({
                "success": false,
                "error": e.to_string(),
            });
            println!("{}", output);
            ExitCode::FAILURE
        }
    }
}

async fn run(layout: &AssetLayout, options: RunOptions) -> Result<ExitCode, BatchError> {
    let settings = Settings::from_env(!options.no_email)?;
    let catalog = AssetCatalog::load(layout)?;
    let clients = load_clients(&layout.clients_csv)?;

    let fetcher = HttpLogoFetcher::new(settings.download_timeout)?;
    let compositor = OpenAiCompositor::new(&settings.compositor)?;

    let pipeline = CompositionPipeline::new(
        Arc::new(fetcher),
        Arc::new(compositor),
        &layout.staging_dir,
        &layout.output_dir,
    )
    .with_quality(options.quality.unwrap_or(settings.compositor.quality));

    let notifier = match &settings.mail {
        Some(mail) => {
            let mailer = SmtpMailer::new(mail)?;
            let template = match &options.body_template {
                Some(path) => {
                    let body = std::fs::read_to_string(path).map_err(|source| {
                        BatchError::Template {
                            path: path.clone(),
                            source,
                        }
                    })?;
                    MessageTemplate::new(mail.subject.clone(), body)
                }
                None => MessageTemplate::standard(mail.subject.clone(), &mail.from_name),
            };
            Some(Notifier::new(
                Box::new(mailer),
                mail.from_name.clone(),
                mail.user.clone(),
                template,
            ))
        }
        None => None,
    };

    let driver = BatchDriver::new(pipeline, notifier);
    let report = driver.run(&clients, &catalog).await?;

    println!("{}", to_json(&report));

    if options.strict && report.failed() > 0 {
        Ok(ExitCode::from(2))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn show_catalog(layout: &AssetLayout) -> Result<ExitCode, BatchError> {
    let catalog = AssetCatalog::load(layout)?;
    let products: Vec<_> = catalog
        .products()
        .iter()
        .map(|p| {
            serde_json::json!({
                "product": p,
                "mask": catalog.mask_for(p),
            })
        })
        .collect();

    let output = serde_json::json!({
        "products": products,
        "passthrough": catalog.passthrough(),
    });
    println!("{}", to_json(&output));
    Ok(ExitCode::SUCCESS)
}

fn show_clients(layout: &AssetLayout) -> Result<ExitCode, BatchError> {
    let clients = load_clients(&layout.clients_csv)?;
    println!("{}", to_json(&clients));
    Ok(ExitCode::SUCCESS)
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        serde_json::json!({ "success": false, "error": e.to_string() }).to_string()
    })
}
