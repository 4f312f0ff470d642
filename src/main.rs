use clap::{Parser, Subcommand};
use stacks::auth::{AuthContext, HostedLogin};
use stacks::generate::SiteAssets;
use stacks::process::{ProcessEvent, ProcessedManifest};
use stacks::serve::{Gate, SiteApp};
use stacks::{config, generate, output, process, scan, serve};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::thread::JoinHandle;

/// Shared flags for commands that render markdown.
#[derive(clap::Args, Clone)]
struct CacheArgs {
    /// Disable the render cache and render every note again
    #[arg(long)]
    no_cache: bool,
}

fn version_string() -> &'static str {
    let release = env!("STACKS_RELEASE_BUILD");
    if release == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("STACKS_GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "stacks")]
#[command(about = "Notebook site generator for markdown learning notes")]
#[command(long_about = "\
Notebook site generator for markdown learning notes

Your filesystem is the data source. Top-level folders become books on the
shelf, their subfolders become the side menu, and every markdown file becomes
a page.

Content structure:

  content/
  ├── config.toml                  # Site config (optional)
  ├── assets/                      # icon.png, icon_brand.png → copied to output root
  ├── rust/
  │   ├── index.md                 # The \"Rust\" book (draft: false puts it on the shelf)
  │   ├── ownership.svg            # Attachment, copied next to the page
  │   ├── 0_basics/
  │   │   └── index.md             # Menu entry \"Basics\"
  │   └── 1_ownership/
  │       └── index.md             # Menu entry \"Ownership\"
  └── go/
      └── index.md

Front matter (all optional):
  slug:   URL path under /books/ (default: folder path)
  stack:  subject shown on the cover (default: top-level folder name)
  title:  page title (default: first # heading, then folder name)
  date:   shown as \"Published on\" (first 10 characters)
  draft:  only `draft: false` is listed on the shelf

Set AUTH0_DOMAIN and AUTH0_CLIENTID (or an [auth] section) to put note pages
behind a login; gated notes are then served only by 'stacks serve'.

Run 'stacks gen-config' to generate a documented config.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Content directory
    #[arg(long, default_value = "content", global = true)]
    source: PathBuf,

    /// Output directory
    #[arg(long, default_value = "dist", global = true)]
    output: PathBuf,

    /// Directory for intermediate files (manifests, render cache)
    #[arg(long, default_value = ".stacks-temp", global = true)]
    temp_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan content directory into a manifest
    Scan,
    /// Render every note body to HTML
    Process(CacheArgs),
    /// Produce the final HTML site from the processed manifest
    Generate,
    /// Run the full pipeline: scan → process → generate
    Build(CacheArgs),
    /// Validate content directory without building
    Check,
    /// Scan, render and serve the site locally, with the login gate
    Serve(CacheArgs),
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Scan => {
            let manifest = scan::scan(&cli.source)?;
            std::fs::create_dir_all(&cli.temp_dir)?;
            let manifest_path = cli.temp_dir.join("manifest.json");
            let json = serde_json::to_string_pretty(&manifest)?;
            std::fs::write(&manifest_path, json)?;
            output::print_scan_output(&manifest, &cli.source);
        }
        Command::Process(cache_args) => {
            let scan_manifest_path = cli.temp_dir.join("manifest.json");
            let manifest_content = std::fs::read_to_string(&scan_manifest_path)?;
            let input_manifest: scan::Manifest = serde_json::from_str(&manifest_content)?;
            init_thread_pool(&input_manifest.config.processing);
            let processed_dir = cli.temp_dir.join("processed");
            let (tx, printer) = spawn_progress_printer();
            let result = process::process(
                &scan_manifest_path,
                &processed_dir,
                !cache_args.no_cache,
                Some(tx),
            )?;
            join_printer(printer)?;
            write_processed_manifest(&processed_dir, &result.manifest)?;
            println!("Cache: {}", result.cache_stats);
        }
        Command::Generate => {
            let processed_manifest_path = cli.temp_dir.join("processed").join("manifest.json");
            let report = generate::generate(&processed_manifest_path, &cli.output, &cli.source)?;
            output::print_generate_output(&report);
        }
        Command::Build(cache_args) => {
            std::fs::create_dir_all(&cli.temp_dir)?;

            println!("==> Stage 1: Scanning {}", cli.source.display());
            let manifest = scan::scan(&cli.source)?;
            let scan_manifest_path = cli.temp_dir.join("manifest.json");
            let json = serde_json::to_string_pretty(&manifest)?;
            std::fs::write(&scan_manifest_path, json)?;
            output::print_scan_output(&manifest, &cli.source);

            println!("==> Stage 2: Rendering notes");
            init_thread_pool(&manifest.config.processing);
            let processed_dir = cli.temp_dir.join("processed");
            let (tx, printer) = spawn_progress_printer();
            let result = process::process(
                &scan_manifest_path,
                &processed_dir,
                !cache_args.no_cache,
                Some(tx),
            )?;
            join_printer(printer)?;
            let processed_manifest_path = write_processed_manifest(&processed_dir, &result.manifest)?;
            println!("Cache: {}", result.cache_stats);

            println!("==> Stage 3: Generating HTML → {}", cli.output.display());
            let report = generate::generate(&processed_manifest_path, &cli.output, &cli.source)?;
            output::print_generate_output(&report);

            println!("==> Build complete: {}", cli.output.display());
        }
        Command::Check => {
            println!("==> Checking {}", cli.source.display());
            let manifest = scan::scan(&cli.source)?;
            output::print_scan_output(&manifest, &cli.source);
            println!("==> Content is valid");
        }
        Command::Serve(cache_args) => {
            println!("==> Scanning {}", cli.source.display());
            let manifest = scan::scan(&cli.source)?;
            init_thread_pool(&manifest.config.processing);

            println!("==> Rendering notes");
            let processed_dir = cli.temp_dir.join("processed");
            let (tx, printer) = spawn_progress_printer();
            let result =
                process::process_manifest(manifest, &processed_dir, !cache_args.no_cache, Some(tx))?;
            join_printer(printer)?;
            println!("Cache: {}", result.cache_stats);

            let processed = result.manifest;
            let site_config = &processed.config;
            let gate = site_config.auth.as_ref().map(|auth| {
                let context = AuthContext::new(auth, &site_config.origin());
                Gate {
                    context: context.clone(),
                    provider: Box::new(HostedLogin::new(context)),
                }
            });
            let app = SiteApp::new(
                &processed,
                &cli.source,
                SiteAssets::detect(&cli.source),
                gate,
            );
            serve::serve_site(
                app,
                &site_config.serve.interface,
                site_config.serve.port,
                |event| output::print_serve_event(&event),
            )?;
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Print process events as they arrive, from a separate thread.
fn spawn_progress_printer() -> (Sender<ProcessEvent>, JoinHandle<()>) {
    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_process_event(&event) {
                println!("{}", line);
            }
        }
    });
    (tx, printer)
}

fn join_printer(printer: JoinHandle<()>) -> Result<(), Box<dyn std::error::Error>> {
    printer
        .join()
        .map_err(|_| "progress printer thread panicked".into())
}

fn write_processed_manifest(
    processed_dir: &Path,
    manifest: &ProcessedManifest,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let path = processed_dir.join("manifest.json");
    let json = serde_json::to_string_pretty(manifest)?;
    std::fs::write(&path, &json)?;
    Ok(path)
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
