// src/main.rs

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde_json::json;
use setupdb::legacy::{self, ConvertOptions};
use setupdb::{ComponentId, Environment, FileOwner, Product, Registry, ScriptKind};
use std::io;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "setupdb")]
#[command(author, version, about = "Registry of installed products", long_about = None)]
struct Cli {
    /// Home directory holding the per-user registry (default: $HOME)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered products
    List,
    /// Show a product's components, options and files
    Info {
        /// Product name or absolute path of its registry document
        product: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Register a new product
    CreateProduct {
        name: String,
        /// Installation root
        #[arg(short, long)]
        root: PathBuf,
        /// Human-readable description
        #[arg(short, long)]
        desc: Option<String>,
        /// Update URL
        #[arg(short, long, default_value = "")]
        url: String,
    },
    /// Add a component to a product
    AddComponent {
        product: String,
        name: String,
        #[arg(short, long)]
        version: String,
        /// Update URL override
        #[arg(short, long)]
        url: Option<String>,
        /// Make this the default component
        #[arg(long)]
        default: bool,
    },
    /// Add an option to a component
    AddOption {
        product: String,
        name: String,
        /// Component name (default component if omitted)
        #[arg(short, long)]
        component: Option<String>,
    },
    /// Register files under an option (re-registering refreshes digests)
    Add {
        product: String,
        option: String,
        /// Paths relative to the install root, or absolute
        #[arg(required = true)]
        paths: Vec<String>,
        #[arg(short, long)]
        component: Option<String>,
        /// Precomputed MD5 (only with a single path)
        #[arg(long)]
        md5: Option<String>,
    },
    /// Re-check the digests of registered files
    Update {
        product: String,
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Unregister a file
    RemoveFile {
        product: String,
        option: String,
        path: String,
        #[arg(short, long)]
        component: Option<String>,
    },
    /// Record a bundled RPM package, reading its header
    AddRpm {
        product: String,
        option: String,
        rpm: PathBuf,
        #[arg(short, long)]
        component: Option<String>,
        /// Remove the package together with the product
        #[arg(long)]
        autoremove: bool,
    },
    /// Register a lifecycle script from a file
    Script {
        product: String,
        /// Script name
        name: String,
        /// File holding the script body
        source: PathBuf,
        /// pre-uninstall or post-uninstall
        #[arg(short, long, default_value = "pre-uninstall")]
        kind: ScriptKind,
        #[arg(short, long)]
        component: Option<String>,
        /// Attach to this option instead of the component
        #[arg(short, long)]
        option: Option<String>,
    },
    /// Run a component's scripts of one phase
    RunScripts {
        product: String,
        #[arg(short, long, default_value = "pre-uninstall")]
        kind: ScriptKind,
        #[arg(short, long)]
        component: Option<String>,
    },
    /// Offer an uninstaller binary and regenerate the product launcher
    UpgradeUninstaller {
        product: String,
        /// Candidate uninstaller binary
        binary: PathBuf,
    },
    /// Convert an old-style uninstall script into a registry
    Convert {
        /// The legacy script (its directory is the install root)
        script: PathBuf,
        #[arg(short, long)]
        product: String,
        #[arg(short, long)]
        version: String,
        /// Uninstaller binary to install
        #[arg(short, long)]
        uninstaller: PathBuf,
        #[arg(long)]
        url: Option<String>,
    },
    /// Delete a product's registry, scripts and launcher link
    Remove { product: String },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "setupdb", &mut io::stdout());
        return Ok(());
    }

    let env = match cli.home {
        Some(home) => Environment::with_home(home),
        None => Environment::detect()?,
    };
    let registry = Registry::new(env);

    match cli.command {
        Commands::List => {
            for name in registry.product_names()? {
                println!("{}", name);
            }
            Ok(())
        }
        Commands::Info { product, json } => {
            let product = registry.open(&product)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary(&product))?);
            } else {
                print_info(&product);
            }
            Ok(())
        }
        Commands::CreateProduct { name, root, desc, url } => {
            let product = registry.create(&name, &root, desc.as_deref(), &url)?;
            let path = product.registry_path().to_path_buf();
            product.close()?;
            println!("Created {} ({})", name, path.display());
            Ok(())
        }
        Commands::AddComponent {
            product,
            name,
            version,
            url,
            default,
        } => {
            let mut product = registry.open(&product)?;
            let id = match product.find_component(&name) {
                Some(id) => {
                    product.set_component_version(id, &version)?;
                    id
                }
                None => product.create_component(&name, &version),
            };
            if url.is_some() {
                product.set_component_url(id, url.as_deref())?;
            }
            if default {
                product.set_default_component(id)?;
            }
            product.close()?;
            Ok(())
        }
        Commands::AddOption {
            product,
            name,
            component,
        } => {
            let mut product = registry.open(&product)?;
            let comp = resolve_component(&product, component.as_deref())?;
            product.create_option(comp, &name)?;
            product.close()?;
            Ok(())
        }
        Commands::Add {
            product,
            option,
            paths,
            component,
            md5,
        } => {
            if md5.is_some() && paths.len() != 1 {
                return Err(anyhow!("--md5 requires exactly one path"));
            }
            let mut product = registry.open(&product)?;
            let comp = resolve_component(&product, component.as_deref())?;
            let opt = product.create_option(comp, &option)?;
            for path in &paths {
                product
                    .register_file(opt, path, md5.as_deref())
                    .with_context(|| format!("Failed to register {}", path))?;
            }
            info!("Registered {} paths in {}", paths.len(), option);
            product.close()?;
            Ok(())
        }
        Commands::Update { product, paths } => {
            let mut product = registry.open(&product)?;
            for path in &paths {
                let id = product.update_digest(path)?;
                if product.file(id).is_some_and(|f| f.patched) {
                    println!("{}: patched", path);
                }
            }
            product.close()?;
            Ok(())
        }
        Commands::RemoveFile {
            product,
            option,
            path,
            component,
        } => {
            let mut product = registry.open(&product)?;
            let comp = resolve_component(&product, component.as_deref())?;
            let opt = product
                .find_option(comp, &option)
                .ok_or_else(|| anyhow!("No option named {}", option))?;
            product.unregister_path(opt, &path)?;
            product.close()?;
            Ok(())
        }
        Commands::AddRpm {
            product,
            option,
            rpm,
            component,
            autoremove,
        } => {
            let mut product = registry.open(&product)?;
            let comp = resolve_component(&product, component.as_deref())?;
            let opt = product.create_option(comp, &option)?;
            product.register_rpm_file(opt, &rpm, autoremove)?;
            product.close()?;
            Ok(())
        }
        Commands::Script {
            product,
            name,
            source,
            kind,
            component,
            option,
        } => {
            let mut product = registry.open(&product)?;
            let comp = resolve_component(&product, component.as_deref())?;
            let owner = match option {
                Some(option) => FileOwner::Option(
                    product
                        .find_option(comp, &option)
                        .ok_or_else(|| anyhow!("No option named {}", option))?,
                ),
                None => FileOwner::Component(comp),
            };
            product.register_script_from_file(owner, kind, &name, &source)?;
            product.close()?;
            Ok(())
        }
        Commands::RunScripts {
            product,
            kind,
            component,
        } => {
            let product = registry.open(&product)?;
            let comp = resolve_component(&product, component.as_deref())?;
            let count = product.run_scripts(comp, kind)?;
            println!("{} {} scripts succeeded", count, kind);
            Ok(())
        }
        Commands::UpgradeUninstaller { product, binary } => {
            let product = registry.open(&product)?;
            let report = registry.upgrade_uninstaller(&product, &binary)?;
            if report.upgraded {
                println!("Installed {}", report.binary.display());
            } else {
                println!("Kept {}", report.binary.display());
            }
            println!("Launcher written to {}", report.launcher.display());
            Ok(())
        }
        Commands::Convert {
            script,
            product,
            version,
            uninstaller,
            url,
        } => {
            if !legacy::is_legacy_script(&script)? {
                println!("{} is already a registry launcher", script.display());
                return Ok(());
            }
            let report = legacy::convert_legacy_script(
                &registry,
                &script,
                &ConvertOptions {
                    product: &product,
                    version: &version,
                    uninstaller: &uninstaller,
                    update_url: url.as_deref(),
                },
            )?;
            println!(
                "Converted {}: {} entries registered, {} missing",
                product,
                report.registered,
                report.skipped.len()
            );
            Ok(())
        }
        Commands::Remove { product } => {
            let product = registry.open(&product)?;
            let report = product.remove();
            if !report.is_clean() {
                for failure in &report.failures {
                    eprintln!("Could not remove {}: {}", failure.path.display(), failure.error);
                }
                return Err(anyhow!("Product only partially removed"));
            }
            Ok(())
        }
        Commands::Completions { .. } => Ok(()),
    }
}

/// Named component, or the product's default
fn resolve_component(product: &Product, name: Option<&str>) -> Result<ComponentId> {
    match name {
        Some(name) => product
            .find_component(name)
            .ok_or_else(|| anyhow!("No component named {} in {}", name, product.name())),
        None => product
            .default_component()
            .ok_or_else(|| anyhow!("{} has no default component", product.name())),
    }
}

fn print_info(product: &Product) {
    let info = product.info();
    println!("{} ({})", info.name, info.description);
    println!("  root: {}", info.root.display());
    println!("  update url: {}", info.update_url);

    for comp_id in product.components() {
        let Some(comp) = product.component(*comp_id) else {
            continue;
        };
        let marker = if comp.is_default { " [default]" } else { "" };
        println!("  component {} {}{}", comp.name, comp.version, marker);
        for script in comp.scripts().iter().filter_map(|id| product.file(*id)) {
            println!("    script {} ({})", script.path, script.script_kind().map(|k| k.as_str()).unwrap_or("?"));
        }
        for opt_id in product.options(*comp_id) {
            let Some(opt) = product.option(*opt_id) else {
                continue;
            };
            println!("    option {}", opt.name);
            product.enumerate_files(*opt_id, |visit| {
                let patched = if visit.entry.patched { " (patched)" } else { "" };
                println!("      {:<9} {}{}", visit.file_type.as_str(), visit.path.display(), patched);
            });
        }
    }
}

fn summary(product: &Product) -> serde_json::Value {
    let components: Vec<serde_json::Value> = product
        .components()
        .iter()
        .filter_map(|id| product.component(*id).map(|c| (*id, c)))
        .map(|(id, comp)| {
            let scripts: Vec<serde_json::Value> = comp
                .scripts()
                .iter()
                .filter_map(|f| product.file(*f))
                .map(|f| json!({ "name": f.path, "type": f.script_kind() }))
                .collect();
            let options: Vec<serde_json::Value> = product
                .options(id)
                .iter()
                .filter_map(|o| product.option(*o).map(|opt| (*o, opt)))
                .map(|(opt_id, opt)| {
                    let mut files = Vec::new();
                    product.enumerate_files(opt_id, |visit| {
                        files.push(json!({
                            "path": visit.path,
                            "type": visit.file_type,
                            "mode": format!("{:04o}", visit.entry.mode),
                            "md5": visit.entry.md5().map(|d| d.to_hex()),
                            "patched": visit.entry.patched,
                        }));
                    });
                    json!({ "name": opt.name, "files": files })
                })
                .collect();
            json!({
                "name": comp.name,
                "version": comp.version,
                "default": comp.is_default,
                "update_url": product.component_url(id),
                "scripts": scripts,
                "options": options,
            })
        })
        .collect();

    json!({
        "product": product.info(),
        "components": components,
    })
}
