// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn product_arg() -> Arg {
    Arg::new("product")
        .required(true)
        .help("Product name or absolute path of its registry document")
}

fn component_arg() -> Arg {
    Arg::new("component")
        .short('c')
        .long("component")
        .value_name("NAME")
        .help("Component name (default component if omitted)")
}

fn kind_arg() -> Arg {
    Arg::new("kind")
        .short('k')
        .long("kind")
        .value_parser(["pre-uninstall", "post-uninstall"])
        .default_value("pre-uninstall")
        .help("Script phase")
}

fn build_cli() -> Command {
    Command::new("setupdb")
        .version(env!("CARGO_PKG_VERSION"))
        .author("SetupDB Contributors")
        .about("Registry of installed products")
        .arg(
            Arg::new("home")
                .long("home")
                .value_name("DIR")
                .global(true)
                .help("Home directory holding the per-user registry (default: $HOME)"),
        )
        .subcommand_required(true)
        .subcommand(Command::new("list").about("List registered products"))
        .subcommand(
            Command::new("info")
                .about("Show a product's components, options and files")
                .arg(product_arg())
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print as JSON"),
                ),
        )
        .subcommand(
            Command::new("create-product")
                .about("Register a new product")
                .arg(Arg::new("name").required(true))
                .arg(Arg::new("root").short('r').long("root").required(true).help("Installation root"))
                .arg(Arg::new("desc").short('d').long("desc").help("Human-readable description"))
                .arg(Arg::new("url").short('u').long("url").default_value("").help("Update URL")),
        )
        .subcommand(
            Command::new("add-component")
                .about("Add a component to a product")
                .arg(product_arg())
                .arg(Arg::new("name").required(true))
                .arg(Arg::new("version").short('v').long("version").required(true))
                .arg(Arg::new("url").short('u').long("url").help("Update URL override"))
                .arg(
                    Arg::new("default")
                        .long("default")
                        .action(ArgAction::SetTrue)
                        .help("Make this the default component"),
                ),
        )
        .subcommand(
            Command::new("add-option")
                .about("Add an option to a component")
                .arg(product_arg())
                .arg(Arg::new("name").required(true))
                .arg(component_arg()),
        )
        .subcommand(
            Command::new("add")
                .about("Register files under an option (re-registering refreshes digests)")
                .arg(product_arg())
                .arg(Arg::new("option").required(true))
                .arg(Arg::new("paths").required(true).num_args(1..))
                .arg(component_arg())
                .arg(Arg::new("md5").long("md5").help("Precomputed MD5 (only with a single path)")),
        )
        .subcommand(
            Command::new("update")
                .about("Re-check the digests of registered files")
                .arg(product_arg())
                .arg(Arg::new("paths").required(true).num_args(1..)),
        )
        .subcommand(
            Command::new("remove-file")
                .about("Unregister a file")
                .arg(product_arg())
                .arg(Arg::new("option").required(true))
                .arg(Arg::new("path").required(true))
                .arg(component_arg()),
        )
        .subcommand(
            Command::new("add-rpm")
                .about("Record a bundled RPM package, reading its header")
                .arg(product_arg())
                .arg(Arg::new("option").required(true))
                .arg(Arg::new("rpm").required(true))
                .arg(component_arg())
                .arg(
                    Arg::new("autoremove")
                        .long("autoremove")
                        .action(ArgAction::SetTrue)
                        .help("Remove the package together with the product"),
                ),
        )
        .subcommand(
            Command::new("script")
                .about("Register a lifecycle script from a file")
                .arg(product_arg())
                .arg(Arg::new("name").required(true).help("Script name"))
                .arg(Arg::new("source").required(true).help("File holding the script body"))
                .arg(kind_arg())
                .arg(component_arg())
                .arg(
                    Arg::new("option")
                        .short('o')
                        .long("option")
                        .help("Attach to this option instead of the component"),
                ),
        )
        .subcommand(
            Command::new("run-scripts")
                .about("Run a component's scripts of one phase")
                .arg(product_arg())
                .arg(kind_arg())
                .arg(component_arg()),
        )
        .subcommand(
            Command::new("upgrade-uninstaller")
                .about("Offer an uninstaller binary and regenerate the product launcher")
                .arg(product_arg())
                .arg(Arg::new("binary").required(true).help("Candidate uninstaller binary")),
        )
        .subcommand(
            Command::new("convert")
                .about("Convert an old-style uninstall script into a registry")
                .arg(Arg::new("script").required(true))
                .arg(Arg::new("product").short('p').long("product").required(true))
                .arg(Arg::new("version").short('v').long("version").required(true))
                .arg(
                    Arg::new("uninstaller")
                        .short('u')
                        .long("uninstaller")
                        .required(true)
                        .help("Uninstaller binary to install"),
                )
                .arg(Arg::new("url").long("url")),
        )
        .subcommand(
            Command::new("remove")
                .about("Delete a product's registry, scripts and launcher link")
                .arg(product_arg()),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completions")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell", "elvish"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("setupdb.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
