use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser as ClapParser;

use upkg_core::config::{LoaderConfig, LoaderConfigBuilder};
use upkg_core::object::ObjectKind;
use upkg_core::Environment;

mod listing;

#[derive(ClapParser, Debug)]
#[command(version, about = "Unreal package table dumper and script decompiler")]
struct Args {
    /// Package file to open.
    #[arg(short, long)]
    input: PathBuf,

    /// Directory for the decompiled `.uc` files; stdout when absent.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Loader configuration (TOML).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the summary and tables instead of decompiling.
    #[arg(short, long)]
    list: bool,

    /// Extra directory searched for imported packages. May be repeated.
    #[arg(short, long)]
    search: Vec<PathBuf>,

    /// Single-byte XOR key for obfuscated packages, decimal or `0x` hex.
    #[arg(long, value_parser = parse_key)]
    xor_key: Option<u8>,

    /// Only decompile the class with this name.
    #[arg(long)]
    class: Option<String>,
}

fn parse_key(text: &str) -> Result<u8, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid key {}: {}", text, e))
}

fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    let args = Args::parse();

    let mut builder = match &args.config {
        Some(path) => LoaderConfigBuilder::from_config(
            LoaderConfig::load(path).with_context(|| format!("read config {}", path.display()))?,
        ),
        None => LoaderConfigBuilder::new(),
    };
    for root in &args.search {
        builder = builder.with_search_root(root);
    }
    // Imports usually live next to the package that names them.
    if let Some(dir) = args.input.parent().filter(|d| !d.as_os_str().is_empty()) {
        builder = builder.with_search_root(dir);
    }
    if let Some(key) = args.xor_key {
        builder = builder.with_xor_key(key);
    }
    let config = builder.get();

    let mut env = Environment::from_config(&config).context("set up environment")?;
    let id = env
        .load_file(&args.input)
        .with_context(|| format!("open package {}", args.input.display()))?;
    let package = env
        .package(id)
        .cloned()
        .context("package missing after load")?;

    if args.list {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        listing::write_tables(&mut out, &package)?;
        return Ok(());
    }
    if package.is_compressed() {
        anyhow::bail!("{} is compressed and could not be expanded", package.name);
    }

    let root = env.package_root(id);
    let objects = env.link_all(id).context("link exports")?;
    let classes: Vec<_> = objects
        .into_iter()
        .filter(|&o| {
            env.object(o).map_or(false, |o| {
                matches!(o.kind, ObjectKind::Class(_))
                    && o.outer == root
                    && args.class.as_deref().map_or(true, |c| o.name.eq_str(c))
            })
        })
        .collect();
    if classes.is_empty() {
        log::warn!("{}: no classes to decompile", package.name);
    }

    if let Some(dir) = &args.output {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    for class in &classes {
        let name = env
            .object(*class)
            .map(|o| o.name.to_string())
            .unwrap_or_default();
        let text = env
            .write_class(*class)
            .with_context(|| format!("decompile class {}", name))?;
        match &args.output {
            Some(dir) => {
                let path = dir.join(format!("{}.uc", name));
                fs::write(&path, text).with_context(|| format!("write {}", path.display()))?;
            }
            None => {
                let stdout = std::io::stdout();
                let mut out = stdout.lock();
                writeln!(out, "// {}.{}", package.name, name)?;
                out.write_all(text.as_bytes())?;
            }
        }
    }
    log::info!("{}: decompiled {} classes", package.name, classes.len());
    Ok(())
}
