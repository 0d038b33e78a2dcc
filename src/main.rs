mod cli;

use metascope::{config, render};
use metascope_codec::Codec;
use metascope_container::{detect_file, parse_file, ContainerKind, ParseOptions};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "metascope=debug,metascope_container=trace,metascope_codec=trace".to_string()
        } else {
            "metascope=info,metascope_container=warn,metascope_codec=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Probe { file, kind, json } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            probe_file(&file, kind, json, &config)
        }
        Commands::Detect { file } => detect(&file),
        Commands::Codec { file, codec, hex } => decode_codec(&file, codec, hex),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("metascope {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn probe_file(
    file: &Path,
    kind: Option<ContainerKind>,
    json: bool,
    config: &config::Config,
) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    tracing::info!("Probing {:?}", file);
    let report = parse_file(file, kind, &config.parser)
        .with_context(|| format!("Failed to parse {:?}", file))?;
    tracing::debug!(
        "{} fields extracted from {} container",
        report.fields_extracted,
        report.kind
    );

    if json || config.output.json {
        let json_str = if config.output.pretty {
            serde_json::to_string_pretty(&report)?
        } else {
            serde_json::to_string(&report)?
        };
        println!("{}", json_str);
    } else {
        print!("{}", render::render_report(&report, &config.output));
    }

    Ok(())
}

fn detect(file: &Path) -> Result<()> {
    let kind = detect_file(file).with_context(|| format!("Failed to detect {:?}", file))?;
    println!("{}", kind.as_str());
    Ok(())
}

fn decode_codec(file: &Path, codec: Codec, hex: bool) -> Result<()> {
    let raw = std::fs::read(file).with_context(|| format!("Failed to read {:?}", file))?;
    let data = if hex {
        let text: String = String::from_utf8_lossy(&raw)
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        hex::decode(text.trim_start_matches("0x")).context("Invalid hex input")?
    } else {
        raw
    };

    let params = metascope_container::decode_codec(codec, &data)
        .with_context(|| format!("Failed to decode {} parameters", codec))?;
    println!("{}", serde_json::to_string_pretty(&params)?);
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            print_parser(&config.parser);
            println!("  JSON output: {}", config.output.json);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            print_parser(&config.parser);
        }
    }

    Ok(())
}

fn print_parser(parser: &ParseOptions) {
    println!("  Max box depth: {}", parser.max_box_depth);
    println!("  Max element depth: {}", parser.max_element_depth);
    println!("  Max file size: {} bytes", parser.max_file_size);
    println!(
        "  Capabilities: codec_parameters={}, inflate_text={}, content_hashes={}",
        parser.capabilities.codec_parameters,
        parser.capabilities.inflate_text,
        parser.capabilities.content_hashes
    );
}
