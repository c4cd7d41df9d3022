use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use connector_builder_rs::config::Settings;
use connector_builder_rs::contracts::{
    register_builder_contracts, FORMAT_YAML_CONTRACT, LOCKED_INPUTS_CONTRACT, RESOLVE_CONTRACT,
    TO_BUILDER_CONTRACT, TO_MANIFEST_CONTRACT, VALIDATE_CONTRACT,
};
use connector_builder_rs::registry::{Context as CallContext, Registry};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "connector-builder")]
#[command(about = "Convert and validate connector manifests and builder form values")]
struct CliOptions {
    /// Settings file (TOML); defaults to ./connector-builder.toml when present
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    /// Output encoding
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Json, global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Inline every $ref of a manifest
    Resolve { input: String },
    /// Convert a manifest into builder form values
    ToBuilder { input: String },
    /// Generate a manifest from builder form values
    ToManifest {
        input: String,
        /// Overrides the configured manifest version
        #[arg(long = "manifest-version")]
        version: Option<String>,
    },
    /// Reconcile the locked spec inputs of builder form values
    LockedInputs { input: String },
    /// Validate builder form values
    Validate { input: String },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Json,
    Yaml,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let opts = CliOptions::parse();
    let settings = Settings::load(opts.config.as_deref())?;
    init_tracing(&settings.log_filter);

    let registry = Registry::new();
    register_builder_contracts(&registry);
    let mut ctx = registry.context();

    let (output, valid) = match &opts.command {
        Command::Resolve { input } => {
            let manifest = load_document(input)?;
            let out = ctx.call(RESOLVE_CONTRACT, json!({ "manifest": manifest }), None)?;
            (field(out, "manifest")?, true)
        }
        Command::ToBuilder { input } => {
            let manifest = load_document(input)?;
            let out = ctx.call(TO_BUILDER_CONTRACT, json!({ "manifest": manifest }), None)?;
            (field(out, "formValues")?, true)
        }
        Command::ToManifest { input, version } => {
            let values = load_document(input)?;
            let version = version.clone().unwrap_or_else(|| settings.manifest_version.clone());
            let out = ctx.call(
                TO_MANIFEST_CONTRACT,
                json!({ "formValues": values, "version": version }),
                None,
            )?;
            (field(out, "manifest")?, true)
        }
        Command::LockedInputs { input } => {
            let values = load_document(input)?;
            let out = ctx.call(LOCKED_INPUTS_CONTRACT, json!({ "formValues": values }), None)?;
            (out, true)
        }
        Command::Validate { input } => {
            let values = load_document(input)?;
            let out = ctx.call(VALIDATE_CONTRACT, json!({ "formValues": values }), None)?;
            let valid = out.get("valid").and_then(Value::as_bool).unwrap_or(false);
            (out, valid)
        }
    };

    print_output(&mut ctx, &output, opts.format, &settings)?;
    if !valid {
        return Err(anyhow!("form values are invalid"));
    }
    Ok(())
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::from_str(filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Reads a YAML or JSON document from a path, or stdin for `-`.
fn load_document(source: &str) -> Result<Value> {
    let raw = if source == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("unable to read stdin")?;
        buffer
    } else {
        fs::read_to_string(source).with_context(|| format!("unable to read {source}"))?
    };
    serde_yaml::from_str(&raw).with_context(|| format!("unable to parse {source} as YAML or JSON"))
}

fn field(mut output: Value, key: &str) -> Result<Value> {
    output
        .get_mut(key)
        .map(Value::take)
        .ok_or_else(|| anyhow!("contract output is missing {key}"))
}

fn print_output(
    ctx: &mut CallContext,
    output: &Value,
    format: OutputFormat,
    settings: &Settings,
) -> Result<()> {
    let text = match format {
        OutputFormat::Json => serde_json::to_string_pretty(output)?,
        OutputFormat::Yaml => {
            let out = ctx.call(
                FORMAT_YAML_CONTRACT,
                json!({
                    "manifest": output,
                    "blankLines": settings.yaml.blank_line_between_sections,
                }),
                None,
            )?;
            field(out, "text")?
                .as_str()
                .map(str::to_string)
                .unwrap_or_default()
        }
    };
    println!("{}", text.trim_end());
    Ok(())
}
