//! protomorph - Convert protobuf messages to and from JSON
//!
//! This tool decodes binary messages into deep JSON documents, with optional
//! custom encodings for chosen fields, and encodes such documents back into
//! repeatable binary form.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use prost_reflect::{DescriptorPool, DynamicMessage, MessageDescriptor};
use protomorph_core::{
    mostly_deterministic_marshal, Converter, ConverterConfig, FieldNaming, HexBytesFieldFactory,
    OpaqueFieldFactory,
};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

/// Convert protobuf messages to and from JSON
#[derive(Parser, Debug)]
#[command(name = "protomorph")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a binary message into a JSON document
    Decode(ConvertArgs),
    /// Encode a JSON document into a binary message with sorted map entries
    Encode(ConvertArgs),
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Serialized FileDescriptorSet (protoc --descriptor_set_out)
    #[arg(short, long, value_name = "FILE")]
    descriptor_set: PathBuf,

    /// Fully-qualified message type, e.g. pkg.Envelope
    #[arg(short = 't', long = "type", value_name = "FULL_NAME")]
    message_type: String,

    /// Input file (default: stdin)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Render bytes fields with this name as hex (repeatable)
    #[arg(long = "hex-bytes", value_name = "FIELD")]
    hex_bytes: Vec<String>,

    /// Render a bytes field as the JSON of the message it encodes (repeatable)
    #[arg(long, value_name = "MESSAGE.FIELD=TYPE", value_parser = parse_opaque_spec)]
    opaque: Vec<OpaqueSpec>,

    /// Emit fields that hold their default value
    #[arg(long)]
    emit_defaults: bool,

    /// Use lowerCamelCase JSON names instead of declared field names
    #[arg(long)]
    json_names: bool,

    /// Write JSON on a single line
    #[arg(long)]
    compact: bool,
}

/// A bytes field that carries an encoded message
#[derive(Debug, Clone, PartialEq, Eq)]
struct OpaqueSpec {
    /// Fully-qualified name of the message holding the field
    message: String,
    /// Declared field name
    field: String,
    /// Fully-qualified name of the encoded message type
    payload: String,
}

/// Parse `pkg.Message.field=pkg.Payload`
fn parse_opaque_spec(spec: &str) -> std::result::Result<OpaqueSpec, String> {
    let (target, payload) = spec
        .split_once('=')
        .ok_or_else(|| format!("expected MESSAGE.FIELD=TYPE, got '{}'", spec))?;
    let (message, field) = target
        .rsplit_once('.')
        .ok_or_else(|| format!("expected MESSAGE.FIELD before '=', got '{}'", target))?;

    if message.is_empty() || field.is_empty() || payload.is_empty() {
        return Err(format!("expected MESSAGE.FIELD=TYPE, got '{}'", spec));
    }

    Ok(OpaqueSpec {
        message: message.to_string(),
        field: field.to_string(),
        payload: payload.to_string(),
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    run(&cli)
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Decode(args) => decode(args),
        Command::Encode(args) => encode(args),
    }
}

/// Binary message to JSON document
fn decode(args: &ConvertArgs) -> Result<()> {
    let pool = load_pool(&args.descriptor_set)?;
    let descriptor = message_descriptor(&pool, &args.message_type)?;
    let converter = build_converter(args, &pool)?;

    let data = read_input(args.input.as_deref())?;
    let message = DynamicMessage::decode(descriptor, data.as_slice())
        .with_context(|| format!("Failed to decode {} from input", args.message_type))?;
    debug!("Decoded {} bytes as {}", data.len(), args.message_type);

    let mut document = Vec::new();
    converter
        .deep_marshal_json(&mut document, &message)
        .context("Failed to convert message to JSON")?;

    write_output(args.output.as_deref(), &document)?;
    info!("Wrote {} bytes of JSON", document.len());
    Ok(())
}

/// JSON document to binary message
fn encode(args: &ConvertArgs) -> Result<()> {
    let pool = load_pool(&args.descriptor_set)?;
    let descriptor = message_descriptor(&pool, &args.message_type)?;
    let converter = build_converter(args, &pool)?;

    let data = read_input(args.input.as_deref())?;
    let mut message = DynamicMessage::new(descriptor);
    converter
        .deep_unmarshal_json(data.as_slice(), &mut message)
        .context("Failed to convert JSON to message")?;

    let encoded = mostly_deterministic_marshal(&message)
        .with_context(|| format!("Failed to encode {}", args.message_type))?;

    write_output(args.output.as_deref(), &encoded)?;
    info!("Wrote {} bytes of {}", encoded.len(), args.message_type);
    Ok(())
}

fn load_pool(path: &Path) -> Result<DescriptorPool> {
    let data = fs::read(path)
        .with_context(|| format!("Failed to read descriptor set: {}", path.display()))?;
    let pool = DescriptorPool::decode(data.as_slice())
        .with_context(|| format!("Failed to parse descriptor set: {}", path.display()))?;
    debug!(
        "Loaded {} file(s) from {}",
        pool.files().count(),
        path.display()
    );
    Ok(pool)
}

fn message_descriptor(pool: &DescriptorPool, name: &str) -> Result<MessageDescriptor> {
    pool.get_message_by_name(name)
        .with_context(|| format!("Message type not found in descriptor set: {}", name))
}

fn build_converter(args: &ConvertArgs, pool: &DescriptorPool) -> Result<Converter> {
    let naming = if args.json_names {
        FieldNaming::Json
    } else {
        FieldNaming::Proto
    };
    let config = ConverterConfig::new()
        .pretty(!args.compact)
        .emit_defaults(args.emit_defaults)
        .field_naming(naming);
    let mut converter = Converter::new().with_config(config);

    if !args.opaque.is_empty() {
        let mut factory = OpaqueFieldFactory::new();
        for spec in &args.opaque {
            if pool.get_message_by_name(&spec.message).is_none() {
                bail!("Message type not found in descriptor set: {}", spec.message);
            }
            let payload = message_descriptor(pool, &spec.payload)?;
            debug!("Opaque field {}.{} holds {}", spec.message, spec.field, spec.payload);
            factory = factory.with_field(&spec.message, &spec.field, payload);
        }
        converter = converter.with_factory(factory);
    }

    if !args.hex_bytes.is_empty() {
        let factory = args
            .hex_bytes
            .iter()
            .fold(HexBytesFieldFactory::new(), |f, name| f.with_field(name));
        converter = converter.with_factory(factory);
    }

    Ok(converter)
}

fn read_input(path: Option<&Path>) -> Result<Vec<u8>> {
    match path {
        Some(path) => {
            fs::read(path).with_context(|| format!("Failed to read input file: {}", path.display()))
        }
        None => {
            let mut data = Vec::new();
            std::io::stdin()
                .read_to_end(&mut data)
                .context("Failed to read stdin")?;
            Ok(data)
        }
    }
}

fn write_output(path: Option<&Path>, data: &[u8]) -> Result<()> {
    match path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
            fs::write(path, data)
                .with_context(|| format!("Failed to write output file: {}", path.display()))
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(data).context("Failed to write stdout")?;
            stdout.flush().context("Failed to write stdout")
        }
    }
}
