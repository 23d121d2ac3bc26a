//! Mudlark Stream Decoder Runner
//!
//! A headless decoder for testing and automation. Reads a captured server
//! byte stream from stdin or a file and prints either the rendered text
//! (through the consumer state machine) or the raw fragment stream as
//! JSON lines.

use std::io::{self, Read, Write};
use std::process::ExitCode;

use mudlark::consumer::{OutputConsumer, TextBuffer};
use mudlark::decoder::Decoder;
use mudlark::world::{UseMxp, World};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

enum OutputFormat {
    Text,
    Json,
}

fn print_help() {
    eprintln!(
        r#"mudlark-decode - Headless MUD stream decoder

USAGE:
    mudlark-decode [OPTIONS]

OPTIONS:
    -h, --help           Show this help message
    -i, --input <FILE>   Input file (stdin if not specified)
    -j, --json           Output fragments as JSON lines instead of text
    -m, --mxp            Treat MXP markup as active from the first byte
    -l, --latin1         Decode high bytes as Latin-1 instead of UTF-8

EXAMPLES:
    # Render a captured session transcript
    mudlark-decode -i session.bin

    # Inspect the fragment stream of an ANSI-colored line
    printf 'Hello \x1b[31mRed\x1b[0m' | mudlark-decode --json
"#
    );
}

fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut input_file: Option<String> = None;
    let mut output_format = OutputFormat::Text;
    let mut world = World::default();
    let mut show_help = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => show_help = true,
            "-i" | "--input" => {
                i += 1;
                if i < args.len() {
                    input_file = Some(args[i].clone());
                }
            }
            "-j" | "--json" => output_format = OutputFormat::Json,
            "-m" | "--mxp" => world.use_mxp = UseMxp::Always,
            "-l" | "--latin1" => world.utf_8 = false,
            other => {
                eprintln!("unknown option: {other}");
                show_help = true;
            }
        }
        i += 1;
    }

    if show_help {
        print_help();
        return ExitCode::SUCCESS;
    }

    let data = match &input_file {
        Some(path) => match std::fs::read(path) {
            Ok(data) => data,
            Err(err) => {
                eprintln!("failed to read {path}: {err}");
                return ExitCode::FAILURE;
            }
        },
        None => {
            let mut data = Vec::new();
            if let Err(err) = io::stdin().read_to_end(&mut data) {
                eprintln!("failed to read stdin: {err}");
                return ExitCode::FAILURE;
            }
            data
        }
    };

    let mut decoder = Decoder::new(&world);
    let mut fragments = Vec::new();
    decoder.receive(&data, &mut fragments);
    decoder.flush(&mut fragments);

    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    let result = match output_format {
        OutputFormat::Json => fragments.iter().try_for_each(|fragment| {
            let line = serde_json::to_string(fragment)
                .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
            writeln!(stdout, "{line}")
        }),
        OutputFormat::Text => {
            let mut consumer = OutputConsumer::new(TextBuffer::new(), &world);
            consumer.consume(&fragments);
            writeln!(stdout, "{}", consumer.surface().content())
        }
    };
    if let Err(err) = result {
        eprintln!("failed to write output: {err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
