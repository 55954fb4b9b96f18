use clap::Parser;
use ewiki_context::text::{Chunk, DEFAULT_MAX_LINES, LineChunker, decode_dropping_invalid};
use serde::Serialize;
use std::io::{self, Read};

/// A CLI tool to show how ewiki-context splits a file into chunks, as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input file. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Path to attribute the chunks to when reading from stdin.
    #[arg(short, long, default_value = "<stdin>")]
    path: String,

    /// Maximum number of lines in each chunk.
    #[arg(short, long, default_value_t = DEFAULT_MAX_LINES)]
    max_lines: usize,
}

fn main() -> io::Result<()> {
    let args = Args::parse();
    let chunker = LineChunker::new(args.max_lines)?;

    let chunks: Vec<Chunk> = if let Some(input_path) = &args.input {
        chunker.read_file_chunks(input_path.as_ref())?
    } else {
        let mut buffer = Vec::new();
        io::stdin().read_to_end(&mut buffer)?;
        let content = decode_dropping_invalid(&buffer);
        chunker.chunks(&args.path, &content).collect()
    };

    #[derive(Serialize)]
    struct SerializableChunk<'a> {
        path: &'a str,
        start_line: usize,
        end_line: usize,
        text: &'a str,
    }

    let serializable_chunks: Vec<SerializableChunk> = chunks
        .iter()
        .map(|c| SerializableChunk {
            path: &c.source_path,
            start_line: c.start_line,
            end_line: c.end_line(),
            text: &c.text,
        })
        .collect();

    let json_output = serde_json::to_string_pretty(&serializable_chunks)?;
    println!("{}", json_output);

    Ok(())
}
