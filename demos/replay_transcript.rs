use std::env;
use std::fs;
use std::process;

use anyhow::Context;
use rnotch::channel::{Pattern, ReplayChannel};
use rnotch::config::Timeouts;
use rnotch::engine::{CommandOptions, Prompt, Transport};

fn print_usage() {
    eprintln!(
        "Usage: cargo run --example replay_transcript -- <transcript.jsonl> <prompt> <command> [--pager <text>] [--strip-ansi]"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        print_usage();
        process::exit(2);
    }
    let (path, prompt, command) = (&args[1], &args[2], &args[3]);

    let mut opts = CommandOptions::default();
    let mut strip = false;
    let mut flags = args.iter().skip(4);
    while let Some(flag) = flags.next() {
        match flag.as_str() {
            "--pager" => {
                let text = flags.next().context("--pager needs a value")?;
                opts = opts.with_pager(Pattern::literal(text)?);
            }
            "--strip-ansi" => strip = true,
            _ => {
                eprintln!("Unknown flag: {flag}");
                print_usage();
                process::exit(2);
            }
        }
    }

    let jsonl = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let channel = ReplayChannel::from_jsonl(&jsonl).with_context(|| format!("parsing {path}"))?;
    let mut transport = Transport::new(channel, Timeouts::default()).with_strip_ansi(strip);

    match transport
        .command(command, &Prompt::literal(prompt.as_str()), &opts)
        .await
    {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!(
                "{} (retryable={}, code={:?})",
                e,
                e.is_retryable(),
                e.code()
            );
            process::exit(1);
        }
    }
    Ok(())
}
