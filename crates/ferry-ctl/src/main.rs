//! ferry-ctl: command-line interface for the Ferry daemon's admin API.

use anyhow::{Context, Result};

mod cmd;

const DEFAULT_PORT: u16 = 5001;

fn print_usage() {
    println!("Usage: ferry-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  status                Show daemon status and active shares");
    println!("  shares                List active shares");
    println!("  shares inspect <id>   Show one share in detail");
    println!("  shares end <id>       End a share and notify its receivers");
    println!("  shutdown              Stop the daemon");
    println!();
    println!("Options:");
    println!("  --port <port>   Admin API port (default: {})", DEFAULT_PORT);
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --port option
    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | [] => cmd::status::cmd_status(port).await,
        ["shares"] => cmd::shares::cmd_shares(port).await,
        ["shares", "inspect", id] => cmd::shares::cmd_share_inspect(port, id).await,
        ["shares", "end", id] => cmd::shares::cmd_share_end(port, id).await,
        ["shutdown"] => cmd::status::cmd_shutdown(port).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
