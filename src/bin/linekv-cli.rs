//! Interactive client for linekv.
//!
//! With arguments, sends them as one command and prints the reply. Without,
//! reads commands from stdin until EOF or QUIT.

use anyhow::Context;
use clap::Parser;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;

#[derive(Parser, Debug)]
#[command(name = "linekv-cli", version, about = "Command-line client for linekv")]
struct Args {
    /// Server host
    #[arg(long, env = "LINEKV_HOST", default_value = linekv::DEFAULT_HOST)]
    host: String,

    /// Server port
    #[arg(short, long, env = "LINEKV_PORT", default_value_t = linekv::DEFAULT_PORT)]
    port: u16,

    /// Command to send, e.g. `SET name Ariz`
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);

    let stream = TcpStream::connect(&address)
        .await
        .with_context(|| format!("could not connect to {}", address))?;
    let (reader, writer) = stream.into_split();
    let mut replies = BufReader::new(reader).lines();
    let mut writer = BufWriter::new(writer);

    if !args.command.is_empty() {
        let request = args.command.join(" ");
        writer.write_all(format!("{}\n", request).as_bytes()).await?;
        writer.flush().await?;

        let reply = replies
            .next_line()
            .await?
            .context("server closed the connection")?;
        println!("{}", reply);
        return Ok(());
    }

    let mut stdout = io::stdout();
    let mut input = BufReader::new(io::stdin()).lines();

    loop {
        stdout.write_all(format!("{}> ", address).as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = input.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        writer.write_all(format!("{}\n", line.trim()).as_bytes()).await?;
        writer.flush().await?;

        match replies.next_line().await? {
            Some(reply) => {
                println!("{}", reply);
                if reply == "BYE" {
                    break;
                }
            }
            None => {
                println!("(connection closed)");
                break;
            }
        }
    }

    Ok(())
}
