//! Hibari CLI - コマンドラインインターフェース
//!
//! GDB/MI セッションを対話的に操作するREPL

mod command;

use anyhow::Result;
use clap::Parser;
use command::ReplCommand;
use hibari_core::{
    Args, CorrelationOrder, EventBus, LaunchConfig, Reply, Session, SessionConfig, StreamKind,
    StreamSelection,
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

/// `--debug` の行エコーを表示するためのフィルタ指定
const WIRE_ECHO_DIRECTIVE: &str = "hibari::wire=info";

/// Hibari - GDB/MI session driver
#[derive(Parser)]
#[command(name = "hibari")]
#[command(version = "0.1.0")]
#[command(about = "Interactive driver for the GDB machine interface", long_about = None)]
struct Cli {
    /// Debugger executable
    #[arg(long, default_value = "gdb")]
    gdb: PathBuf,

    /// Echo every line received from the debugger
    #[arg(long)]
    debug: bool,

    /// Match replies to commands in submission order
    #[arg(long)]
    fifo: bool,

    /// Also collect target output in `collect`
    #[arg(long)]
    collect_target: bool,

    /// Also collect debugger log output in `collect`
    #[arg(long)]
    collect_internal: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to the program to debug
    target: PathBuf,

    /// Extra arguments passed to the debugger
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.debug)?;

    println!("Hibari - GDB/MI session driver");
    println!("Version 0.1.0");
    println!();

    let runtime = Runtime::new()?;
    let collecting = Arc::new(AtomicBool::new(false));
    let session = runtime.block_on(start_session(&cli, Arc::clone(&collecting)))?;

    runtime.block_on(async {
        tokio::select! {
            ready = session.wait_ready() => ready.map_err(anyhow::Error::from),
            status = session.wait_exit() => Err(anyhow::anyhow!(
                "Debugger exited before it became ready ({:?})",
                status
            )),
        }
    })?;
    println!("Debugger is ready");

    run_repl(&runtime, &session, &collecting)?;

    runtime.block_on(session.terminate())?;
    Ok(())
}

/// ログ出力を初期化する
fn init_tracing(verbose: bool, debug: bool) -> Result<()> {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(with_wire_echo(filter, debug)?)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// `--debug` が指定されていれば行エコーを有効にする
fn with_wire_echo(filter: EnvFilter, debug: bool) -> Result<EnvFilter> {
    if !debug {
        return Ok(filter);
    }
    Ok(filter.add_directive(WIRE_ECHO_DIRECTIVE.parse()?))
}

/// デバッガを起動してセッションを作成する
async fn start_session(cli: &Cli, collecting: Arc<AtomicBool>) -> Result<Session> {
    let launch = LaunchConfig::new(&cli.target)
        .debugger(&cli.gdb)
        .args(Args::List(cli.args.clone()));

    let mut streams = StreamSelection::console();
    if cli.collect_target {
        streams = streams.with(StreamKind::Target);
    }
    if cli.collect_internal {
        streams = streams.with(StreamKind::Internal);
    }

    let printer = async_printer(collecting, streams, |text: &str| {
        print!("{}", text);
        let _ = std::io::stdout().flush();
    });

    let config = SessionConfig::default()
        .events(printer)
        .debug(cli.debug)
        .collect_streams(streams)
        .correlation(if cli.fifo {
            CorrelationOrder::Fifo
        } else {
            CorrelationOrder::Lifo
        });

    println!("Starting {} for {}", cli.gdb.display(), cli.target.display());
    Ok(Session::spawn(&launch, config)?)
}

/// REPLループを実行する
fn run_repl(runtime: &Runtime, session: &Session, collecting: &AtomicBool) -> Result<()> {
    println!("Type 'help' for available commands, 'quit' to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;

    loop {
        let readline = rl.readline("(hibari) ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                match ReplCommand::parse(line) {
                    Some(ReplCommand::Quit) => {
                        println!("Goodbye!");
                        break;
                    }
                    Some(command) => {
                        let result = runtime.block_on(handle_command(session, command, collecting));
                        if let Err(e) = result {
                            eprintln!("Error: {}", e);
                        }
                    }
                    None => {
                        println!("Unknown command: {}", line);
                        println!("Type 'help' for available commands.");
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}

async fn handle_command(
    session: &Session,
    command: ReplCommand,
    collecting: &AtomicBool,
) -> Result<()> {
    match command {
        ReplCommand::Mi(mi) => {
            let reply = session.execute(&mi, true).await?;
            print_reply(&reply);
        }
        ReplCommand::Collect(mi) => {
            collecting.store(true, Ordering::SeqCst);
            let result = session.collect(&mi).await;
            collecting.store(false, Ordering::SeqCst);

            let (reply, collected) = result?;
            for fields in &collected {
                print!("{}", unescape(&fields.concat()));
            }
            print_reply(&reply);
        }
        ReplCommand::Wait => {
            println!("Waiting for the next stop...");
            let reply = session.await_next_event(true).await?;
            print_reply(&reply);
        }
        ReplCommand::Input(text) => session.write_raw(&text).await?,
        ReplCommand::Interrupt => session.interrupt()?,
        ReplCommand::Help => print_help(),
        ReplCommand::Quit => {}
    }
    Ok(())
}

/// 完了イベントを表示する
fn print_reply(reply: &Reply) {
    let sigil = match reply {
        Reply::Result(_) => '^',
        Reply::Status(_) => '*',
    };
    if reply.fields().is_empty() {
        println!("{}{}", sigil, reply.subtype());
    } else {
        println!("{}{} {}", sigil, reply.subtype(), reply.fields().join(", "));
    }

    for line in reply.output().unwrap_or_default() {
        println!("| {}", line);
    }
}

/// コマンドと無関係に届く出力と通知を表示する購読者
///
/// 購読者は行の到着順に同期的に呼ばれるので、`collect` の実行中に届いた
/// 収集対象のストリーム出力はここでは表示せず、完了後にまとめて表示します。
fn async_printer<W>(collecting: Arc<AtomicBool>, streams: StreamSelection, write: W) -> EventBus
where
    W: Fn(&str) + Send + Sync + 'static,
{
    let write = Arc::new(write);
    let mut events = EventBus::new();

    let stream_write = Arc::clone(&write);
    events.on_stream(move |stream| {
        if !(collecting.load(Ordering::SeqCst) && streams.contains(stream.kind)) {
            stream_write(&unescape(&stream.fields.concat()));
        }
    });
    events.on_activity(move |activity| {
        write(&format!(
            "={} {}\n",
            activity.subtype(),
            activity.fields.join(", ")
        ));
    });
    events
}

/// MIのCエスケープを展開する
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn print_help() {
    println!("Available commands:");
    println!();
    println!("  help           - Show this help message");
    println!("  quit/exit/q    - Exit the debugger");
    println!();
    println!("Session commands:");
    println!("  -<mi command>  - Send an MI command and print its reply");
    println!("  collect <cmd>  - Send an MI command and print the console output it produced");
    println!("  wait (w)       - Wait for the next stop without sending anything");
    println!("  input <text>   - Write a line to the debugged program's stdin");
    println!("  interrupt      - Interrupt the running program");
    println!();
    println!("Examples:");
    println!("  -break-insert main");
    println!("  -exec-run");
    println!("  wait");
    println!("  collect -interpreter-exec console \"info registers\"");
}
