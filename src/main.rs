use argh::FromArgs;
use shellish::Interpreter;
use shellish::editor::{Editor, LineSource};
use std::io::{self, IsTerminal};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(FromArgs)]
/// Interactive shell with pipes, redirections and background jobs.
struct Args {
    /// log filter used when RUST_LOG is unset (trace, debug, info, warn, error).
    #[argh(option, default = "String::from(\"warn\")")]
    log_level: String,

    /// read commands line by line from stdin without the line editor.
    #[argh(switch)]
    plain: bool,
}

fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let stdin = io::stdin();
    let mut source: Box<dyn LineSource> = if args.plain || !stdin.is_terminal() {
        debug!("reading plain lines from stdin");
        Box::new(stdin)
    } else {
        Box::new(Editor::new()?)
    };

    let mut sh = Interpreter::default();
    sh.repl(source.as_mut())
}
