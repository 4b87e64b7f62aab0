// Writes the tracewatch man page to stdout: `generate-man > tracewatch.1`

use clap::CommandFactory;
use tracewatch::cli::Cli;

fn main() -> std::io::Result<()> {
    let man = clap_mangen::Man::new(Cli::command());
    man.render(&mut std::io::stdout())
}
