//! `osxc` binary entry point.

use clap::Parser;

use osxcleaner::cli::{self, Cli};

fn main() {
    let cli = Cli::parse();
    std::process::exit(cli::run(cli));
}
