//! Settings loading. A TOML file is picked by build profile and can be
//! overridden with the `--settings` flag.

mod settings;
pub use settings::*;

pub use clap::Parser;

#[derive(Parser, Debug)]
pub struct Cli {
    #[arg(long)]
    pub settings: Option<String>,
}
