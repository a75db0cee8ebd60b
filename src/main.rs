use crate::cli::run;

mod app;
mod archive;
mod blob;
pub mod cli;
mod config;
pub mod domain;
mod fetch;
pub mod http;
mod pacing;
mod spotify;
#[cfg(test)]
mod testing;

fn main() -> anyhow::Result<()> {
    run()
}
