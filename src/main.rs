mod config;
mod errors;
mod folders;
mod ftree;
mod handlers;
mod library;
mod live;
mod locations;
mod log;
mod quota;
mod records;
mod routes;
mod search;
mod server;
mod storage;

use clap::Parser;
use config::{Opts, Settings};
// Allow the server to return its version with a --version flag
const VERSION: &str = env!("CARGO_PKG_VERSION");

async fn run(opts: Opts) -> errors::Result<()> {
    let settings = Settings::from_opts(&opts)?;
    std::fs::create_dir_all(&settings.storage_dir)?;
    let _guard = log::init_logging(&settings.storage_dir, settings.debug)?;
    tracing::info!("Starting cloudshelf {} in {}", VERSION, settings.storage_dir.display());
    let srv = server::get_server(&settings)?;
    srv.start().await
}

#[tokio::main]
async fn main() {
    let opts: Opts = Opts::parse();
    if opts.version {
        println!("{}", VERSION);
        return;
    }
    if let Err(e) = run(opts).await {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
