use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

/// Joins a statically-configured peer-to-peer file distribution swarm.
#[derive(Parser, Debug)]
#[clap(name = "peer", version)]
struct Args {
    /// This process's peer id, as listed in PeerInfo.cfg.
    peer_id: u32,

    /// Path to Common.cfg.
    #[clap(long, default_value = "Common.cfg")]
    common_cfg: PathBuf,

    /// Path to PeerInfo.cfg.
    #[clap(long, default_value = "PeerInfo.cfg")]
    peer_info_cfg: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let config = match p2p_file_swarm::Config::load(&args.common_cfg, &args.peer_info_cfg) {
        Ok(config) => config,
        Err(e) => {
            log::error!("configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match p2p_file_swarm::run(args.peer_id, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("peer {} exited with an error: {}", args.peer_id, e);
            ExitCode::FAILURE
        }
    }
}
