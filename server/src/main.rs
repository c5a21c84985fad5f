use clap::Parser;
use log::info;
use server::server::MatchServer;
use shared::{TICK_RATE, WIN_SCORE};

/// Main-method of the application.
/// Parses command-line arguments, boots the match engine event loop, and
/// drains match results on behalf of the persistence collaborator.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Simulation tick rate per room (updates per second)
        #[clap(short, long, default_value_t = TICK_RATE)]
        tick_rate: u32,
        /// Points needed to win a match
        #[clap(short, long, default_value_t = WIN_SCORE)]
        win_score: u32,
    }

    env_logger::init();
    let args = Args::parse();

    let (engine, handle, mut results) = MatchServer::new(args.tick_rate, args.win_score);

    // Fire-and-forget consumer seam for the persistence subsystem: results
    // are logged here and dropped.
    tokio::spawn(async move {
        while let Some(result) = results.recv().await {
            info!(
                "Match finished: {:?} won {}-{} ({} vs {})",
                result.winner,
                result.score_left,
                result.score_right,
                result.user_left,
                result.user_right
            );
        }
    });

    let engine_task = tokio::spawn(engine.run());

    tokio::select! {
        result = engine_task => {
            if let Err(e) = result {
                eprintln!("Engine task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            handle.shutdown();
        }
    }

    Ok(())
}
