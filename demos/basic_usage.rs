use std::error::Error;
use tokio::time::{sleep, Duration};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use cinema_link_rs::{AuthState, TheaterFleet};

/// Polls every configured theater for its status and pre-show timer.
///
/// Usage: `cargo run --example basic_usage -- theaters.json`
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let path = std::env::args()
        .nth(1)
        .ok_or("Please provide a theaters.json path")?;
    let json = std::fs::read_to_string(&path)?;
    let fleet = TheaterFleet::from_json_str(&json)?;
    println!("Managing {} theaters: {:?}", fleet.len(), fleet.names());

    for theater in fleet.iter() {
        let mut auth_rx = theater.auth_state_receiver();
        let name = theater.name().to_string();
        tokio::spawn(async move {
            while auth_rx.changed().await.is_ok() {
                let state = *auth_rx.borrow_and_update();
                if state == AuthState::LoggedOut {
                    println!("[{}] session lost", name);
                }
            }
        });

        if !theater.login().await {
            println!("[{}] login failed", theater.name());
        }
    }

    let poll = async {
        loop {
            for theater in fleet.iter() {
                match theater.playback_status().await {
                    Ok(status) => println!(
                        "[{}] {:?} {} at {:?}s{}",
                        theater.name(),
                        status.state(),
                        status.title().unwrap_or("-"),
                        status.spl_position,
                        status
                            .next_show
                            .as_ref()
                            .map(|n| format!(" (next: {} at {})", n.title, n.start))
                            .unwrap_or_default()
                    ),
                    Err(e) => println!("[{}] status unavailable: {}", theater.name(), e),
                }
                match theater.current_timer().await {
                    Ok(Some(timer)) => println!(
                        "[{}] {} {}s ({})",
                        theater.name(),
                        timer.label,
                        timer.seconds_remaining,
                        timer.target_time.as_deref().unwrap_or("")
                    ),
                    Ok(None) => {}
                    Err(e) => println!("[{}] timer unavailable: {}", theater.name(), e),
                }
            }
            sleep(Duration::from_secs(10)).await;
        }
    };

    tokio::select! {
        _ = poll => {}
        _ = tokio::signal::ctrl_c() => println!("Shutting down..."),
    }

    fleet.shutdown().await;
    Ok(())
}
