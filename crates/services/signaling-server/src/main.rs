//! Signaling relay binary entry point
//!
//! Starts the LessonLive signaling relay for video lesson coordination.
//!
//! # Usage
//!
//! ```bash
//! # Start the relay on the default address
//! cargo run -p lessonlive-signaling-server -- \
//!   --bind-address 0.0.0.0:8080 \
//!   --role-directory ./bookings.json
//! ```
//!
//! The role directory is a JSON export from the booking system: an array
//! of `{session_token, user_id, role}` entries. Roles are always derived
//! from it, never from what a joining client asserts.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lessonlive_core::{SessionRegistry, StaticRoleDirectory};
use lessonlive_webrtc::{SignalingServer, SignalingServerConfig};

/// LessonLive Signaling Relay
///
/// Session-scoped WebSocket relay for video lesson coordination:
/// presence, offer/answer/ICE forwarding, and tutor control commands.
/// Carries no media; peers connect directly once negotiated.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address the relay listens on
    #[arg(long, default_value = "0.0.0.0:8080", env = "SIGNALING_BIND_ADDRESS")]
    bind_address: String,

    /// Path to the booking system's role export
    #[arg(
        long,
        default_value = "./bookings.json",
        env = "SIGNALING_ROLE_DIRECTORY"
    )]
    role_directory: PathBuf,

    /// Per-connection outbound queue capacity
    #[arg(long, default_value_t = 128, env = "SIGNALING_CHANNEL_CAPACITY")]
    channel_capacity: usize,

    /// Maximum accepted frame size in bytes
    #[arg(long, default_value_t = 262_144, env = "SIGNALING_MAX_FRAME_BYTES")]
    max_frame_bytes: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Set up Ctrl+C handling before anything can block
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_handler = Arc::clone(&shutdown_flag);

    ctrlc::set_handler(move || {
        eprintln!("\nShutdown signal received");

        let was_already_set = shutdown_flag_handler.swap(true, Ordering::SeqCst);
        if was_already_set {
            eprintln!("Shutdown already in progress, forcing immediate exit");
            std::process::exit(0);
        }

        // Force exit if graceful shutdown stalls
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_secs(3));
            eprintln!("Graceful shutdown timeout (3s), forcing exit");
            std::process::exit(0);
        });
    })
    .expect("Failed to set Ctrl+C handler");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .thread_name("signaling-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args, shutdown_flag))
}

async fn async_main(
    args: Args,
    shutdown_flag: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %args.bind_address,
        "LessonLive signaling relay starting"
    );

    let directory = StaticRoleDirectory::load(&args.role_directory)?;
    let registry = SessionRegistry::new(Arc::new(directory));

    let config = SignalingServerConfig {
        bind_address: args.bind_address.clone(),
        channel_capacity: args.channel_capacity,
        max_frame_bytes: args.max_frame_bytes,
    };
    config.validate()?;

    let handle = SignalingServer::bind(config, registry).await?;
    info!(url = %handle.url(), "Relay running. Press Ctrl+C to shutdown.");

    while !shutdown_flag.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }

    info!("Shutdown signal received, cleaning up...");
    handle.shutdown().await;
    info!("Relay shut down gracefully");

    Ok(())
}

fn init_tracing() {
    // EnvFilter picks up RUST_LOG
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
