use atmodem::{Error, HandlerError, Urc};
use atmodem_demos::common::Args;
use clap::Parser;
use log::info;

/// Print every notification until Ctrl-C.
#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();
    let args = Args::parse();

    let mut session = args.session();
    session
        .register_notification_handler(|urc: Urc| async move {
            println!("{}", urc);
            Ok::<_, HandlerError>(())
        })
        .await;
    session.connect().await?;
    info!("Listening on {}, Ctrl-C to stop", args.device);

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to wait for Ctrl-C: {}", e);
    }

    session.close().await;
    Ok(())
}
