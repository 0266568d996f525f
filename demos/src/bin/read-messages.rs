use atmodem::{
    quectel::{Ec25, SmsStatus},
    Error,
};
use atmodem_demos::common::{Args, RawPdu};
use clap::Parser;
use log::warn;

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();
    let args = Args::parse();

    let mut session = args.session();
    session.connect().await?;

    let client = session.client().cloned().ok_or(Error::NotConnected)?;
    let modem = Ec25::new(client);

    let messages = modem.list_messages(SmsStatus::All).await?;
    println!("{} message(s) in storage", messages.len());
    for message in &messages {
        match message.decode(&RawPdu) {
            Ok(pdu) => println!("{}: {} byte PDU from {:?}", message, pdu.len(), message.alpha),
            Err(e) => warn!("Skipping message {}: {}", message.index, e),
        }
    }

    session.close().await;
    Ok(())
}
