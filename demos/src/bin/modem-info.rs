use atmodem::{quectel::Ec25, Command, Error};
use atmodem_demos::common::Args;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();
    let args = Args::parse();

    let mut session = args.session();
    session.connect().await?;

    let client = session.client().cloned().ok_or(Error::NotConnected)?;
    let modem = Ec25::new(client);

    let info = modem.product_info().await?;
    println!("{}", info);
    println!("IMEI: {}", modem.imei().await?);

    let signal = session.send_command(&Command::new("AT+CSQ")?).await?;
    println!("{}", signal);

    session.close().await;
    Ok(())
}
