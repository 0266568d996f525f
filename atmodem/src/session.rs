use std::{future::Future, io, sync::Arc};

use tokio::{
    io::{AsyncRead, AsyncWrite},
    task::JoinHandle,
};

use crate::{
    client::SendOptions,
    urc_channel::{deliver, HandlerSlot, NotificationHandler},
    Client, Command, Config, Error, Response, UrcQueue, UrcRegistry,
};

/// Opens the byte stream to a device.
pub trait Connector: Send + Sync + 'static {
    type Reader: AsyncRead + Unpin + Send + 'static;
    type Writer: AsyncWrite + Unpin + Send + 'static;

    fn connect(&self) -> impl Future<Output = io::Result<(Self::Reader, Self::Writer)>> + Send;
}

#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Initializing,
    Ready,
    Closing,
}

/// A connection to a modem, from opening the transport through the
/// initialization handshake to closing it again.
///
/// While [`SessionState::Ready`], the background monitor and the
/// notification delivery loop are running.
pub struct Session<C: Connector> {
    connector: C,
    config: Config,
    registry: UrcRegistry,
    state: SessionState,
    client: Option<Client<C::Reader, C::Writer>>,
    handler: HandlerSlot,
    delivery: Option<JoinHandle<()>>,
}

impl<C: Connector> Session<C> {
    pub fn new(connector: C, registry: UrcRegistry, config: Config) -> Self {
        Self {
            connector,
            config,
            registry,
            state: SessionState::Disconnected,
            client: None,
            handler: HandlerSlot::default(),
            delivery: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The command engine, while connected.
    pub fn client(&self) -> Option<&Client<C::Reader, C::Writer>> {
        self.client.as_ref()
    }

    /// Open the transport and run the handshake.
    ///
    /// On failure the session is back in [`SessionState::Disconnected`] and
    /// `connect` may be called again. Connecting a ready session does
    /// nothing.
    pub async fn connect(&mut self) -> Result<(), Error> {
        if self.state == SessionState::Ready {
            return Ok(());
        }

        self.state = SessionState::Connecting;
        let (reader, writer) = match self.connector.connect().await {
            Ok(streams) => streams,
            Err(e) => {
                error!("Failed to open transport: {}", e);
                self.state = SessionState::Disconnected;
                return Err(Error::Connect(e));
            }
        };
        debug!("Transport open");

        self.state = SessionState::Initializing;
        let client = Client::new(reader, writer, self.registry.clone(), self.config.clone());
        for command in &self.config.handshake {
            if let Err(e) = client.send_command(command).await {
                error!("Handshake failed at {}: {}", command, e);
                if let Err(e) = client.shutdown().await {
                    debug!("Shutdown after failed handshake: {}", e);
                }
                self.state = SessionState::Disconnected;
                return Err(Error::Handshake {
                    command: command.to_string(),
                    source: Box::new(e),
                });
            }
        }

        client.start_monitor();
        self.delivery = Some(tokio::spawn(deliver(
            client.urc_queue().clone(),
            self.handler.clone(),
            self.config.urc_poll_interval,
        )));
        self.client = Some(client);
        self.state = SessionState::Ready;
        info!("Modem ready");
        Ok(())
    }

    /// Stop both background loops, then close the transport. Closing a
    /// disconnected session does nothing.
    pub async fn close(&mut self) {
        if self.state == SessionState::Disconnected {
            return;
        }
        self.state = SessionState::Closing;

        if let Some(delivery) = self.delivery.take() {
            delivery.abort();
            if let Err(e) = delivery.await {
                if !e.is_cancelled() {
                    error!("Notification delivery failed: {}", e);
                }
            }
        }

        if let Some(client) = self.client.take() {
            client.stop_monitor().await;
            if let Err(e) = client.shutdown().await {
                warn!("Failed to close transport: {}", e);
            }
        }

        self.state = SessionState::Disconnected;
        info!("Modem disconnected");
    }

    pub async fn send_command(&self, command: &Command) -> Result<Response, Error> {
        self.ready_client()?.send_command(command).await
    }

    pub async fn send_command_with(
        &self,
        command: &Command,
        options: SendOptions<'_>,
    ) -> Result<Response, Error> {
        self.ready_client()?
            .send_command_with(command, options)
            .await
    }

    /// Replace the notification handler. Notifications captured while no
    /// handler was registered are delivered to it.
    pub async fn register_notification_handler(&self, handler: impl NotificationHandler) {
        *self.handler.lock().await = Some(Box::new(handler));
    }

    /// Notifications captured and not yet delivered.
    pub fn urc_queue(&self) -> Option<&Arc<UrcQueue>> {
        self.client.as_ref().map(Client::urc_queue)
    }

    fn ready_client(&self) -> Result<&Client<C::Reader, C::Writer>, Error> {
        match (&self.client, self.state) {
            (Some(client), SessionState::Ready) => Ok(client),
            _ => Err(Error::NotConnected),
        }
    }
}

impl<C: Connector> Drop for Session<C> {
    fn drop(&mut self) {
        if let Some(delivery) = self.delivery.take() {
            delivery.abort();
        }
    }
}
