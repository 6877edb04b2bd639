use tokio::sync::watch;

/// Transmitter side of the shutdown channel.
///
/// Wraps a [`watch::Sender`] of unit values: a send carries no data, it only notifies every
/// subscribed receiver that shutdown was requested.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<()>);

impl ShutdownTx {
    /// Notifies all subscribed receivers.
    ///
    /// Fails when no receiver is alive, which means no worker is left to shut down.
    pub fn shutdown(&self) -> Result<(), watch::error::SendError<()>> {
        self.0.send(())
    }

    /// Creates a new receiver that only observes shutdown requests sent after this call.
    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

/// Receiver side of the shutdown channel. `changed()` resolves once shutdown is requested.
pub type ShutdownRx = watch::Receiver<()>;

/// Creates a new shutdown channel.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(());
    (ShutdownTx(tx), rx)
}
