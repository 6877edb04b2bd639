use std::time::Duration;

use docsink::store::{ConnectOptions, StoreError, StoreErrorCode};
use fred::prelude::{
    Client, ClientLike, Error as FredError, ErrorKind as FredErrorKind, EventInterface,
    FredResult, Pool, ReconnectPolicy, Server, ServerConfig,
};
use fred::types::Builder;
use fred::types::config::UnresponsiveConfig;
use futures::future::join_all;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error};

/// Timeout of a single command, including internal ones issued on connect.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval at which connections are checked for responsiveness.
const UNRESPONSIVE_CHECK_INTERVAL: Duration = Duration::from_secs(3);

/// Credentials of a Redis connection.
#[derive(Debug, Clone, Default)]
pub(super) struct Credentials {
    pub(super) username: Option<String>,
    pub(super) password: Option<String>,
}

/// Connects a pool sized and timed by `options`.
///
/// The pool holds `max_idle_connections` clients, and a client that stays unresponsive for
/// `idle_timeout` is reconnected.
pub(super) async fn connect_pool(
    options: &ConnectOptions,
    credentials: Credentials,
) -> Result<Pool, StoreError> {
    let (host, port) = parse_address(&options.address)?;
    let idle_timeout = options.idle_timeout;

    let pool = Builder::default_centralized()
        .with_config(|config| {
            config.username = credentials.username;
            config.password = credentials.password;
            config.server = ServerConfig::Centralized {
                server: Server::new(host, port),
            };
        })
        .with_connection_config(|config| {
            config.internal_command_timeout = COMMAND_TIMEOUT;
            config.reconnect_on_auth_error = true;
            config.unresponsive = UnresponsiveConfig {
                max_timeout: Some(idle_timeout),
                interval: UNRESPONSIVE_CHECK_INTERVAL,
            };
        })
        .with_performance_config(|config| {
            config.default_command_timeout = COMMAND_TIMEOUT;
        })
        .set_policy(ReconnectPolicy::new_exponential(0, 1, 2000, 5))
        .build_pool(options.max_idle_connections.max(1))
        .map_err(store_error)?;

    for client in pool.clients() {
        spawn_connection_monitor(client);
    }

    let connections = pool.connect_pool();

    debug!(address = %options.address, "waiting for redis connections");
    pool.wait_for_connect().await.map_err(store_error)?;

    // Connection tasks only end when the pool quits.
    tokio::spawn(async move {
        let _results = join_all(connections).await;
    });

    Ok(pool)
}

/// Logs the connection events of a pooled client until the client is dropped.
fn spawn_connection_monitor(client: &Client) {
    let mut error_rx = client.error_rx();
    let mut reconnect_rx = client.reconnect_rx();
    let mut unresponsive_rx = client.unresponsive_rx();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = error_rx.recv() => match event {
                    Ok((err, server)) => error!(?server, error = ?err, "redis client error"),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                },
                event = unresponsive_rx.recv() => match event {
                    Ok(server) => error!(?server, "redis client unresponsive"),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                },
                event = reconnect_rx.recv() => match event {
                    Ok(server) => debug!(?server, "redis client connected"),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                },
            }
        }
    });
}

/// Splits a `host:port` address.
pub(super) fn parse_address(address: &str) -> Result<(String, u16), StoreError> {
    let invalid = || {
        StoreError::new(
            StoreErrorCode::ConnectionFailed,
            format!("invalid redis address `{address}`, expected `host:port`"),
        )
    };

    let (host, port) = address.rsplit_once(':').ok_or_else(invalid)?;
    if host.is_empty() {
        return Err(invalid());
    }
    let port = port.parse::<u16>().map_err(|_| invalid())?;

    Ok((host.to_owned(), port))
}

/// Maps a driver error, flagging the ones caused by a broken or unreachable connection.
pub(super) fn store_error(err: FredError) -> StoreError {
    match err.kind() {
        FredErrorKind::IO | FredErrorKind::Timeout | FredErrorKind::Canceled => {
            StoreError::new(StoreErrorCode::ConnectionFailed, err.to_string())
        }
        _ => StoreError::message(err.to_string()),
    }
}

pub(super) fn map_result<T>(result: FredResult<T>) -> Result<T, StoreError> {
    result.map_err(store_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_are_split_on_the_last_colon() {
        assert_eq!(
            parse_address("cache.internal:6380").unwrap(),
            ("cache.internal".to_owned(), 6380)
        );
    }

    #[test]
    fn malformed_addresses_are_connection_failures() {
        for address in ["localhost", ":6379", "localhost:port"] {
            let err = parse_address(address).unwrap_err();
            assert_eq!(err.code(), Some(StoreErrorCode::ConnectionFailed), "{address}");
        }
    }

    #[test]
    fn io_errors_are_connection_failures() {
        let err = store_error(FredError::new(FredErrorKind::IO, "connection reset"));
        assert_eq!(err.code(), Some(StoreErrorCode::ConnectionFailed));

        let err = store_error(FredError::new(FredErrorKind::InvalidArgument, "bad key"));
        assert_eq!(err.code(), None);
    }
}
