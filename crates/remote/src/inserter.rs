//! Redis-backed conditional inserts.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use cachelift_core::{key_preview, Entry, InsertOutcome, MigrateError, RemoteConfig, RemoteInserter};

use crate::error::RemoteError;
use crate::retry::RetryPolicy;

/// The shared connection and how many times it has been replaced.
struct Link {
    connection: MultiplexedConnection,
    generation: u64,
}

/// Destination adapter issuing `SET key value NX [PX ttl]`.
///
/// One multiplexed connection is shared by all workers; each call clones the
/// handle, so concurrent inserts pipeline over the same socket. A connection
/// or timeout failure replaces that connection before the next attempt.
pub struct RedisInserter {
    client: redis::Client,
    link: RwLock<Link>,
    connect_timeout: Duration,
    operation_timeout: Duration,
    retry: RetryPolicy,
}

impl RedisInserter {
    /// Connect and verify the destination answers `PING`.
    ///
    /// Runs before the source store is opened so an unreachable destination
    /// fails the run without any index loading.
    pub async fn connect(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| RemoteError::Config(e.to_string()))?;

        let mut connection = open_connection(&client, config.connect_timeout).await?;
        let pong: String = tokio::time::timeout(
            config.connect_timeout,
            redis::cmd("PING").query_async(&mut connection),
        )
        .await
        .map_err(|_| RemoteError::Timeout(config.connect_timeout.as_millis() as u64))?
        .map_err(|e| RemoteError::Connection(e.to_string()))?;

        info!(
            url = %config.redacted_url(),
            reply = %pong,
            "connected to destination"
        );

        Ok(Self {
            client,
            link: RwLock::new(Link {
                connection,
                generation: 0,
            }),
            connect_timeout: config.connect_timeout,
            operation_timeout: config.operation_timeout,
            retry: RetryPolicy::new(config.max_retries, config.retry_backoff),
        })
    }

    /// One `SET NX` attempt. `true` when the key was written.
    ///
    /// Also returns the generation of the connection the attempt used.
    async fn set_if_absent(&self, entry: &Entry) -> (u64, Result<bool, RemoteError>) {
        let mut cmd = redis::cmd("SET");
        cmd.arg(&entry.key[..]).arg(&entry.value[..]).arg("NX");
        if let Some(ttl_ms) = entry.ttl_millis() {
            cmd.arg("PX").arg(ttl_ms);
        }

        let (mut connection, generation) = {
            let link = self.link.read().await;
            (link.connection.clone(), link.generation)
        };

        // `OK` when set, nil when the key already exists.
        let answered: Result<redis::RedisResult<Option<String>>, _> =
            tokio::time::timeout(self.operation_timeout, cmd.query_async(&mut connection)).await;
        let reply = match answered {
            Ok(Ok(reply)) => Ok(reply.is_some()),
            Ok(Err(e)) => Err(RemoteError::from(e)),
            Err(_) => Err(RemoteError::Timeout(self.operation_timeout.as_millis() as u64)),
        };
        (generation, reply)
    }

    /// Replace the connection of `failed` generation, unless another worker
    /// already did. A failed reconnect keeps the old handle; the next attempt
    /// fails and lands here again.
    async fn reconnect(&self, failed: u64) {
        let mut link = self.link.write().await;
        if link.generation != failed {
            return;
        }
        match open_connection(&self.client, self.connect_timeout).await {
            Ok(connection) => {
                link.connection = connection;
                link.generation += 1;
                info!(generation = link.generation, "reconnected to destination");
            }
            Err(e) => warn!(error = %e, "reconnect to destination failed"),
        }
    }
}

async fn open_connection(
    client: &redis::Client,
    timeout: Duration,
) -> Result<MultiplexedConnection, RemoteError> {
    tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
        .await
        .map_err(|_| RemoteError::Timeout(timeout.as_millis() as u64))?
        .map_err(|e| RemoteError::Connection(e.to_string()))
}

#[async_trait]
impl RemoteInserter for RedisInserter {
    async fn try_insert(&self, entry: &Entry) -> Result<InsertOutcome, MigrateError> {
        let mut retry = 0;
        let mut timed_out = false;
        loop {
            let (generation, attempt) = self.set_if_absent(entry).await;
            match attempt {
                Ok(inserted) => {
                    let outcome = InsertOutcome::from_inserted(inserted);
                    if timed_out && !outcome.was_inserted() {
                        // The timed out attempt may have been applied server side.
                        debug!(
                            key = %key_preview(&entry.key),
                            "key present after a timed out attempt, counted as already present"
                        );
                    }
                    return Ok(outcome);
                }
                Err(e) if e.is_transient() => {
                    retry += 1;
                    let Some(delay) = self.retry.backoff(retry) else {
                        return Err(MigrateError::insert(
                            &entry.key,
                            format!("{e} (gave up after {} retries)", retry - 1),
                        ));
                    };
                    warn!(
                        key = %key_preview(&entry.key),
                        error = %e,
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        "transient insert failure, retrying"
                    );
                    timed_out |= matches!(e, RemoteError::Timeout(_));
                    tokio::time::sleep(delay).await;
                    self.reconnect(generation).await;
                }
                Err(e) => {
                    debug!(key = %key_preview(&entry.key), error = %e, "insert rejected");
                    return Err(MigrateError::insert(&entry.key, e.to_string()));
                }
            }
        }
    }
}
