//! Redis-backed secret and session stores.
//!
//! Both stores share one lazily established [`ConnectionManager`], so the
//! service starts even when Redis is down and reports it through health.

use super::{SecretInsert, SecretStore, ServiceSecret, SessionKey, SessionStore, StoreError};
use crate::config::RedisConfig;
use crate::token::TokenClaims;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

/// Shared Redis connection.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    conn: Arc<OnceCell<ConnectionManager>>,
}

impl RedisStore {
    pub fn new(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(RedisStore {
            client,
            conn: Arc::new(OnceCell::new()),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                debug!("connecting to redis");
                ConnectionManager::new(self.client.clone())
                    .await
                    .map_err(|e| StoreError::Unavailable(e.to_string()))
            })
            .await?;
        Ok(conn.clone())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("connected", &self.conn.initialized())
            .finish()
    }
}

/// Secret registry stored under `"{prefix}@@{service}"`.
#[derive(Debug, Clone)]
pub struct RedisSecretStore {
    store: RedisStore,
    prefix: String,
    ttl: Option<Duration>,
}

impl RedisSecretStore {
    pub fn new(store: RedisStore, config: &RedisConfig) -> Self {
        Self {
            store,
            prefix: config.secret_key_prefix.clone(),
            ttl: config.secret_ttl,
        }
    }

    fn key(&self, service: &str) -> String {
        format!("{}@@{}", self.prefix, service)
    }
}

fn non_empty(value: Option<String>) -> Option<ServiceSecret> {
    value.filter(|v| !v.is_empty()).map(ServiceSecret::new)
}

#[async_trait]
impl SecretStore for RedisSecretStore {
    #[instrument(skip(self))]
    async fn find(&self, service: &str) -> Result<Option<ServiceSecret>, StoreError> {
        let mut conn = self.store.connection().await?;
        let value: Option<String> = conn.get(self.key(service)).await?;
        Ok(non_empty(value))
    }

    #[instrument(skip(self, secret))]
    async fn create_if_absent(
        &self,
        service: &str,
        secret: &ServiceSecret,
    ) -> Result<SecretInsert, StoreError> {
        let key = self.key(service);
        let mut conn = self.store.connection().await?;

        // SET NX can lose to a concurrent DEL between the two commands; retry once.
        for _ in 0..2 {
            let mut cmd = redis::cmd("SET");
            cmd.arg(&key).arg(secret.expose()).arg("NX");
            if let Some(ttl) = self.ttl {
                cmd.arg("EX").arg(ttl.as_secs());
            }

            let reply: Option<String> = cmd.query_async(&mut conn).await?;
            if reply.is_some() {
                return Ok(SecretInsert::Created);
            }

            let existing: Option<String> = conn.get(&key).await?;
            if let Some(existing) = non_empty(existing) {
                return Ok(SecretInsert::Existing(existing));
            }
        }

        Err(StoreError::Backend(format!(
            "secret for {service} changed concurrently"
        )))
    }

    #[instrument(skip(self))]
    async fn delete(&self, service: &str) -> Result<Option<ServiceSecret>, StoreError> {
        let mut conn = self.store.connection().await?;
        let removed: Option<String> = redis::cmd("GETDEL")
            .arg(self.key(service))
            .query_async(&mut conn)
            .await?;
        Ok(non_empty(removed))
    }

    async fn health(&self) -> Result<(), StoreError> {
        self.store.ping().await
    }
}

/// Session store keyed by `"{prefix}@@{digest(username, service, token)}"`.
#[derive(Debug, Clone)]
pub struct RedisSessionStore {
    store: RedisStore,
    prefix: String,
}

impl RedisSessionStore {
    pub fn new(store: RedisStore, config: &RedisConfig) -> Self {
        Self {
            store,
            prefix: config.session_key_prefix.clone(),
        }
    }

    fn key(&self, key: &SessionKey) -> String {
        format!("{}@@{}", self.prefix, key.digest())
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    #[instrument(skip_all, fields(username = %key.username, service = %key.service))]
    async fn get(&self, key: &SessionKey) -> Result<Option<TokenClaims>, StoreError> {
        let mut conn = self.store.connection().await?;
        let value: Option<String> = conn.get(self.key(key)).await?;

        match value {
            Some(v) => {
                let claims = serde_json::from_str(&v)
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?;
                Ok(Some(claims))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip_all, fields(username = %key.username, service = %key.service))]
    async fn put(&self, key: &SessionKey, claims: &TokenClaims, ttl: Duration) -> Result<(), StoreError> {
        let value = serde_json::to_string(claims)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let mut conn = self.store.connection().await?;
        conn.set_ex::<_, _, ()>(self.key(key), value, ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn health(&self) -> Result<(), StoreError> {
        self.store.ping().await
    }
}
