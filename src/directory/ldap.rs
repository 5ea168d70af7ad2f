//! LDAP adapter built on `ldap3`.

use super::{DirectoryError, DirectoryLookup, DirectorySession};
use crate::config::LdapConfig;
use async_trait::async_trait;
use ldap3::{dn_escape, ldap_escape, Ldap, LdapConnAsync, LdapConnSettings, LdapError, Scope, SearchEntry};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// `invalidCredentials` result code.
const RC_INVALID_CREDENTIALS: u32 = 49;

/// Directory backed by an LDAP server, one connection per session.
#[derive(Debug, Clone)]
pub struct LdapDirectory {
    config: LdapConfig,
    connect_timeout: Duration,
}

impl LdapDirectory {
    pub fn new(config: LdapConfig, connect_timeout: Duration) -> Self {
        Self {
            config,
            connect_timeout,
        }
    }

    async fn open(&self) -> Result<Ldap, DirectoryError> {
        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.connect_timeout)
            .set_starttls(self.config.starttls)
            .set_no_tls_verify(self.config.skip_tls_verify);

        let (conn, ldap) = LdapConnAsync::with_settings(settings, &self.config.url)
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "directory connection driver stopped");
            }
        });

        Ok(ldap)
    }
}

#[async_trait]
impl DirectoryLookup for LdapDirectory {
    #[instrument(skip(self), fields(url = %self.config.url))]
    async fn connect(&self) -> Result<Box<dyn DirectorySession>, DirectoryError> {
        let ldap = self.open().await?;
        debug!("directory connection opened");

        Ok(Box::new(LdapSession {
            ldap,
            config: self.config.clone(),
            bound: None,
        }))
    }

    /// Reachability only: opens a connection and unbinds without binding,
    /// so no credentials are checked.
    async fn health(&self) -> Result<(), DirectoryError> {
        let mut ldap = self.open().await?;
        ldap.unbind()
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))
    }
}

struct BoundIdentity {
    username: String,
    dn: String,
}

struct LdapSession {
    ldap: Ldap,
    config: LdapConfig,
    bound: Option<BoundIdentity>,
}

impl LdapSession {
    /// Locate the user entry, returning its DN and display name.
    async fn find_user(&mut self, username: &str) -> Result<(String, String), DirectoryError> {
        let filter = self
            .config
            .user_filter
            .replace("{username}", &ldap_escape(username));

        let (entries, _) = self
            .ldap
            .search(&self.config.base_dn, Scope::Subtree, &filter, vec!["cn"])
            .await
            .map_err(lookup_error)?
            .success()
            .map_err(lookup_error)?;

        let entry = entries
            .into_iter()
            .next()
            .map(SearchEntry::construct)
            .ok_or_else(|| DirectoryError::Lookup(format!("no entry for {username}")))?;

        let name = entry
            .attrs
            .get("cn")
            .and_then(|values| values.first())
            .cloned()
            .unwrap_or_default();

        Ok((entry.dn, name))
    }
}

#[async_trait]
impl DirectorySession for LdapSession {
    #[instrument(skip(self, password))]
    async fn authenticate(&mut self, username: &str, password: &str) -> Result<String, DirectoryError> {
        self.bound = None;

        // An empty password would turn into an unauthenticated bind
        if password.is_empty() {
            return Err(DirectoryError::InvalidCredentials);
        }

        let bind_dn = self.config.bind_dn.replace("{username}", &dn_escape(username));
        self.ldap
            .simple_bind(&bind_dn, password)
            .await
            .map_err(bind_error)?
            .success()
            .map_err(bind_error)?;

        let (dn, name) = self.find_user(username).await?;
        self.bound = Some(BoundIdentity {
            username: username.to_string(),
            dn,
        });

        Ok(name)
    }

    #[instrument(skip(self))]
    async fn groups(&mut self, username: &str) -> Result<HashSet<String>, DirectoryError> {
        let dn = match self.bound {
            Some(ref identity) if identity.username == username => identity.dn.clone(),
            _ => return Err(DirectoryError::NotBound),
        };

        let filter = self.config.group_filter.replace("{dn}", &ldap_escape(&dn));
        let (entries, _) = self
            .ldap
            .search(&self.config.base_dn, Scope::Subtree, &filter, vec!["cn"])
            .await
            .map_err(lookup_error)?
            .success()
            .map_err(lookup_error)?;

        let groups = entries
            .into_iter()
            .map(SearchEntry::construct)
            .flat_map(|entry| entry.attrs.get("cn").cloned().unwrap_or_default())
            .map(|cn| cn.to_uppercase())
            .collect();

        Ok(groups)
    }

    async fn close(self: Box<Self>) {
        let mut session = *self;
        if let Err(e) = session.ldap.unbind().await {
            warn!(error = %e, "failed to unbind directory connection");
        }
    }
}

fn bind_error(err: LdapError) -> DirectoryError {
    match err {
        LdapError::LdapResult { result } if result.rc == RC_INVALID_CREDENTIALS => {
            DirectoryError::InvalidCredentials
        }
        LdapError::LdapResult { result } => DirectoryError::Lookup(result.to_string()),
        other => DirectoryError::Unavailable(other.to_string()),
    }
}

fn lookup_error(err: LdapError) -> DirectoryError {
    match err {
        LdapError::LdapResult { result } => DirectoryError::Lookup(result.to_string()),
        other => DirectoryError::Unavailable(other.to_string()),
    }
}
