use sha2::{Digest, Sha256};
use std::io;
use std::sync::Arc;

use super::backoff::backoff_delay;
use super::connection::{Connection, Connector};
use super::selection::ReplicaPolicy;
use super::types::*;
use crate::protocol::{ProtocolError, Request, Response, validate_key, validate_value};
use crate::ring::{HashRing, NodeInfo, Position, RingCache, RingError, codec};

/// Ring refreshes allowed for a single request before giving up.
pub const DEFAULT_MAX_REDIRECTS: usize = 16;

/// Hex SHA-256 of a password. Only the hash ever leaves the client.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Read,
    Write,
}

/// Client that routes every request to the node currently responsible for its key.
///
/// A request goes through `resolve -> connect -> send -> classify`:
/// - transient refusals (`server_stopped`, `server_write_lock`) are resent after a backoff,
/// - `server_not_responsible` refreshes the relevant ring and resolves again,
/// - `invalid_password` ends the request with a `PasswordRequired` reply,
/// - anything else is the final answer.
///
/// At most one connection is open at a time; it is reused while requests keep resolving to
/// the same node.
pub struct RoutingClient<C: Connector> {
    connector: C,
    write_ring: RingCache,
    read_ring: RingCache,
    policy: ReplicaPolicy,
    max_redirects: usize,
    connection: Option<C::Conn>,
    challenge: PasswordChallenge,
}

impl<C: Connector> RoutingClient<C> {
    /// Creates a client that starts from `seed` for both reads and writes.
    pub fn new(connector: C, seed: HashRing) -> Self {
        Self {
            connector,
            write_ring: RingCache::new(seed.clone()),
            read_ring: RingCache::new(seed),
            policy: ReplicaPolicy::default(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            connection: None,
            challenge: PasswordChallenge::default(),
        }
    }

    /// Connects to a single known node and learns the full rings from it.
    pub async fn bootstrap(connector: C, seed: NodeInfo) -> Result<Self, ClientError> {
        let mut client = Self::new(connector, HashRing::from_nodes([seed]));
        client.refresh_rings().await?;
        Ok(client)
    }

    pub fn with_policy(mut self, policy: ReplicaPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn write_ring(&self) -> Arc<HashRing> {
        self.write_ring.snapshot()
    }

    pub fn read_ring(&self) -> Arc<HashRing> {
        self.read_ring.snapshot()
    }

    pub fn password_challenge(&self) -> PasswordChallenge {
        self.challenge
    }

    pub fn connected_to(&self) -> Option<&NodeInfo> {
        self.connection.as_ref().map(Connection::peer)
    }

    pub fn disconnect(&mut self) {
        self.connection = None;
    }

    pub async fn get(&mut self, key: &str, password: Option<&str>) -> Result<GetReply, ClientError> {
        validate_key(key).map_err(invalid_input)?;
        let request = Request::Get {
            key: key.to_string(),
            password: password.map(hash_password),
        };

        let reply = match self.execute(&request, Route::Read).await? {
            Response::GetSuccess { value, .. } => GetReply::Found(value),
            Response::GetError { .. } => GetReply::NotFound,
            Response::InvalidPassword => {
                self.challenge.record();
                return Ok(GetReply::PasswordRequired);
            }
            other => return Err(self.unexpected(other)),
        };
        self.challenge.clear();
        Ok(reply)
    }

    pub async fn put(
        &mut self,
        key: &str,
        value: &[u8],
        password: Option<&str>,
    ) -> Result<PutReply, ClientError> {
        validate_key(key).map_err(invalid_input)?;
        validate_value(value).map_err(invalid_input)?;
        let request = Request::Put {
            key: key.to_string(),
            value: value.to_vec(),
            password: password.map(hash_password),
        };

        let reply = match self.execute(&request, Route::Write).await? {
            Response::PutSuccess { .. } => PutReply::Created,
            Response::PutUpdate { .. } => PutReply::Updated,
            Response::PutError { reason, .. } => PutReply::Failed(reason),
            Response::InvalidPassword => {
                self.challenge.record();
                return Ok(PutReply::PasswordRequired);
            }
            other => return Err(self.unexpected(other)),
        };
        self.challenge.clear();
        Ok(reply)
    }

    pub async fn delete(
        &mut self,
        key: &str,
        password: Option<&str>,
    ) -> Result<DeleteReply, ClientError> {
        validate_key(key).map_err(invalid_input)?;
        let request = Request::Delete {
            key: key.to_string(),
            password: password.map(hash_password),
        };

        let reply = match self.execute(&request, Route::Write).await? {
            Response::DeleteSuccess { .. } => DeleteReply::Deleted,
            Response::DeleteError { .. } => DeleteReply::NotFound,
            Response::InvalidPassword => {
                self.challenge.record();
                return Ok(DeleteReply::PasswordRequired);
            }
            other => return Err(self.unexpected(other)),
        };
        self.challenge.clear();
        Ok(reply)
    }

    /// Replaces both rings with fresh copies from the connected node (or the first reachable
    /// node of the write ring).
    pub async fn refresh_rings(&mut self) -> Result<(), ClientError> {
        if self.connection.is_none() {
            self.connect_any().await?;
        }
        self.refresh(Route::Write).await?;
        self.refresh(Route::Read).await
    }

    async fn execute(&mut self, request: &Request, route: Route) -> Result<Response, ClientError> {
        let key_hash = request.key().map(Position::of_key).unwrap_or(Position::MIN);
        let line = request.to_string();
        let mut redirects = 0;

        loop {
            self.ensure_connected(key_hash, route).await?;
            match self.exchange_with_backoff(&line).await? {
                Response::ServerNotResponsible => {
                    redirects += 1;
                    if redirects > self.max_redirects {
                        tracing::warn!(
                            "Giving up on '{}' after {} redirects",
                            request.key().unwrap_or_default(),
                            self.max_redirects
                        );
                        return Err(ClientError::TooManyRedirects(self.max_redirects));
                    }
                    tracing::debug!(
                        "Node {:?} is not responsible for '{}', refreshing ring",
                        self.connected_to(),
                        request.key().unwrap_or_default()
                    );
                    self.refresh(route).await?;
                }
                response => return Ok(response),
            }
        }
    }

    /// Makes sure the open connection goes to the node that should serve `key_hash`,
    /// dropping unreachable nodes from the ring until one accepts.
    async fn ensure_connected(&mut self, key_hash: Position, route: Route) -> Result<(), ClientError> {
        let mut substituted = false;
        loop {
            let ring = self.ring(route).snapshot();
            let target = match route {
                Route::Read => self
                    .policy
                    .choose(&ring, key_hash, &mut rand::thread_rng()),
                Route::Write => ring.responsible(key_hash).cloned(),
            };
            let target = match target {
                Ok(target) => target,
                Err(RingError::Empty) => return Err(ClientError::NoReachableNode),
                Err(e) => return Err(e.into()),
            };

            if self.connected_to() == Some(&target) {
                return Ok(());
            }

            match self.open(&target).await {
                Ok(connection) => {
                    self.connection = Some(connection);
                    if substituted {
                        self.refresh_after_failover().await;
                    }
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Node {} unreachable ({}), dropping it from the ring", target, e);
                    self.connection = None;
                    let Some(position) = ring.position_of(&target) else {
                        return Err(ClientError::NoReachableNode);
                    };
                    self.ring(route).remove(position);
                    substituted = true;
                }
            }
        }
    }

    async fn connect_any(&mut self) -> Result<(), ClientError> {
        let ring = self.write_ring.snapshot();
        for node in ring.nodes() {
            match self.open(node).await {
                Ok(connection) => {
                    self.connection = Some(connection);
                    return Ok(());
                }
                Err(e) => tracing::warn!("Node {} unreachable: {}", node, e),
            }
        }
        Err(ClientError::NoReachableNode)
    }

    async fn open(&self, node: &NodeInfo) -> io::Result<C::Conn> {
        let mut connection = self.connector.connect(node).await?;
        match connection.read_line().await? {
            Some(greeting) => {
                tracing::debug!("Connected to {}: {}", node, greeting);
                Ok(connection)
            }
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{} closed the connection before greeting", node),
            )),
        }
    }

    /// After switching to a substitute node the local rings are known to be stale.
    async fn refresh_after_failover(&mut self) {
        for route in [Route::Write, Route::Read] {
            if let Err(e) = self.refresh(route).await {
                tracing::warn!("Ring refresh after failover failed: {}", e);
            }
        }
    }

    async fn refresh(&mut self, route: Route) -> Result<(), ClientError> {
        let request = match route {
            Route::Write => Request::KeyRange,
            Route::Read => Request::KeyRangeRead,
        };
        let wire = match (route, self.exchange_with_backoff(&request.to_string()).await?) {
            (Route::Write, Response::KeyRange(wire)) => wire,
            (Route::Read, Response::KeyRangeRead(wire)) => wire,
            (_, other) => return Err(self.unexpected(other)),
        };

        let ring = codec::decode(&wire)?;
        tracing::debug!("Installed {:?} ring with {} node(s)", route, ring.len());
        self.ring(route).replace(ring);
        Ok(())
    }

    /// Sends `line`, resending it after a backoff for as long as the node answers with a
    /// transient refusal.
    async fn exchange_with_backoff(&mut self, line: &str) -> Result<Response, ClientError> {
        let mut attempt: u32 = 0;
        loop {
            let response = self.exchange(line).await?;
            if !response.is_transient() {
                return Ok(response);
            }
            let delay = backoff_delay(attempt, &mut rand::thread_rng());
            tracing::debug!("Node answered {}, retrying in {:?}", response, delay);
            tokio::time::sleep(delay).await;
            attempt = attempt.saturating_add(1);
        }
    }

    async fn exchange(&mut self, line: &str) -> Result<Response, ClientError> {
        let result = match self.connection.as_mut() {
            Some(connection) => match connection.send_line(line).await {
                Ok(()) => connection.read_line().await,
                Err(e) => Err(e),
            },
            None => return Err(ClientError::NoReachableNode),
        };

        let reply = match result {
            Ok(Some(reply)) => reply,
            Ok(None) => {
                self.connection = None;
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "node closed the connection",
                )
                .into());
            }
            Err(e) => {
                self.connection = None;
                return Err(e.into());
            }
        };

        Response::parse(&reply).map_err(|e| {
            tracing::warn!("Unparseable response '{}': {}", reply, e);
            e.into()
        })
    }

    fn ring(&self, route: Route) -> &RingCache {
        match route {
            Route::Read => &self.read_ring,
            Route::Write => &self.write_ring,
        }
    }

    fn unexpected(&mut self, response: Response) -> ClientError {
        tracing::warn!("Unexpected response: {}", response);
        self.challenge.clear();
        ProtocolError::UnexpectedResponse(response.to_string()).into()
    }
}

fn invalid_input(e: ProtocolError) -> ClientError {
    ClientError::InvalidInput(e.to_string())
}
