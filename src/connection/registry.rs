//! Connection Registry
//!
//! Maps poll tokens to [`ConnectionRecord`]s. The registry is owned by the
//! event loop and is the only place client sockets live.
//!
//! ## Token Layout
//!
//! ```text
//!   0            1            2, 3, 4, ...
//!   LISTENER     WAKER        clients (allocated monotonically)
//! ```
//!
//! The two reserved tokens can never be inserted, so the listening socket
//! never appears among the clients.

use crate::connection::ConnectionRecord;
use mio::Token;
use std::collections::HashMap;
use std::time::{Duration, SystemTime};
use thiserror::Error;

/// Token of the listening socket.
pub const LISTENER_TOKEN: Token = Token(0);

/// Token of the shutdown waker.
pub const WAKER_TOKEN: Token = Token(1);

/// First token handed out to a client.
const FIRST_CLIENT_TOKEN: usize = 2;

/// Errors returned when inserting into the registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A record with this token is already registered
    #[error("duplicate connection handle {0:?}")]
    DuplicateHandle(Token),

    /// The token belongs to the listener or the waker
    #[error("reserved handle {0:?} cannot hold a client")]
    ReservedHandle(Token),
}

/// The set of live client connections, keyed by token.
#[derive(Debug)]
pub struct ConnectionRegistry<S> {
    connections: HashMap<Token, ConnectionRecord<S>>,
    next_token: usize,
}

impl<S> Default for ConnectionRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> ConnectionRegistry<S> {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
            next_token: FIRST_CLIENT_TOKEN,
        }
    }

    /// Hands out a client token that is not currently in use.
    pub fn allocate_token(&mut self) -> Token {
        loop {
            let token = Token(self.next_token);
            self.next_token = self.next_token.wrapping_add(1).max(FIRST_CLIENT_TOKEN);
            if !self.connections.contains_key(&token) {
                return token;
            }
        }
    }

    /// Inserts a record under its own token.
    ///
    /// Rejects reserved tokens and tokens already present. A rejected record
    /// is dropped, which closes its socket.
    pub fn insert(&mut self, record: ConnectionRecord<S>) -> Result<Token, RegistryError> {
        let token = record.token();
        if is_reserved(token) {
            return Err(RegistryError::ReservedHandle(token));
        }
        if self.connections.contains_key(&token) {
            return Err(RegistryError::DuplicateHandle(token));
        }
        self.connections.insert(token, record);
        Ok(token)
    }

    pub fn get(&self, token: Token) -> Option<&ConnectionRecord<S>> {
        self.connections.get(&token)
    }

    pub fn get_mut(&mut self, token: Token) -> Option<&mut ConnectionRecord<S>> {
        self.connections.get_mut(&token)
    }

    pub fn contains(&self, token: Token) -> bool {
        self.connections.contains_key(&token)
    }

    /// Takes a record out of the registry. The caller becomes responsible
    /// for closing it.
    pub fn remove(&mut self, token: Token) -> Option<ConnectionRecord<S>> {
        self.connections.remove(&token)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// All registered tokens, in no particular order.
    pub fn tokens(&self) -> Vec<Token> {
        self.connections.keys().copied().collect()
    }

    /// Tokens whose time since accept is at least `timeout` at `now`.
    ///
    /// Activity on the connection does not matter; only `connected_at`.
    pub fn idle_tokens(&self, now: SystemTime, timeout: Duration) -> Vec<Token> {
        self.connections
            .values()
            .filter(|record| record.elapsed(now) >= timeout)
            .map(ConnectionRecord::token)
            .collect()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ConnectionRecord<S>> {
        self.connections.values_mut()
    }

    /// Removes every record, leaving the registry empty.
    pub fn drain(&mut self) -> Vec<ConnectionRecord<S>> {
        self.connections.drain().map(|(_, record)| record).collect()
    }
}

fn is_reserved(token: Token) -> bool {
    token == LISTENER_TOKEN || token == WAKER_TOKEN
}
