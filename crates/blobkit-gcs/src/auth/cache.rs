//! Single-flight token cache

use std::sync::Arc;

use async_trait::async_trait;
use blobkit_core::utils::Clock;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::debug;

use super::{expiry_after, AccessToken, AccessTokenManager, TokenSource};
use crate::error::ExchangeError;

type SharedFetch = Shared<BoxFuture<'static, Result<AccessToken, Arc<ExchangeError>>>>;

enum Slot {
    Empty,
    Pending { generation: u64, fetch: SharedFetch },
    Cached { token: AccessToken, valid_until: DateTime<Utc> },
}

struct CacheState {
    slot: Slot,
    generation: u64,
}

enum Lookup {
    Cached(AccessToken),
    Pending(u64, SharedFetch),
}

/// Token manager that caches the token of a [`TokenSource`].
///
/// While no valid token is cached, all callers await the same fetch. A
/// successful fetch is cached until `expires_in` has elapsed on the manager's
/// clock; a failed fetch is handed to everyone waiting on it and then
/// forgotten, so the next caller starts a new fetch.
pub struct CachingTokenManager<S> {
    source: Arc<S>,
    clock: Arc<dyn Clock>,
    state: Mutex<CacheState>,
}

impl<S: TokenSource> CachingTokenManager<S> {
    pub fn new(source: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            source: Arc::new(source),
            clock,
            state: Mutex::new(CacheState {
                slot: Slot::Empty,
                generation: 0,
            }),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn lookup(&self) -> Lookup {
        let mut state = self.state.lock();
        match &state.slot {
            Slot::Cached { token, valid_until } if self.clock.now() < *valid_until => {
                return Lookup::Cached(token.clone());
            },
            Slot::Pending { generation, fetch } => return Lookup::Pending(*generation, fetch.clone()),
            _ => {},
        }

        state.generation += 1;
        let generation = state.generation;
        let source = Arc::clone(&self.source);
        let fetch = async move { source.fetch_token().await.map_err(Arc::new) }
            .boxed()
            .shared();
        debug!(generation, "Fetching access token");
        state.slot = Slot::Pending {
            generation,
            fetch: fetch.clone(),
        };
        Lookup::Pending(generation, fetch)
    }

    fn settle(&self, generation: u64, result: &Result<AccessToken, Arc<ExchangeError>>) {
        let mut state = self.state.lock();
        let current = matches!(&state.slot, Slot::Pending { generation: g, .. } if *g == generation);
        if !current {
            return;
        }
        state.slot = match result {
            Ok(token) => Slot::Cached {
                token: token.clone(),
                valid_until: expiry_after(self.clock.now(), token.expires_in()),
            },
            Err(_) => Slot::Empty,
        };
    }
}

#[async_trait]
impl<S: TokenSource> AccessTokenManager for CachingTokenManager<S> {
    async fn access_token(&self) -> Result<AccessToken, ExchangeError> {
        let (generation, fetch) = match self.lookup() {
            Lookup::Cached(token) => return Ok(token),
            Lookup::Pending(generation, fetch) => (generation, fetch),
        };

        let result = fetch.await;
        self.settle(generation, &result);
        result.map_err(ExchangeError::Authorization)
    }
}
