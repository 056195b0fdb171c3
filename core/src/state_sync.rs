//! Local state mirrored into a URL query parameter.
//!
//! # Design
//! `StateSync` reads its parameter from the address exactly once, when it is
//! created, and from then on only writes. External changes to the address
//! are never pulled back into the state. The address is reached through a
//! `QueryParameterStore` handle so the same protocol works against a real
//! page address or an in-memory one.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;
use url::Url;

use crate::error::DecodeError;

/// Named query parameters of an address.
pub trait QueryParameterStore {
    fn get(&self, name: &str) -> Option<String>;
    /// Set `name` to `value`, replacing every existing occurrence.
    fn set(&self, name: &str, value: &str);
    /// Remove every occurrence of `name`.
    fn delete(&self, name: &str);
}

impl<S: QueryParameterStore + ?Sized> QueryParameterStore for &S {
    fn get(&self, name: &str) -> Option<String> {
        (**self).get(name)
    }

    fn set(&self, name: &str, value: &str) {
        (**self).set(name, value)
    }

    fn delete(&self, name: &str) {
        (**self).delete(name)
    }
}

impl<S: QueryParameterStore + ?Sized> QueryParameterStore for Arc<S> {
    fn get(&self, name: &str) -> Option<String> {
        (**self).get(name)
    }

    fn set(&self, name: &str, value: &str) {
        (**self).set(name, value)
    }

    fn delete(&self, name: &str) {
        (**self).delete(name)
    }
}

/// Query parameters of a `Url`, shared between any number of `StateSync`s.
///
/// Unrelated parameters keep their order. Setting a name that occurs several
/// times overwrites the first occurrence and drops the rest.
#[derive(Debug)]
pub struct UrlQueryStore {
    url: Mutex<Url>,
}

impl UrlQueryStore {
    pub fn new(url: Url) -> Self {
        Self {
            url: Mutex::new(url),
        }
    }

    pub fn parse(url: &str) -> Result<Self, url::ParseError> {
        Url::parse(url).map(Self::new)
    }

    /// Current address.
    pub fn url(&self) -> Url {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Url> {
        self.url.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rewrite<F>(&self, edit: F)
    where
        F: FnOnce(&mut Vec<(String, String)>),
    {
        let mut url = self.lock();
        let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        edit(&mut pairs);
        if pairs.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(pairs);
        }
    }
}

impl QueryParameterStore for UrlQueryStore {
    fn get(&self, name: &str) -> Option<String> {
        self.lock()
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    fn set(&self, name: &str, value: &str) {
        self.rewrite(|pairs| {
            let mut seen = false;
            pairs.retain_mut(|(k, v)| {
                if k != name {
                    return true;
                }
                if seen {
                    return false;
                }
                seen = true;
                *v = value.to_string();
                true
            });
            if !seen {
                pairs.push((name.to_string(), value.to_string()));
            }
        });
    }

    fn delete(&self, name: &str) {
        self.rewrite(|pairs| pairs.retain(|(k, _)| k != name));
    }
}

type EncodeFn<V> = dyn Fn(&V) -> Option<String> + Send + Sync;

/// A value bound to one query parameter.
pub struct StateSync<V, S> {
    value: V,
    name: String,
    encode: Box<EncodeFn<V>>,
    store: S,
}

impl<V, S: QueryParameterStore> StateSync<V, S> {
    /// Read `name` from `store`, then write the resulting state back.
    ///
    /// An absent parameter leaves the state at `default`. A present parameter
    /// that `decode` rejects fails the whole initialization; nothing is
    /// written to the store in that case.
    pub fn init<D, E>(
        default: V,
        name: impl Into<String>,
        decode: D,
        encode: E,
        store: S,
    ) -> Result<Self, DecodeError>
    where
        D: FnOnce(&str) -> Option<V>,
        E: Fn(&V) -> Option<String> + Send + Sync + 'static,
    {
        let name = name.into();
        let value = match store.get(&name) {
            None => default,
            Some(raw) => match decode(&raw) {
                Some(value) => value,
                None => return Err(DecodeError { name, raw }),
            },
        };
        let sync = Self {
            value,
            name,
            encode: Box::new(encode),
            store,
        };
        sync.write_back();
        Ok(sync)
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Replace the state and mirror it to the address.
    pub fn set(&mut self, value: V) {
        self.value = value;
        self.write_back();
    }

    fn write_back(&self) {
        match (self.encode)(&self.value) {
            Some(encoded) => {
                trace!(name = %self.name, value = %encoded, "writing query parameter");
                self.store.set(&self.name, &encoded);
            }
            None => {
                trace!(name = %self.name, "removing query parameter");
                self.store.delete(&self.name);
            }
        }
    }
}

impl<V: fmt::Debug, S> fmt::Debug for StateSync<V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSync")
            .field("name", &self.name)
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}
