//! Storage-backed semaphores for signalling between stages and processes.
//!
//! A semaphore is an object at (bucket, key). Its presence is the signal and
//! its body an optional payload. There is no locking: `clear` is
//! check-then-delete and can race with a concurrent `set` from another
//! process. Callers must tolerate lost or duplicate signals.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{BackendError, RelayError};
use crate::gateway::{Gateway, Mutation};
use crate::io::cloud::Storage;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Semaphore {
    pub bucket: String,
    pub key: String,
    #[serde(default)]
    pub payload: String,
}

impl Semaphore {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            payload: String::new(),
        }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }
}

impl fmt::Display for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

pub struct SemaphoreStore<'a> {
    storage: &'a dyn Storage,
    gateway: Gateway,
    caller: &'a str,
}

impl<'a> SemaphoreStore<'a> {
    /// `caller` tags sentinels produced by writes in simulate mode.
    pub fn new(storage: &'a dyn Storage, gateway: Gateway, caller: &'a str) -> Self {
        Self {
            storage,
            gateway,
            caller,
        }
    }

    /// Write the payload, replacing whatever was there.
    #[instrument(skip(self, semaphore), fields(semaphore = %semaphore))]
    pub fn set(&self, semaphore: &Semaphore) -> Result<Mutation<()>, RelayError> {
        debug!("setting semaphore");
        self.gateway.mutate(self.caller, "put-object", |dry_run| {
            self.storage.put_object(
                &semaphore.bucket,
                &semaphore.key,
                semaphore.payload.as_bytes(),
                dry_run,
            )
        })
    }

    /// Metadata-only lookup. Missing objects and delete markers both read as absent.
    #[instrument(skip(self, semaphore), fields(semaphore = %semaphore))]
    pub fn check(&self, semaphore: &Semaphore) -> Result<bool, RelayError> {
        match self.storage.head_object(&semaphore.bucket, &semaphore.key) {
            Ok(head) if head.delete_marker => {
                debug!("semaphore marked deleted");
                Ok(false)
            }
            Ok(_) => Ok(true),
            Err(BackendError::NotFound { .. }) => {
                debug!("semaphore not found");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Download the payload; `None` when the semaphore is absent.
    ///
    /// Payloads are text. Bytes that are not valid UTF-8 are replaced with
    /// U+FFFD rather than rejected.
    #[instrument(skip(self, semaphore), fields(semaphore = %semaphore))]
    pub fn get(&self, semaphore: &Semaphore) -> Result<Option<String>, RelayError> {
        match self.storage.get_object(&semaphore.bucket, &semaphore.key) {
            Ok(body) => Ok(Some(String::from_utf8_lossy(&body).into_owned())),
            Err(BackendError::NotFound { .. }) => {
                debug!("semaphore not found");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Delete the semaphore if present. Clearing an absent semaphore is a
    /// no-op and returns `Applied(false)`.
    #[instrument(skip(self, semaphore), fields(semaphore = %semaphore))]
    pub fn clear(&self, semaphore: &Semaphore) -> Result<Mutation<bool>, RelayError> {
        if !self.check(semaphore)? {
            debug!("semaphore absent, nothing to clear");
            return Ok(Mutation::Applied(false));
        }
        debug!("semaphore present, deleting");
        let outcome = self.gateway.mutate(self.caller, "delete-object", |dry_run| {
            self.storage
                .delete_object(&semaphore.bucket, &semaphore.key, dry_run)
        })?;
        Ok(outcome.map(|()| true))
    }
}
