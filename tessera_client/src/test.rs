#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use tessera_clock::{Clock, UnixTime};
use url::Url;

use crate::{
    error::ServiceError,
    http::{HttpExchange, HttpResponse},
};

/// A transport stub that answers every request with a fixed response and
/// records what it was asked.
#[derive(Debug)]
pub(crate) struct StubExchange {
    status: u16,
    body: String,
    gets: AtomicUsize,
    posts: AtomicUsize,
    last_get: Mutex<Option<(Url, Vec<(String, String)>)>>,
    last_post: Mutex<Option<(Url, Vec<(String, String)>, BTreeMap<String, String>)>>,
}

impl StubExchange {
    pub(crate) fn answering(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            gets: AtomicUsize::new(0),
            posts: AtomicUsize::new(0),
            last_get: Mutex::new(None),
            last_post: Mutex::new(None),
        }
    }

    pub(crate) fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub(crate) fn posts(&self) -> usize {
        self.posts.load(Ordering::SeqCst)
    }

    pub(crate) fn last_get(&self) -> Option<(Url, Vec<(String, String)>)> {
        self.last_get.lock().unwrap().clone()
    }

    pub(crate) fn last_post(
        &self,
    ) -> Option<(Url, Vec<(String, String)>, BTreeMap<String, String>)> {
        self.last_post.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpExchange for StubExchange {
    async fn get(
        &self,
        url: &Url,
        headers: &[(String, String)],
    ) -> Result<HttpResponse, ServiceError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        *self.last_get.lock().unwrap() = Some((url.clone(), headers.to_vec()));
        Ok(HttpResponse {
            status: self.status,
            body: self.body.clone(),
        })
    }

    async fn post_form(
        &self,
        url: &Url,
        headers: &[(String, String)],
        params: &BTreeMap<String, String>,
    ) -> Result<HttpResponse, ServiceError> {
        self.posts.fetch_add(1, Ordering::SeqCst);
        *self.last_post.lock().unwrap() = Some((url.clone(), headers.to_vec(), params.clone()));
        Ok(HttpResponse {
            status: self.status,
            body: self.body.clone(),
        })
    }
}

/// A clock that can be advanced from outside the service under test
#[derive(Clone, Debug, Default)]
pub(crate) struct SharedClock(Arc<AtomicU64>);

impl SharedClock {
    pub(crate) fn set(&self, secs: u64) {
        self.0.store(secs, Ordering::SeqCst);
    }
}

impl Clock for SharedClock {
    fn now(&self) -> UnixTime {
        UnixTime(self.0.load(Ordering::SeqCst))
    }
}
