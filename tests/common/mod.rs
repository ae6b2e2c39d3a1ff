//! Fake collaborators shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use artifact_fetch_lib::downloads::{
    ProgressObserver, RepoRef, SnapshotClient, TransferBody, Transport,
};
use artifact_fetch_lib::FetchError;

pub enum FakeResponse {
    /// Whole body delivered as a single chunk
    Body(Vec<u8>),
    /// Non-success status on the handshake
    Status(u16),
    /// `chunks` chunks of `chunk_len` bytes, generated lazily, with a
    /// declared length that may differ from what is sent
    Synthetic {
        declared: u64,
        chunks: usize,
        chunk_len: usize,
    },
    /// Sends the prefix, then the connection drops
    DropAfter(Vec<u8>),
}

/// Transport serving canned responses and recording every request
#[derive(Default)]
pub struct FakeTransport {
    responses: HashMap<String, FakeResponse>,
    calls: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, response: FakeResponse) -> Self {
        self.responses.insert(url.to_string(), response);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(&self, url: &str) -> Result<TransferBody, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());

        match self.responses.get(url) {
            None => Err(FetchError::transfer(url, "connection refused")),
            Some(FakeResponse::Status(code)) => {
                Err(FetchError::transfer(url, format!("HTTP {}", code)))
            }
            Some(FakeResponse::Body(body)) => Ok(TransferBody {
                total: Some(body.len() as u64),
                stream: stream::iter(vec![Ok(Bytes::from(body.clone()))]).boxed(),
            }),
            Some(FakeResponse::Synthetic {
                declared,
                chunks,
                chunk_len,
            }) => {
                let chunk_len = *chunk_len;
                Ok(TransferBody {
                    total: Some(*declared),
                    stream: stream::iter(0..*chunks)
                        .map(move |_| Ok(Bytes::from(vec![7u8; chunk_len])))
                        .boxed(),
                })
            }
            Some(FakeResponse::DropAfter(prefix)) => {
                let locator = url.to_string();
                Ok(TransferBody {
                    total: Some(prefix.len() as u64 * 4),
                    stream: stream::iter(vec![
                        Ok(Bytes::from(prefix.clone())),
                        Err(FetchError::transfer(locator, "connection reset")),
                    ])
                    .boxed(),
                })
            }
        }
    }
}

/// Snapshot client that writes a single `config.json`, or fails
#[derive(Default)]
pub struct FakeSnapshots {
    fail_with_permission: bool,
    calls: Mutex<Vec<(String, PathBuf)>>,
}

impl FakeSnapshots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_with_permission: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(String, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SnapshotClient for FakeSnapshots {
    async fn materialize(
        &self,
        repo: &RepoRef,
        dest: &Path,
        _observer: &dyn ProgressObserver,
    ) -> Result<(), FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((repo.repo_id.clone(), dest.to_path_buf()));

        if self.fail_with_permission {
            return Err(FetchError::Permission {
                path: dest.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            });
        }

        std::fs::create_dir_all(dest).unwrap();
        std::fs::write(dest.join("config.json"), br#"{"model_type":"flux"}"#).unwrap();
        Ok(())
    }
}
