use std::{fmt, io::Read};

use http::{Request, Response};
use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing::{info, instrument};

use crate::{
    compare::{SnapshotFormat, compare},
    config::{AbideConfig, RunMode, UPDATE_ENV},
    error::SnapshotError,
    http_message::{self, HttpMessage},
    location::SnapshotLocation,
    record::SnapshotId,
    store::SnapshotStore,
};

static GLOBAL: OnceCell<Abide> = OnceCell::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Matched,
    Created,
    Updated,
}

#[derive(Debug, Error)]
pub enum AssertionError {
    #[error("{}", new_snapshot_message(.id, .value))]
    NewSnapshot { id: String, value: String },
    #[error("{}", did_not_match_message(.id, .diff))]
    Mismatch { id: String, diff: String },
    #[error(transparent)]
    Fatal(#[from] SnapshotError),
}

/// A snapshot-testing context: the store, the user config and the run mode
/// of one test run.
#[derive(Debug)]
pub struct Abide {
    store: SnapshotStore,
    config: AbideConfig,
    mode: RunMode,
}

impl Abide {
    #[must_use]
    pub fn new(store: SnapshotStore, config: AbideConfig, mode: RunMode) -> Self {
        Self {
            store,
            config,
            mode,
        }
    }

    pub fn from_env() -> Result<Self, SnapshotError> {
        let config = AbideConfig::load()?;
        let location =
            SnapshotLocation::from_current_dir()?.with_dir_name(config.snapshots_dir.clone());
        Ok(Self::new(
            SnapshotStore::new(location),
            config,
            RunMode::from_env(),
        ))
    }

    /// The process-wide context, built from the environment on first use.
    pub fn global() -> Result<&'static Self, SnapshotError> {
        GLOBAL.get_or_try_init(Self::from_env)
    }

    #[must_use]
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &AbideConfig {
        &self.config
    }

    #[must_use]
    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn check(&self, id: &str, value: impl fmt::Display) -> Result<Outcome, AssertionError> {
        self.check_value(id, &value.to_string(), SnapshotFormat::Generic)
    }

    pub fn check_reader(&self, id: &str, mut reader: impl Read) -> Result<Outcome, AssertionError> {
        let mut data = String::new();
        reader
            .read_to_string(&mut data)
            .map_err(|error| SnapshotError::Io(format!("failed to read snapshot input: {error}")))?;
        self.check_value(id, &data, SnapshotFormat::Generic)
    }

    pub fn check_http_request_out<B: AsRef<[u8]>>(
        &self,
        id: &str,
        request: &Request<B>,
    ) -> Result<Outcome, AssertionError> {
        let dump = http_message::dump_request_out(request);
        self.check_http(id, &dump, http_message::has_json_body(request.headers()))
    }

    pub fn check_http_request<B: AsRef<[u8]>>(
        &self,
        id: &str,
        request: &Request<B>,
    ) -> Result<Outcome, AssertionError> {
        let dump = http_message::dump_request(request);
        self.check_http(id, &dump, http_message::has_json_body(request.headers()))
    }

    pub fn check_http_response<B: AsRef<[u8]>>(
        &self,
        id: &str,
        response: &Response<B>,
    ) -> Result<Outcome, AssertionError> {
        let dump = http_message::dump_response(response);
        self.check_http(id, &dump, http_message::has_json_body(response.headers()))
    }

    pub fn assert(&self, id: &str, value: impl fmt::Display) {
        fail_on_error(self.check(id, value));
    }

    pub fn assert_reader(&self, id: &str, reader: impl Read) {
        fail_on_error(self.check_reader(id, reader));
    }

    pub fn assert_http_request_out<B: AsRef<[u8]>>(&self, id: &str, request: &Request<B>) {
        fail_on_error(self.check_http_request_out(id, request));
    }

    pub fn assert_http_request<B: AsRef<[u8]>>(&self, id: &str, request: &Request<B>) {
        fail_on_error(self.check_http_request(id, request));
    }

    pub fn assert_http_response<B: AsRef<[u8]>>(&self, id: &str, response: &Response<B>) {
        fail_on_error(self.check_http_response(id, response));
    }

    fn check_http(&self, id: &str, dump: &str, is_json: bool) -> Result<Outcome, AssertionError> {
        let mut message = HttpMessage::parse(dump);
        message.apply_header_defaults(&self.config);

        let format = if is_json {
            message
                .normalize_json_body(&self.config.defaults)
                .map_err(|error| SnapshotError::MalformedJsonBody(error.to_string()))?;
            SnapshotFormat::HttpJson
        } else {
            SnapshotFormat::Generic
        };

        self.check_value(id, &message.dump(), format)
    }

    #[instrument(skip(self, data), fields(id = %id, ?format, update = self.mode.update))]
    fn check_value(
        &self,
        id: &str,
        data: &str,
        format: SnapshotFormat,
    ) -> Result<Outcome, AssertionError> {
        let id = SnapshotId::parse(id)?;
        let data = data.trim();

        let Some(existing) = self.store.evaluate(&id)? else {
            if !self.mode.update {
                return Err(AssertionError::NewSnapshot {
                    id: id.to_string(),
                    value: data.to_string(),
                });
            }

            println!("Creating snapshot `{id}`");
            self.store.create(id, data)?;
            info!("snapshot created");
            return Ok(Outcome::Created);
        };

        let diff = compare(&id, &existing, data, format, &self.config);
        if diff.is_empty() {
            return Ok(Outcome::Matched);
        }

        if self.mode.update {
            println!("Updating snapshot `{id}`");
            self.store.update(id, data)?;
            info!("snapshot updated");
            return Ok(Outcome::Updated);
        }

        Err(AssertionError::Mismatch {
            id: id.to_string(),
            diff,
        })
    }
}

fn fail_on_error(result: Result<Outcome, AssertionError>) {
    if let Err(error) = result {
        panic!("{error}");
    }
}

fn rerun_hint() -> String {
    format!("{UPDATE_ENV}=1 cargo test")
}

fn new_snapshot_message(id: &str, value: &str) -> String {
    format!(
        "\n\n## New snapshot found...\n## \"{id}\"\n\n{value}\n\nTo save, run tests again, $ {}\n",
        rerun_hint()
    )
}

fn did_not_match_message(id: &str, diff: &str) -> String {
    format!(
        "\n\n## Existing snapshot does not match results...\n## \"{id}\"\n\n{diff}\n\n\
         If this change was intentional, run tests again, $ {}\n",
        rerun_hint()
    )
}

fn global_or_fail() -> &'static Abide {
    match Abide::global() {
        Ok(abide) => abide,
        Err(error) => panic!("failed to initialise snapshot context: {error}"),
    }
}

pub fn assert(id: &str, value: impl fmt::Display) {
    global_or_fail().assert(id, value);
}

pub fn assert_reader(id: &str, reader: impl Read) {
    global_or_fail().assert_reader(id, reader);
}

pub fn assert_http_request_out<B: AsRef<[u8]>>(id: &str, request: &Request<B>) {
    global_or_fail().assert_http_request_out(id, request);
}

pub fn assert_http_request<B: AsRef<[u8]>>(id: &str, request: &Request<B>) {
    global_or_fail().assert_http_request(id, request);
}

pub fn assert_http_response<B: AsRef<[u8]>>(id: &str, response: &Response<B>) {
    global_or_fail().assert_http_response(id, response);
}
