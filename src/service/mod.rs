//! Async request dispatcher
//!
//! Accepts serde-tagged [`Request`] values, runs each one on a blocking
//! worker against a shared [`FileManager`] and answers with a [`Response`]
//! carrying a status, a machine code and a JSON payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use crate::archive::CompressFormat;
use crate::error::FsError;
use crate::listing::{SortKey, SortOrder};
use crate::manager::FileManager;
use crate::ops::{BatchOutcome, BatchStatus};

fn root_dir() -> String {
    "/".to_string()
}

fn default_format() -> String {
    "zip".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    List {
        #[serde(default = "root_dir")]
        dir: String,
        #[serde(default)]
        sort: Option<String>,
        #[serde(default)]
        order: Option<String>,
    },
    Tree,
    Search {
        #[serde(default = "root_dir")]
        dir: String,
        query: String,
    },
    CreateDirectory {
        dir: String,
        name: String,
    },
    CreateFile {
        dir: String,
        name: String,
        #[serde(default)]
        content: String,
    },
    Rename {
        dir: String,
        old_name: String,
        new_name: String,
    },
    Trash {
        dir: String,
        names: Vec<String>,
    },
    DeletePermanent {
        dir: String,
        names: Vec<String>,
    },
    Restore {
        dir: String,
        names: Vec<String>,
    },
    Copy {
        dir: String,
        names: Vec<String>,
        destination: String,
    },
    Move {
        dir: String,
        names: Vec<String>,
        destination: String,
    },
    ChangePermissions {
        path: String,
        mode: String,
    },
    Compress {
        dir: String,
        names: Vec<String>,
        #[serde(default)]
        archive_name: String,
        #[serde(default = "default_format")]
        format: String,
    },
    Extract {
        archive: String,
        #[serde(default)]
        destination: Option<String>,
    },
    ReadFile {
        dir: String,
        name: String,
    },
    SaveFile {
        dir: String,
        name: String,
        content: String,
    },
    EmptyTrash,
    ListTrash,
}

impl Request {
    pub fn action(&self) -> &'static str {
        match self {
            Self::List { .. } => "list",
            Self::Tree => "tree",
            Self::Search { .. } => "search",
            Self::CreateDirectory { .. } => "create_directory",
            Self::CreateFile { .. } => "create_file",
            Self::Rename { .. } => "rename",
            Self::Trash { .. } => "trash",
            Self::DeletePermanent { .. } => "delete_permanent",
            Self::Restore { .. } => "restore",
            Self::Copy { .. } => "copy",
            Self::Move { .. } => "move",
            Self::ChangePermissions { .. } => "change_permissions",
            Self::Compress { .. } => "compress",
            Self::Extract { .. } => "extract",
            Self::ReadFile { .. } => "read_file",
            Self::SaveFile { .. } => "save_file",
            Self::EmptyTrash => "empty_trash",
            Self::ListTrash => "list_trash",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Partial,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl Response {
    pub fn ok(message: impl Into<String>, data: impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self {
                id: String::new(),
                status: Status::Ok,
                code: None,
                message: message.into(),
                data,
            },
            Err(err) => Self::internal(format!("failed to encode response: {}", err)),
        }
    }

    pub fn from_error(err: &FsError) -> Self {
        Self {
            id: String::new(),
            status: Status::Error,
            code: Some(err.code().to_string()),
            message: err.to_string(),
            data: Value::Null,
        }
    }

    /// Batch result: `ok` when every item succeeded, `partial` when some
    /// did, `error` when none did. Per-item detail is always in `data`.
    pub fn from_batch(verb: &str, batch: &BatchOutcome) -> Self {
        let mut response = Self::ok(batch.summary(verb), batch);
        match batch.status() {
            BatchStatus::Empty | BatchStatus::AllSucceeded => {}
            BatchStatus::Partial => {
                response.status = Status::Partial;
                response.code = batch.to_error().map(|err| err.code().to_string());
            }
            BatchStatus::AllFailed => {
                response.status = Status::Error;
                response.code = Some(Self::all_failed_code(batch));
            }
        }
        response
    }

    /// The shared item code when every failure agrees, else `PARTIAL_FAILURE`.
    fn all_failed_code(batch: &BatchOutcome) -> String {
        let mut codes = batch
            .items
            .iter()
            .filter_map(|item| item.error.as_ref().map(|error| error.code));
        match codes.next() {
            Some(first) if codes.all(|code| code == first) => first.to_string(),
            _ => "PARTIAL_FAILURE".to_string(),
        }
    }

    fn internal(message: String) -> Self {
        Self {
            id: String::new(),
            status: Status::Error,
            code: Some("INTERNAL_ERROR".to_string()),
            message,
            data: Value::Null,
        }
    }

    fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }
}

/// Snapshot of dispatcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    pub requests_received: u64,
    pub requests_succeeded: u64,
    pub requests_partial: u64,
    pub requests_failed: u64,
    pub requests_timed_out: u64,
}

#[derive(Default)]
struct StatsInner {
    requests_received: AtomicU64,
    requests_succeeded: AtomicU64,
    requests_partial: AtomicU64,
    requests_failed: AtomicU64,
    requests_timed_out: AtomicU64,
}

/// Runs requests against one root. Cheap to clone; clones share the
/// manager and the counters.
#[derive(Clone)]
pub struct Dispatcher {
    manager: Arc<FileManager>,
    timeout: Option<Duration>,
    stats: Arc<StatsInner>,
}

impl Dispatcher {
    pub fn new(manager: FileManager) -> Self {
        let timeout = manager
            .config()
            .request_timeout_secs
            .map(Duration::from_secs);
        Self {
            manager: Arc::new(manager),
            timeout,
            stats: Arc::new(StatsInner::default()),
        }
    }

    pub fn manager(&self) -> &FileManager {
        &self.manager
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            requests_received: self.stats.requests_received.load(Ordering::Relaxed),
            requests_succeeded: self.stats.requests_succeeded.load(Ordering::Relaxed),
            requests_partial: self.stats.requests_partial.load(Ordering::Relaxed),
            requests_failed: self.stats.requests_failed.load(Ordering::Relaxed),
            requests_timed_out: self.stats.requests_timed_out.load(Ordering::Relaxed),
        }
    }

    /// Parse one JSON request and dispatch it. Malformed input becomes an
    /// `INVALID_INPUT` response rather than an error.
    pub async fn dispatch_json(&self, raw: &str) -> Response {
        match serde_json::from_str::<Request>(raw) {
            Ok(request) => self.dispatch(request).await,
            Err(err) => {
                self.stats.requests_received.fetch_add(1, Ordering::Relaxed);
                self.stats.requests_failed.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "rejected malformed request");
                Response::from_error(&FsError::invalid_input(format!("malformed request: {}", err)))
                    .with_id(&Uuid::new_v4().to_string())
            }
        }
    }

    /// Run `request` on a blocking worker. With a timeout configured, a
    /// request that overruns reports `TIMED_OUT` while its work is left to
    /// finish in the background.
    pub async fn dispatch(&self, request: Request) -> Response {
        let id = Uuid::new_v4().to_string();
        let span = info_span!("request", id = %id, action = request.action());
        self.stats.requests_received.fetch_add(1, Ordering::Relaxed);

        async {
            let manager = Arc::clone(&self.manager);
            let worker_span = Span::current();
            let handle = tokio::task::spawn_blocking(move || {
                worker_span.in_scope(|| execute(&manager, request))
            });

            let joined = match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, handle).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        self.stats.requests_timed_out.fetch_add(1, Ordering::Relaxed);
                        warn!(timeout_secs = limit.as_secs(), "request timed out");
                        return Response::from_error(&FsError::TimedOut(limit.as_secs()))
                            .with_id(&id);
                    }
                },
                None => handle.await,
            };

            let response = match joined {
                Ok(response) => response,
                Err(err) => {
                    error!(error = %err, "request worker failed");
                    Response::internal(format!("request worker failed: {}", err))
                }
            };
            self.record(response.status);
            info!(status = ?response.status, code = ?response.code, "request finished");
            response.with_id(&id)
        }
        .instrument(span)
        .await
    }

    fn record(&self, status: Status) {
        let counter = match status {
            Status::Ok => &self.stats.requests_succeeded,
            Status::Partial => &self.stats.requests_partial,
            Status::Error => &self.stats.requests_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

fn respond<T: Serialize>(result: crate::error::Result<T>, message: &str) -> Response {
    match result {
        Ok(data) => Response::ok(message, data),
        Err(err) => Response::from_error(&err),
    }
}

fn execute(manager: &FileManager, request: Request) -> Response {
    match request {
        Request::List { dir, sort, order } => {
            let options = sort
                .as_deref()
                .map(str::parse::<SortKey>)
                .transpose()
                .and_then(|sort| {
                    let order = order.as_deref().map(str::parse::<SortOrder>).transpose()?;
                    Ok((sort.unwrap_or_default(), order.unwrap_or_default()))
                });
            match options {
                Ok((sort, order)) => respond(manager.list(&dir, sort, order), "Listed directory"),
                Err(err) => Response::from_error(&err),
            }
        }
        Request::Tree => respond(manager.tree(), "Built directory tree"),
        Request::Search { dir, query } => respond(manager.search(&dir, &query), "Search complete"),
        Request::CreateDirectory { dir, name } => {
            respond(manager.create_directory(&dir, &name), "Directory created")
        }
        Request::CreateFile { dir, name, content } => {
            respond(manager.create_file(&dir, &name, &content), "File created")
        }
        Request::Rename {
            dir,
            old_name,
            new_name,
        } => respond(manager.rename(&dir, &old_name, &new_name), "Renamed"),
        Request::Trash { dir, names } => {
            Response::from_batch("Moved to trash", &manager.trash(&dir, &names))
        }
        Request::DeletePermanent { dir, names } => {
            Response::from_batch("Deleted", &manager.delete_permanent(&dir, &names))
        }
        Request::Restore { dir, names } => {
            Response::from_batch("Restored", &manager.restore(&dir, &names))
        }
        Request::Copy {
            dir,
            names,
            destination,
        } => Response::from_batch("Copied", &manager.copy(&dir, &names, &destination)),
        Request::Move {
            dir,
            names,
            destination,
        } => Response::from_batch("Moved", &manager.move_items(&dir, &names, &destination)),
        Request::ChangePermissions { path, mode } => respond(
            manager
                .change_permissions(&path, &mode)
                .map(|mode| format!("{:o}", mode)),
            "Permissions changed",
        ),
        Request::Compress {
            dir,
            names,
            archive_name,
            format,
        } => {
            let result = format
                .parse::<CompressFormat>()
                .and_then(|format| manager.compress(&dir, &names, &archive_name, format));
            respond(result, "Archive created")
        }
        Request::Extract {
            archive,
            destination,
        } => respond(
            manager.extract(&archive, destination.as_deref()),
            "Archive extracted",
        ),
        Request::ReadFile { dir, name } => respond(manager.read_file(&dir, &name), "File read"),
        Request::SaveFile { dir, name, content } => {
            respond(manager.save_file(&dir, &name, &content), "File saved")
        }
        Request::EmptyTrash => match manager.empty_trash() {
            Ok(batch) => Response::from_batch("Deleted", &batch),
            Err(err) => Response::from_error(&err),
        },
        Request::ListTrash => respond(manager.list_trash(), "Listed trash"),
    }
}
