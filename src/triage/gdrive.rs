//! Google Drive folder backend.
//!
//! Talks to the Drive REST v3 API with a bearer token supplied by
//! configuration; token acquisition and refresh happen outside this process.
//! When a local mirror directory is configured, reads and writes prefer the
//! mirror and the API is only used for listing and as a last-resort upload,
//! which keeps the pipeline independent of cloud write quota.

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use crate::error::TriageError;
use crate::triage::backend::{Area, FileStamp, LocalDirBackend, NotesBackend};

const API_BASE: &str = "https://www.googleapis.com/drive/v3";
const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
const REQUEST_TIMEOUT_SECS: u64 = 60;
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

pub struct DriveClient {
    folder_id: String,
    token: String,
    // subfolder name -> Drive file id, resolved lazily
    folder_cache: Mutex<HashMap<String, String>>,
}

impl DriveClient {
    pub fn new(folder_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            folder_id: folder_id.into(),
            token: token.into(),
            folder_cache: Mutex::new(HashMap::new()),
        }
    }

    fn http(&self) -> Result<Client> {
        Ok(Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?)
    }

    fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value> {
        let response = self
            .http()?
            .get(url)
            .query(query)
            .bearer_auth(&self.token)
            .send()?;
        if !response.status().is_success() {
            anyhow::bail!("drive call failed with status {}", response.status());
        }
        Ok(response.json()?)
    }

    /// Resolve the Drive id of the folder backing `area`: the configured root
    /// for the inbox, a named subfolder for rollup namespaces.
    fn area_folder_id(&self, area: Area) -> Result<Option<String>> {
        let Some(subdir) = area.subdir() else {
            return Ok(Some(self.folder_id.clone()));
        };

        if let Some(id) = self.folder_cache.lock().expect("folder cache").get(subdir) {
            return Ok(Some(id.clone()));
        }

        let query = format!(
            "'{}' in parents and name = '{}' and mimeType = '{FOLDER_MIME}' and trashed = false",
            self.folder_id, subdir
        );
        let json = self.get_json(
            &format!("{API_BASE}/files"),
            &[("q", query.as_str()), ("fields", "files(id, name)"), ("pageSize", "1")],
        )?;

        let id = json
            .get("files")
            .and_then(Value::as_array)
            .and_then(|files| files.first())
            .and_then(|f| f.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string);

        if let Some(id) = &id {
            self.folder_cache
                .lock()
                .expect("folder cache")
                .insert(subdir.to_string(), id.clone());
        }
        Ok(id)
    }

    fn list_area(&self, area: Area) -> Result<Vec<(String, String, Option<SystemTime>)>> {
        let Some(folder_id) = self.area_folder_id(area)? else {
            return Ok(Vec::new());
        };

        let query = format!("'{folder_id}' in parents and trashed = false");
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params: Vec<(&str, &str)> = vec![
                ("q", query.as_str()),
                ("fields", "nextPageToken, files(id, name, mimeType, modifiedTime)"),
                ("pageSize", "100"),
                ("orderBy", "name desc"),
            ];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }
            let json = self.get_json(&format!("{API_BASE}/files"), &params)?;

            if let Some(files) = json.get("files").and_then(Value::as_array) {
                for file in files {
                    if file.get("mimeType").and_then(Value::as_str) == Some(FOLDER_MIME) {
                        continue;
                    }
                    let Some(name) = file.get("name").and_then(Value::as_str) else {
                        continue;
                    };
                    let Some(id) = file.get("id").and_then(Value::as_str) else {
                        continue;
                    };
                    let mtime = file
                        .get("modifiedTime")
                        .and_then(Value::as_str)
                        .and_then(parse_rfc3339);
                    out.push((name.to_string(), id.to_string(), mtime));
                }
            }

            page_token = json
                .get("nextPageToken")
                .and_then(Value::as_str)
                .map(str::to_string);
            if page_token.is_none() {
                break;
            }
        }
        Ok(out)
    }

    fn find_file(&self, area: Area, name: &str) -> Result<Option<String>> {
        let Some(folder_id) = self.area_folder_id(area)? else {
            return Ok(None);
        };
        let query = format!(
            "'{folder_id}' in parents and name = '{}' and trashed = false",
            name.replace('\'', "\\'")
        );
        let json = self.get_json(
            &format!("{API_BASE}/files"),
            &[("q", query.as_str()), ("fields", "files(id)"), ("pageSize", "1")],
        )?;
        Ok(json
            .get("files")
            .and_then(Value::as_array)
            .and_then(|files| files.first())
            .and_then(|f| f.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        let response = self
            .http()?
            .get(format!("{API_BASE}/files/{file_id}"))
            .query(&[("alt", "media")])
            .bearer_auth(&self.token)
            .send()?;
        if !response.status().is_success() {
            anyhow::bail!("drive download failed with status {}", response.status());
        }
        Ok(response.bytes()?.to_vec())
    }

    /// Upload in two steps (metadata create, then media patch) so the plain
    /// JSON client suffices; overwrites in place when the name already exists.
    fn upload(&self, area: Area, name: &str, bytes: &[u8]) -> Result<()> {
        let file_id = match self.find_file(area, name)? {
            Some(id) => id,
            None => {
                let folder_id = self
                    .area_folder_id(area)?
                    .context("drive subfolder not found for upload")?;
                let payload = serde_json::json!({
                    "name": name,
                    "parents": [folder_id],
                    "mimeType": "text/plain",
                });
                let response = self
                    .http()?
                    .post(format!("{API_BASE}/files"))
                    .bearer_auth(&self.token)
                    .json(&payload)
                    .send()?;
                if !response.status().is_success() {
                    anyhow::bail!("drive create failed with status {}", response.status());
                }
                let json: Value = response.json()?;
                json.get("id")
                    .and_then(Value::as_str)
                    .context("drive create response missing id")?
                    .to_string()
            }
        };

        let response = self
            .http()?
            .patch(format!("{UPLOAD_BASE}/files/{file_id}"))
            .query(&[("uploadType", "media")])
            .bearer_auth(&self.token)
            .body(bytes.to_vec())
            .send()?;
        if !response.status().is_success() {
            anyhow::bail!("drive upload failed with status {}", response.status());
        }
        Ok(())
    }
}

fn parse_rfc3339(raw: &str) -> Option<SystemTime> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(SystemTime::from)
}

pub struct DriveBackend {
    id: String,
    client: DriveClient,
    mirror: Option<LocalDirBackend>,
}

impl DriveBackend {
    pub fn new(
        id: impl Into<String>,
        folder_id: impl Into<String>,
        token: impl Into<String>,
        mirror: Option<PathBuf>,
    ) -> Self {
        let id = id.into();
        let mirror = mirror.map(|path| LocalDirBackend::new(format!("{id}-mirror"), path));
        Self {
            id,
            client: DriveClient::new(folder_id, token),
            mirror,
        }
    }

    fn unavailable(&self, reason: impl Into<String>) -> TriageError {
        TriageError::BackendUnavailable {
            root: self.id.clone(),
            reason: reason.into(),
        }
    }
}

impl NotesBackend for DriveBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_available(&self) -> bool {
        if let Some(mirror) = &self.mirror {
            return mirror.is_available();
        }
        self.client.area_folder_id(Area::Inbox).is_ok()
    }

    fn list(&self, area: Area) -> Result<Vec<FileStamp>> {
        let files = self
            .client
            .list_area(area)
            .map_err(|err| self.unavailable(err.to_string()))?;
        Ok(files
            .into_iter()
            .map(|(name, _id, mtime)| FileStamp { name, mtime })
            .collect())
    }

    fn exists(&self, area: Area, name: &str) -> Result<bool> {
        if let Some(mirror) = &self.mirror
            && mirror.exists(area, name)?
        {
            return Ok(true);
        }
        self.client
            .find_file(area, name)
            .map(|id| id.is_some())
            .map_err(|err| self.unavailable(err.to_string()).into())
    }

    fn read_text(&self, area: Area, name: &str) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.read_bytes(area, name)?).into_owned())
    }

    fn read_bytes(&self, area: Area, name: &str) -> Result<Vec<u8>> {
        if let Some(mirror) = &self.mirror
            && mirror.exists(area, name)?
        {
            return mirror.read_bytes(area, name);
        }
        let file_id = self
            .client
            .find_file(area, name)
            .map_err(|err| self.unavailable(err.to_string()))?
            .ok_or_else(|| self.unavailable(format!("file not found: {name}")))?;
        self.client
            .download(&file_id)
            .map_err(|err| self.unavailable(err.to_string()).into())
    }

    fn write_text(&self, area: Area, name: &str, content: &str) -> Result<()> {
        self.write_bytes(area, name, content.as_bytes())
    }

    fn write_bytes(&self, area: Area, name: &str, bytes: &[u8]) -> Result<()> {
        if let Some(mirror) = &self.mirror {
            return mirror.write_bytes(area, name, bytes);
        }
        self.client
            .upload(area, name, bytes)
            .map_err(|err| self.unavailable(err.to_string()).into())
    }

    fn mtime(&self, area: Area, name: &str) -> Result<Option<SystemTime>> {
        if let Some(mirror) = &self.mirror
            && let Some(stamp) = mirror.mtime(area, name)?
        {
            return Ok(Some(stamp));
        }
        let files = self
            .client
            .list_area(area)
            .map_err(|err| self.unavailable(err.to_string()))?;
        Ok(files
            .into_iter()
            .find(|(n, _, _)| n == name)
            .and_then(|(_, _, mtime)| mtime))
    }
}
