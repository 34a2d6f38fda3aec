//! Minimal Hugging Face Hub client for dataset repositories.
//!
//! Uploads go through the commit API: small files are inlined into the
//! NDJSON commit payload, files the Hub wants in LFS are pushed through the
//! Git LFS batch API first and referenced by their sha256.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use indicatif::ProgressBar;
use log::{debug, info};
use reqwest::blocking::{Body, Client, Response};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::error::{PunktError, Result};

pub const HUB_ENDPOINT: &str = "https://huggingface.co";
pub const TOKEN_ENV_VARS: [&str; 2] = ["HF_TOKEN", "HUGGING_FACE_HUB_TOKEN"];

const SAMPLE_BYTES: usize = 512;
const REVISION: &str = "main";
const LFS_CONTENT_TYPE: &str = "application/vnd.git-lfs+json";

/// First non-empty token from [`TOKEN_ENV_VARS`].
pub fn token_from_env() -> Result<String> {
    TOKEN_ENV_VARS
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|t| !t.trim().is_empty()))
        .ok_or_else(|| PunktError::MissingEnv(TOKEN_ENV_VARS.join(" or ")))
}

pub fn validate_repo_id(repo_id: &str) -> Result<()> {
    let valid = match repo_id.split_once('/') {
        Some((owner, name)) => {
            let part_ok = |s: &str| {
                !s.is_empty()
                    && s.chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            };
            part_ok(owner) && part_ok(name)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(PunktError::InvalidConfig(format!(
            "repo id must look like owner/name, got {repo_id:?}"
        )))
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    Regular,
    Lfs,
}

/// A file of the folder being uploaded.
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub local_path: PathBuf,
    pub path_in_repo: String,
    pub size: u64,
    pub sha256: String,
    sample: Vec<u8>,
}

impl LocalFile {
    pub fn read(local_path: &Path, path_in_repo: &str) -> Result<Self> {
        let io_err = |e| PunktError::io(e, Some(local_path.to_path_buf()));
        let mut reader = BufReader::new(File::open(local_path).map_err(io_err)?);

        let mut hasher = Sha256::new();
        let mut sample = Vec::with_capacity(SAMPLE_BYTES);
        let mut size = 0u64;
        let mut buffer = vec![0; 1 << 16];
        loop {
            let n = reader.read(&mut buffer).map_err(io_err)?;
            if n == 0 {
                break;
            }
            let chunk = &buffer[..n];
            hasher.update(chunk);
            if sample.len() < SAMPLE_BYTES {
                let take = (SAMPLE_BYTES - sample.len()).min(n);
                sample.extend_from_slice(&chunk[..take]);
            }
            size += n as u64;
        }

        Ok(Self {
            local_path: local_path.to_path_buf(),
            path_in_repo: path_in_repo.to_string(),
            size,
            sha256: format!("{:x}", hasher.finalize()),
            sample,
        })
    }
}

/// The regular files directly inside `folder`, sorted by name.
pub fn folder_files(folder: &Path) -> Result<Vec<LocalFile>> {
    let io_err = |e| PunktError::io(e, Some(folder.to_path_buf()));
    let mut files = Vec::new();
    for entry in std::fs::read_dir(folder).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if !entry.file_type().map_err(io_err)?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        files.push(LocalFile::read(&entry.path(), &name)?);
    }
    files.sort_by(|a, b| a.path_in_repo.cmp(&b.path_in_repo));
    Ok(files)
}

/// Body of a preupload request.
pub fn preupload_payload(files: &[LocalFile]) -> Value {
    let files: Vec<Value> = files
        .iter()
        .map(|f| {
            json!({
                "path": f.path_in_repo,
                "sample": BASE64.encode(&f.sample),
                "size": f.size,
            })
        })
        .collect();
    json!({ "files": files })
}

/// The NDJSON commit body: a header line and one line per file.
pub fn commit_payload(
    message: &str,
    files: &[LocalFile],
    modes: &HashMap<String, UploadMode>,
) -> Result<String> {
    let mut lines = vec![json!({
        "key": "header",
        "value": { "summary": message, "description": "" },
    })];

    for file in files {
        let line = match modes.get(&file.path_in_repo) {
            Some(UploadMode::Lfs) => json!({
                "key": "lfsFile",
                "value": { "path": file.path_in_repo, "algo": "sha256", "oid": file.sha256 },
            }),
            _ => {
                let content = std::fs::read(&file.local_path)
                    .map_err(|e| PunktError::io(e, Some(file.local_path.clone())))?;
                json!({
                    "key": "file",
                    "value": { "content": BASE64.encode(content), "path": file.path_in_repo, "encoding": "base64" },
                })
            }
        };
        lines.push(line);
    }

    let mut payload = String::new();
    for line in lines {
        payload.push_str(&serde_json::to_string(&line)?);
        payload.push('\n');
    }
    Ok(payload)
}

#[derive(Deserialize)]
struct PreuploadResponse {
    files: Vec<PreuploadFile>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreuploadFile {
    path: String,
    upload_mode: UploadMode,
}

#[derive(Serialize)]
struct LfsObject<'a> {
    oid: &'a str,
    size: u64,
}

#[derive(Deserialize)]
struct LfsBatchResponse {
    objects: Vec<LfsBatchObject>,
}

#[derive(Deserialize)]
struct LfsBatchObject {
    oid: String,
    #[serde(default)]
    actions: Option<LfsActions>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Deserialize)]
struct LfsActions {
    upload: Option<LfsAction>,
    verify: Option<LfsAction>,
}

#[derive(Deserialize)]
struct LfsAction {
    href: String,
    #[serde(default)]
    header: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    pub commit_url: String,
    #[serde(default)]
    pub commit_oid: Option<String>,
}

pub struct HubClient {
    http: Client,
    endpoint: String,
    token: String,
}

fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(PunktError::Api {
            service: "hub",
            status: status.as_u16(),
            body: response.text().unwrap_or_default(),
        })
    }
}

impl HubClient {
    pub fn new(token: String) -> Result<Self> {
        Self::with_endpoint(HUB_ENDPOINT, token)
    }

    pub fn from_env() -> Result<Self> {
        Self::new(token_from_env()?)
    }

    pub fn with_endpoint(endpoint: &str, token: String) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(None)
            .user_agent(concat!("punkt/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn repo_exists(&self, repo_id: &str) -> Result<bool> {
        validate_repo_id(repo_id)?;
        let response = self
            .http
            .get(format!("{}/api/datasets/{repo_id}", self.endpoint))
            .bearer_auth(&self.token)
            .send()?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            _ => check(response).map(|_| true),
        }
    }

    pub fn create_repo(&self, repo_id: &str, private: bool) -> Result<()> {
        validate_repo_id(repo_id)?;
        let (organization, name) = repo_id.split_once('/').unwrap_or(("", repo_id));
        let response = self
            .http
            .post(format!("{}/api/repos/create", self.endpoint))
            .bearer_auth(&self.token)
            .json(&json!({
                "type": "dataset",
                "name": name,
                "organization": organization,
                "private": private,
            }))
            .send()?;

        if response.status() == StatusCode::CONFLICT {
            debug!("Repo {repo_id} already exists");
            return Ok(());
        }
        check(response)?;
        info!("Created dataset repo {repo_id}");
        Ok(())
    }

    /// Creates the dataset repo unless it already exists.
    pub fn ensure_repo(&self, repo_id: &str, private: bool) -> Result<()> {
        if self.repo_exists(repo_id)? {
            debug!("Repo {repo_id} exists");
            Ok(())
        } else {
            self.create_repo(repo_id, private)
        }
    }

    fn preupload(&self, repo_id: &str, files: &[LocalFile]) -> Result<HashMap<String, UploadMode>> {
        let response = self
            .http
            .post(format!(
                "{}/api/datasets/{repo_id}/preupload/{REVISION}",
                self.endpoint
            ))
            .bearer_auth(&self.token)
            .json(&preupload_payload(files))
            .send()?;
        let response: PreuploadResponse = check(response)?.json()?;

        Ok(response
            .files
            .into_iter()
            .map(|f| (f.path, f.upload_mode))
            .collect())
    }

    fn upload_lfs(&self, repo_id: &str, files: &[&LocalFile], progress: &ProgressBar) -> Result<()> {
        if files.is_empty() {
            return Ok(());
        }

        let objects: Vec<LfsObject> = files
            .iter()
            .map(|f| LfsObject {
                oid: &f.sha256,
                size: f.size,
            })
            .collect();
        let response = self
            .http
            .post(format!(
                "{}/datasets/{repo_id}.git/info/lfs/objects/batch",
                self.endpoint
            ))
            .bearer_auth(&self.token)
            .header("Accept", LFS_CONTENT_TYPE)
            .header("Content-Type", LFS_CONTENT_TYPE)
            .json(&json!({
                "operation": "upload",
                "transfers": ["basic"],
                "objects": objects,
                "hash_algo": "sha256",
            }))
            .send()?;
        let batch: LfsBatchResponse = check(response)?.json()?;

        for object in batch.objects {
            if let Some(error) = object.error {
                return Err(PunktError::Api {
                    service: "lfs",
                    status: 0,
                    body: error.to_string(),
                });
            }
            let Some(file) = files.iter().find(|f| f.sha256 == object.oid) else {
                continue;
            };
            let Some(actions) = object.actions else {
                debug!("{} already stored in LFS", file.path_in_repo);
                progress.inc(file.size);
                continue;
            };

            if let Some(upload) = actions.upload {
                info!("Uploading {} to LFS ({} bytes)", file.path_in_repo, file.size);
                let reader = File::open(&file.local_path)
                    .map_err(|e| PunktError::io(e, Some(file.local_path.clone())))?;
                let mut request = self
                    .http
                    .put(&upload.href)
                    .body(Body::sized(progress.wrap_read(reader), file.size));
                for (name, value) in &upload.header {
                    request = request.header(name.as_str(), value.as_str());
                }
                check(request.send()?)?;
            }

            if let Some(verify) = actions.verify {
                let mut request = self
                    .http
                    .post(&verify.href)
                    .bearer_auth(&self.token)
                    .header("Content-Type", LFS_CONTENT_TYPE)
                    .json(&LfsObject {
                        oid: &file.sha256,
                        size: file.size,
                    });
                for (name, value) in &verify.header {
                    request = request.header(name.as_str(), value.as_str());
                }
                check(request.send()?)?;
            }
        }
        Ok(())
    }

    /// Uploads every file directly inside `folder` to `repo_id` in a single commit.
    pub fn upload_folder(
        &self,
        repo_id: &str,
        folder: &Path,
        message: &str,
        progress: &ProgressBar,
    ) -> Result<CommitInfo> {
        validate_repo_id(repo_id)?;
        let files = folder_files(folder)?;
        if files.is_empty() {
            return Err(PunktError::InvalidConfig(format!(
                "nothing to upload in {}",
                folder.display()
            )));
        }
        progress.set_length(files.iter().map(|f| f.size).sum());

        let modes = self.preupload(repo_id, &files)?;
        let lfs: Vec<&LocalFile> = files
            .iter()
            .filter(|f| modes.get(&f.path_in_repo) == Some(&UploadMode::Lfs))
            .collect();
        info!(
            "Uploading {} files to {repo_id}, {} through LFS",
            files.len(),
            lfs.len()
        );
        self.upload_lfs(repo_id, &lfs, progress)?;

        let payload = commit_payload(message, &files, &modes)?;
        let response = self
            .http
            .post(format!(
                "{}/api/datasets/{repo_id}/commit/{REVISION}",
                self.endpoint
            ))
            .bearer_auth(&self.token)
            .header("Content-Type", "application/x-ndjson")
            .body(payload)
            .send()?;
        let commit: CommitInfo = check(response)?.json()?;

        let inline_bytes: u64 = files
            .iter()
            .filter(|f| modes.get(&f.path_in_repo) != Some(&UploadMode::Lfs))
            .map(|f| f.size)
            .sum();
        progress.inc(inline_bytes);
        info!("Committed {}", commit.commit_url);
        Ok(commit)
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use base64::Engine;
    use serde_json::Value;

    use crate::hub::{
        commit_payload, folder_files, preupload_payload, validate_repo_id, UploadMode, BASE64,
    };

    #[test]
    fn repo_ids() {
        assert!(validate_repo_id("ltg/punkt-nob").is_ok());
        assert!(validate_repo_id("punkt").is_err());
        assert!(validate_repo_id("a/b/c").is_err());
        assert!(validate_repo_id("/b").is_err());
    }

    #[test]
    fn hashes_folder_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("train.jsonl"), "abc").unwrap();
        std::fs::write(dir.path().join("dataset_info.json"), "{}").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let files = folder_files(dir.path()).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.path_in_repo.as_str()).collect();
        assert_eq!(names, ["dataset_info.json", "train.jsonl"]);

        assert_eq!(files[1].size, 3);
        assert_eq!(
            files[1].sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );

        let preupload = preupload_payload(&files);
        assert_eq!(preupload["files"][1]["sample"], BASE64.encode("abc"));
        assert_eq!(preupload["files"][1]["size"], 3);
    }

    #[test]
    fn commit_lines() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.jsonl"), "{\"text\": \"stor\"}\n").unwrap();
        std::fs::write(dir.path().join("small.json"), "{}").unwrap();
        let files = folder_files(dir.path()).unwrap();

        let modes = HashMap::from([
            ("big.jsonl".to_string(), UploadMode::Lfs),
            ("small.json".to_string(), UploadMode::Regular),
        ]);
        let payload = commit_payload("Add splits", &files, &modes).unwrap();
        let lines: Vec<Value> = payload
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["key"], "header");
        assert_eq!(lines[0]["value"]["summary"], "Add splits");
        assert_eq!(lines[1]["key"], "lfsFile");
        assert_eq!(lines[1]["value"]["oid"], files[0].sha256.as_str());
        assert_eq!(lines[2]["key"], "file");
        assert_eq!(lines[2]["value"]["content"], BASE64.encode("{}"));
    }
}
