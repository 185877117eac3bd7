//! Workspace Manager: one isolated directory tree per job.
//!
//! Job ids are `<unix seconds>_<8 hex chars>_<topic slug>`. The random part
//! keeps ids unique when many jobs start within the same second, and the job
//! directory itself is created non-recursively so an existing directory is
//! detected as a collision instead of being silently shared.

use crate::error::WorkspaceError;
use regex::Regex;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};
use uuid::Uuid;

pub const SCRIPT_FILE: &str = "video_script.json";
pub const SEGMENTS_DIR: &str = "segments";
pub const AUDIO_DIR: &str = "audio";
const DEFAULT_TOPIC: &str = "explainer";
const MAX_TOPIC_LEN: usize = 30;
const MAX_ATTEMPTS: usize = 8;

fn job_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+)_([0-9a-f]{8})_([a-z0-9_]+)$").unwrap())
}

/// Lowercase, `[a-z0-9_]` only, at most 30 characters.
pub fn topic_slug(topic: Option<&str>) -> String {
    let slug: String = topic
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .trim()
        .to_ascii_lowercase()
        .replace([' ', '-'], "_")
        .chars()
        .take(MAX_TOPIC_LEN)
        .collect();
    let slug = slug.trim_matches('_').to_string();
    if slug.is_empty() {
        DEFAULT_TOPIC.to_string()
    } else {
        slug
    }
}

/// Canonical artifact paths of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    pub job_id: String,
    pub root: PathBuf,
    created_ts: u64,
}

impl JobPaths {
    fn new(job_id: &str, root: PathBuf) -> Result<Self, WorkspaceError> {
        let created_ts = job_id_pattern()
            .captures(job_id)
            .and_then(|caps| caps[1].parse().ok())
            .ok_or_else(|| WorkspaceError::NotAJob(root.clone()))?;
        Ok(Self {
            job_id: job_id.to_string(),
            root,
            created_ts,
        })
    }

    pub fn created_ts(&self) -> u64 {
        self.created_ts
    }

    pub fn script(&self) -> PathBuf {
        self.root.join(SCRIPT_FILE)
    }

    pub fn segments_dir(&self) -> PathBuf {
        self.root.join(SEGMENTS_DIR)
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.segments_dir().join(AUDIO_DIR)
    }

    pub fn overlay(&self, n: u32) -> PathBuf {
        self.root.join(format!("segment_{:02}_overlay.txt", n))
    }

    pub fn narration(&self, n: u32) -> PathBuf {
        self.root.join(format!("segment_{:02}_narration.txt", n))
    }

    pub fn complete_narration(&self) -> PathBuf {
        self.root.join("complete_narration.txt")
    }

    pub fn background(&self, n: u32) -> PathBuf {
        self.segments_dir()
            .join(format!("segment_{:02}_background.png", n))
    }

    pub fn background_html(&self, n: u32) -> PathBuf {
        self.segments_dir()
            .join(format!("segment_{:02}_background.html", n))
    }

    pub fn audio(&self, n: u32) -> PathBuf {
        self.audio_dir().join(format!("segment_{:02}_audio.mp3", n))
    }

    pub fn complete_audio(&self) -> PathBuf {
        self.audio_dir().join("complete_narration_audio.mp3")
    }

    pub fn clip(&self, n: u32) -> PathBuf {
        self.segments_dir().join(format!("segment_{:02}_video.mp4", n))
    }

    pub fn concat_manifest(&self) -> PathBuf {
        self.root.join("video_list.txt")
    }

    /// Named after the job's creation time so recompiling overwrites it.
    pub fn final_video(&self) -> PathBuf {
        self.root
            .join(format!("explainer_video_{}.mp4", self.created_ts))
    }

    pub fn summary(&self) -> PathBuf {
        self.root.join("production_summary.md")
    }
}

/// A job directory found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEntry {
    pub job_id: String,
    pub root: PathBuf,
    pub created_ts: u64,
    pub topic: String,
}

#[derive(Debug)]
pub struct WorkspaceManager {
    root: PathBuf,
    jobs: Mutex<HashMap<String, PathBuf>>,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            jobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocate a fresh, empty job tree.
    pub async fn create_job(
        &self,
        topic_hint: Option<&str>,
    ) -> Result<(String, PathBuf), WorkspaceError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| WorkspaceError::io(&self.root, e))?;

        let slug = topic_slug(topic_hint);
        for _ in 0..MAX_ATTEMPTS {
            let timestamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default();
            let disambiguator = Uuid::new_v4().simple().to_string();
            let job_id = format!("{}_{}_{}", timestamp, &disambiguator[..8], slug);
            let job_root = self.root.join(&job_id);

            match tokio::fs::create_dir(&job_root).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    warn!(job_id, "job directory already exists, retrying");
                    continue;
                }
                Err(e) => return Err(WorkspaceError::io(&job_root, e)),
            }

            let paths = JobPaths::new(&job_id, job_root.clone())?;
            tokio::fs::create_dir_all(paths.audio_dir())
                .await
                .map_err(|e| WorkspaceError::io(paths.audio_dir(), e))?;

            self.register(&job_id, &job_root);
            info!(job_id, root = %job_root.display(), "created job workspace");
            return Ok((job_id, job_root));
        }

        Err(WorkspaceError::Collision(self.root.clone()))
    }

    pub fn get_paths(&self, job_id: &str) -> Result<JobPaths, WorkspaceError> {
        let root = self
            .jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(job_id)
            .cloned()
            .ok_or_else(|| WorkspaceError::UnknownJob(job_id.to_string()))?;
        JobPaths::new(job_id, root)
    }

    /// Register a job directory created by an earlier process.
    pub async fn adopt(&self, job_root: &Path) -> Result<String, WorkspaceError> {
        let metadata = tokio::fs::metadata(job_root)
            .await
            .map_err(|e| WorkspaceError::io(job_root, e))?;
        let job_id = job_root
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| metadata.is_dir() && job_id_pattern().is_match(name))
            .ok_or_else(|| WorkspaceError::NotAJob(job_root.to_path_buf()))?
            .to_string();

        let paths = JobPaths::new(&job_id, job_root.to_path_buf())?;
        tokio::fs::create_dir_all(paths.audio_dir())
            .await
            .map_err(|e| WorkspaceError::io(paths.audio_dir(), e))?;
        self.register(&job_id, job_root);
        Ok(job_id)
    }

    fn register(&self, job_id: &str, job_root: &Path) {
        self.jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(job_id.to_string(), job_root.to_path_buf());
    }

    /// Job directories under the root, newest first.
    pub async fn list_jobs(&self, limit: usize) -> Result<Vec<JobEntry>, WorkspaceError> {
        let mut jobs = self.scan().await?;
        jobs.truncate(limit);
        Ok(jobs)
    }

    /// Delete all but the `keep` newest job directories. Returns how many were removed.
    pub async fn cleanup(&self, keep: usize) -> Result<usize, WorkspaceError> {
        let jobs = self.scan().await?;
        let mut removed = 0;
        for job in jobs.into_iter().skip(keep) {
            match tokio::fs::remove_dir_all(&job.root).await {
                Ok(()) => {
                    self.jobs
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .remove(&job.job_id);
                    removed += 1;
                }
                Err(e) => warn!(job_id = job.job_id, error = %e, "could not delete job"),
            }
        }
        if removed > 0 {
            info!(removed, "cleaned up old jobs");
        }
        Ok(removed)
    }

    async fn scan(&self) -> Result<Vec<JobEntry>, WorkspaceError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(WorkspaceError::io(&self.root, e)),
        };

        let mut jobs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WorkspaceError::io(&self.root, e))?
        {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(caps) = job_id_pattern().captures(&name) else {
                continue;
            };
            if !is_dir {
                continue;
            }
            jobs.push(JobEntry {
                created_ts: caps[1].parse().unwrap_or_default(),
                topic: caps[3].to_string(),
                root: entry.path(),
                job_id: name.clone(),
            });
        }
        jobs.sort_by(|a, b| {
            b.created_ts
                .cmp(&a.created_ts)
                .then_with(|| b.job_id.cmp(&a.job_id))
        });
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn slug_is_filesystem_safe() {
        assert_eq!(topic_slug(Some("How DNS Works?!")), "how_dns_works");
        assert_eq!(topic_slug(Some("../../etc/passwd")), "etcpasswd");
        assert_eq!(topic_slug(None), "explainer");
        assert_eq!(topic_slug(Some("   ")), "explainer");
        assert!(topic_slug(Some(&"x".repeat(100))).len() <= 30);
    }

    #[tokio::test]
    async fn create_job_lays_out_fresh_tree() {
        let dir = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(dir.path());

        let (job_id, root) = manager.create_job(Some("Rust ownership")).await.unwrap();

        assert!(job_id.ends_with("_rust_ownership"));
        assert!(root.join("segments").join("audio").is_dir());
        let paths = manager.get_paths(&job_id).unwrap();
        assert_eq!(paths.root, root);
        assert_eq!(
            paths.audio(3),
            root.join("segments/audio/segment_03_audio.mp3")
        );
        assert_eq!(paths.clip(12), root.join("segments/segment_12_video.mp4"));
        assert_eq!(
            paths.final_video(),
            root.join(format!("explainer_video_{}.mp4", paths.created_ts()))
        );
    }

    #[tokio::test]
    async fn concurrent_jobs_in_same_second_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(WorkspaceManager::new(dir.path()));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.create_job(Some("same")).await.unwrap() })
            })
            .collect();
        let mut roots = Vec::new();
        for handle in handles {
            roots.push(handle.await.unwrap().1);
        }
        roots.sort();
        roots.dedup();
        assert_eq!(roots.len(), 32);

        std::fs::write(roots[0].join("video_script.json"), "a").unwrap();
        assert!(!roots[1].join("video_script.json").exists());
    }

    #[tokio::test]
    async fn unknown_job_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(dir.path());
        let err = manager.get_paths("1700000000_deadbeef_nope").unwrap_err();
        assert!(matches!(err, WorkspaceError::UnknownJob(_)));
    }

    #[tokio::test]
    async fn adopt_registers_existing_job() {
        let dir = tempfile::tempdir().unwrap();
        let first = WorkspaceManager::new(dir.path());
        let (job_id, root) = first.create_job(None).await.unwrap();

        let second = WorkspaceManager::new(dir.path());
        assert!(second.get_paths(&job_id).is_err());
        assert_eq!(second.adopt(&root).await.unwrap(), job_id);
        assert_eq!(second.get_paths(&job_id).unwrap().root, root);

        let stray = dir.path().join("not-a-job");
        std::fs::create_dir(&stray).unwrap();
        assert!(matches!(
            second.adopt(&stray).await.unwrap_err(),
            WorkspaceError::NotAJob(_)
        ));
    }

    #[tokio::test]
    async fn cleanup_keeps_newest_jobs() {
        let dir = tempfile::tempdir().unwrap();
        for (ts, rand) in [(100, "aaaaaaaa"), (300, "bbbbbbbb"), (200, "cccccccc")] {
            std::fs::create_dir(dir.path().join(format!("{}_{}_topic", ts, rand))).unwrap();
        }
        std::fs::create_dir(dir.path().join("unrelated")).unwrap();
        let manager = WorkspaceManager::new(dir.path());

        let listed: Vec<u64> = manager
            .list_jobs(10)
            .await
            .unwrap()
            .iter()
            .map(|j| j.created_ts)
            .collect();
        assert_eq!(listed, vec![300, 200, 100]);

        assert_eq!(manager.cleanup(2).await.unwrap(), 1);
        assert!(!dir.path().join("100_aaaaaaaa_topic").exists());
        assert!(dir.path().join("unrelated").exists());
        assert_eq!(manager.list_jobs(1).await.unwrap()[0].created_ts, 300);
    }
}
