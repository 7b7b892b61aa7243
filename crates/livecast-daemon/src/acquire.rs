//! Remote asset acquirer.
//!
//! Turns what the user typed into the asset field into a path on the encoder
//! host.  Plain names are joined with the storage root; share links are
//! handed to the download service under the next free `<n>.<ext>` name.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;

use livecast_proto::config::AcquisitionConfig;
use livecast_proto::model::Identity;
use livecast_proto::{Error, Result, Validation};
use reqwest::Url;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::inflight::InFlight;
use crate::services::AcquisitionService;

/// Finished jobs kept for `/api/acquisitions`.
const FINISHED_JOBS_KEPT: usize = 20;

/// What kind of asset reference the user gave us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetInput<'a> {
    Literal(&'a str),
    ShareLink(&'a str),
}

/// Share links are recognised by host, with or without a scheme.
pub fn classify<'a>(input: &'a str, share_hosts: &[String]) -> AssetInput<'a> {
    let trimmed = input.trim();
    let parsed = Url::parse(trimmed)
        .ok()
        .filter(|u| u.has_host())
        .or_else(|| Url::parse(&format!("https://{}", trimmed)).ok());

    let host = parsed
        .as_ref()
        .and_then(|u| u.host_str())
        .map(|h| h.trim_start_matches("www.").to_ascii_lowercase());

    match host {
        Some(host) if is_share_host(&host, share_hosts) => AssetInput::ShareLink(trimmed),
        _ => AssetInput::Literal(trimmed),
    }
}

fn is_share_host(host: &str, share_hosts: &[String]) -> bool {
    share_hosts.iter().any(|h| {
        let h = h.trim().to_ascii_lowercase();
        host == h || host.ends_with(&format!(".{}", h))
    })
}

/// Storage path for a literal name.  Already-resolved paths come back
/// unchanged, so resolving twice is harmless.
pub fn resolve_literal(input: &str, storage_root: &str, extension: &str) -> String {
    let input = input.trim();
    let root = storage_root.trim_end_matches('/');
    if input.starts_with(&format!("{}/", root)) {
        return input.to_string();
    }
    let name = with_extension(input.trim_start_matches('/'), extension);
    Path::new(root).join(name).to_string_lossy().into_owned()
}

fn with_extension(name: &str, extension: &str) -> String {
    let suffix = format!(".{}", extension.to_ascii_lowercase());
    if name.to_ascii_lowercase().ends_with(&suffix) {
        name.to_string()
    } else {
        format!("{}.{}", name, extension)
    }
}

/// Smallest positive `n` whose `<n>.<ext>` is not in `existing`.  Names
/// outside the numbering convention do not count.
pub fn next_sequential_name(existing: &[String], extension: &str) -> String {
    let suffix = format!(".{}", extension.to_ascii_lowercase());
    let taken: HashSet<u64> = existing
        .iter()
        .filter_map(|name| {
            let lower = name.to_ascii_lowercase();
            let stem = lower.strip_suffix(&suffix)?;
            if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            stem.parse::<u64>().ok()
        })
        .collect();

    let mut n = 1u64;
    while taken.contains(&n) {
        n += 1;
    }
    format!("{}.{}", n, extension)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "phase", content = "detail", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AcquisitionPhase {
    ResolvingName,
    Downloading,
    Done,
    Failed(String),
}

impl AcquisitionPhase {
    fn is_finished(&self) -> bool {
        matches!(self, AcquisitionPhase::Done | AcquisitionPhase::Failed(_))
    }
}

/// Last known state of the download for one share link.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcquisitionJob {
    pub link: String,
    pub phase: AcquisitionPhase,
    pub file_name: Option<String>,
}

pub struct Acquirer {
    service: Arc<dyn AcquisitionService>,
    config: AcquisitionConfig,
    inflight: InFlight<String>,
    jobs: RwLock<JobTable>,
}

/// Running jobs by link, plus a short tail of finished ones.
#[derive(Default)]
struct JobTable {
    running: HashMap<String, AcquisitionJob>,
    finished: VecDeque<AcquisitionJob>,
}

impl JobTable {
    fn record(&mut self, job: AcquisitionJob) {
        if !job.phase.is_finished() {
            self.running.insert(job.link.clone(), job);
            return;
        }
        self.running.remove(&job.link);
        if self.finished.len() == FINISHED_JOBS_KEPT {
            self.finished.pop_front();
        }
        self.finished.push_back(job);
    }
}

impl Acquirer {
    pub fn new(service: Arc<dyn AcquisitionService>, config: AcquisitionConfig) -> Self {
        Self {
            service,
            config,
            inflight: InFlight::new(),
            jobs: RwLock::new(JobTable::default()),
        }
    }

    /// Resolve `input` to a path on the encoder host, downloading it first
    /// when it is a share link.
    pub async fn acquire(&self, who: &Identity, input: &str) -> Result<String> {
        match classify(input, &self.config.share_hosts) {
            AssetInput::Literal(name) => Ok(resolve_literal(
                name,
                &self.config.storage_root,
                &self.config.media_extension,
            )),
            AssetInput::ShareLink(link) => self.download(who, link).await,
        }
    }

    /// Running jobs by link, then finished ones newest first.
    pub async fn jobs(&self) -> Vec<AcquisitionJob> {
        let table = self.jobs.read().await;
        let mut jobs: Vec<AcquisitionJob> = table.running.values().cloned().collect();
        jobs.sort_by(|a, b| a.link.cmp(&b.link));
        jobs.extend(table.finished.iter().rev().cloned());
        jobs
    }

    async fn download(&self, who: &Identity, link: &str) -> Result<String> {
        let Some(_guard) = self.inflight.try_claim(link.to_string()) else {
            return Err(Error::validation(Validation::AlreadyInFlight(
                "a download of this link".to_string(),
            )));
        };

        self.set_phase(link, AcquisitionPhase::ResolvingName, None).await;
        let ext = &self.config.media_extension;

        let existing = match self.service.list_files(who).await {
            Ok(files) => files,
            Err(e) => {
                return Err(self
                    .fail(link, None, format!("could not list existing files: {}", e))
                    .await)
            }
        };
        let candidate = next_sequential_name(&existing, ext);

        // Someone else may have taken the name since the first listing.
        match self.service.list_files(who).await {
            Ok(files) if files.iter().any(|f| f == &candidate) => {
                return Err(self
                    .fail(
                        link,
                        Some(&candidate),
                        format!("file {} already exists on the server", candidate),
                    )
                    .await)
            }
            Ok(_) => {}
            Err(e) => {
                return Err(self
                    .fail(link, Some(&candidate), format!("could not list existing files: {}", e))
                    .await)
            }
        }

        self.set_phase(link, AcquisitionPhase::Downloading, Some(&candidate))
            .await;
        info!("Submitting download of {} as {}", link, candidate);

        match self.service.submit(who, link, &candidate).await {
            Ok(ack) if ack.accepted => {
                info!("Download of {} accepted: {}", candidate, ack.message);
                self.set_phase(link, AcquisitionPhase::Done, Some(&candidate))
                    .await;
                Ok(resolve_literal(&candidate, &self.config.storage_root, ext))
            }
            Ok(ack) => Err(self.fail(link, Some(&candidate), ack.message).await),
            Err(e) => Err(self.fail(link, Some(&candidate), e.to_string()).await),
        }
    }

    async fn set_phase(&self, link: &str, phase: AcquisitionPhase, file_name: Option<&str>) {
        self.jobs.write().await.record(AcquisitionJob {
            link: link.to_string(),
            phase,
            file_name: file_name.map(str::to_string),
        });
    }

    async fn fail(&self, link: &str, file_name: Option<&str>, message: String) -> Error {
        warn!("Download of {} failed: {}", link, message);
        self.set_phase(link, AcquisitionPhase::Failed(message.clone()), file_name)
            .await;
        Error::acquisition(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeAcquisition;

    fn hosts() -> Vec<String> {
        AcquisitionConfig::default().share_hosts
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn classifies_share_links_with_and_without_scheme() {
        let link = "https://drive.google.com/file/d/abc/view";
        assert_eq!(classify(link, &hosts()), AssetInput::ShareLink(link));
        assert_eq!(
            classify("  drive.google.com/file/d/abc ", &hosts()),
            AssetInput::ShareLink("drive.google.com/file/d/abc")
        );
        assert_eq!(
            classify("https://docs.google.com/uc?id=1", &hosts()),
            AssetInput::ShareLink("https://docs.google.com/uc?id=1")
        );
        assert_eq!(classify("intro.mp4", &hosts()), AssetInput::Literal("intro.mp4"));
        assert_eq!(
            classify("https://example.com/drive.google.com", &hosts()),
            AssetInput::Literal("https://example.com/drive.google.com")
        );
    }

    #[test]
    fn literal_resolution_is_idempotent() {
        let root = "/srv/livecast/videos";
        let once = resolve_literal("intro", root, "mp4");
        assert_eq!(once, "/srv/livecast/videos/intro.mp4");
        assert_eq!(resolve_literal(&once, root, "mp4"), once);
        assert_eq!(
            resolve_literal("Clip.MP4", "/srv/livecast/videos/", "mp4"),
            "/srv/livecast/videos/Clip.MP4"
        );
    }

    #[test]
    fn picks_smallest_free_number() {
        assert_eq!(
            next_sequential_name(&names(&["1.mp4", "2.mp4", "4.mp4"]), "mp4"),
            "3.mp4"
        );
        assert_eq!(next_sequential_name(&[], "mp4"), "1.mp4");
        assert_eq!(
            next_sequential_name(&names(&["intro.mp4", "1.MP4", "2.mkv", "-2.mp4"]), "mp4"),
            "2.mp4"
        );
    }

    fn acquirer(service: Arc<FakeAcquisition>) -> Acquirer {
        Acquirer::new(service, AcquisitionConfig::default())
    }

    #[tokio::test]
    async fn share_link_downloads_under_next_name() {
        let service = Arc::new(FakeAcquisition::with_files(&["1.mp4", "2.mp4", "4.mp4"]));
        let acq = acquirer(service.clone());
        let path = acq
            .acquire(&Identity::default(), "https://drive.google.com/file/d/x/view")
            .await
            .unwrap();
        assert_eq!(path, "/srv/livecast/videos/3.mp4");
        assert_eq!(service.submitted(), vec!["3.mp4".to_string()]);

        let jobs = acq.jobs().await;
        assert_eq!(jobs[0].phase, AcquisitionPhase::Done);
        assert_eq!(jobs[0].file_name.as_deref(), Some("3.mp4"));
    }

    #[tokio::test]
    async fn rejection_fails_the_job() {
        let service = Arc::new(FakeAcquisition::rejecting("quota exceeded"));
        let acq = acquirer(service);
        let err = acq
            .acquire(&Identity::default(), "drive.google.com/file/d/x")
            .await
            .unwrap_err();
        assert_eq!(err, Error::acquisition("quota exceeded"));
        assert!(matches!(
            acq.jobs().await[0].phase,
            AcquisitionPhase::Failed(_)
        ));
    }

    #[tokio::test]
    async fn listing_failure_refuses_to_guess() {
        let service = Arc::new(FakeAcquisition::unreachable());
        let acq = acquirer(service.clone());
        let err = acq
            .acquire(&Identity::default(), "https://drive.google.com/x")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RemoteAcquisitionFailed(_)));
        assert!(service.submitted().is_empty());
    }

    #[tokio::test]
    async fn name_taken_between_listings_is_not_overwritten() {
        let service = Arc::new(FakeAcquisition::with_files(&["1.mp4"]));
        service.add_file_after_first_list("2.mp4");
        let acq = acquirer(service.clone());
        let err = acq
            .acquire(&Identity::default(), "https://drive.google.com/x")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("2.mp4"));
        assert!(service.submitted().is_empty());
    }

    #[tokio::test]
    async fn finished_jobs_are_kept_as_a_bounded_tail() {
        let service = Arc::new(FakeAcquisition::with_files(&[]));
        let acq = acquirer(service);
        for n in 0..FINISHED_JOBS_KEPT + 5 {
            acq.acquire(
                &Identity::default(),
                &format!("https://drive.google.com/file/d/{}/view", n),
            )
            .await
            .unwrap();
        }

        let jobs = acq.jobs().await;
        assert_eq!(jobs.len(), FINISHED_JOBS_KEPT);
        assert!(jobs.iter().all(|j| j.phase == AcquisitionPhase::Done));
        assert_eq!(
            jobs[0].link,
            format!("https://drive.google.com/file/d/{}/view", FINISHED_JOBS_KEPT + 4)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_acquisition_of_same_link_is_refused() {
        let service = Arc::new(FakeAcquisition::with_files(&[]));
        service.set_submit_delay(std::time::Duration::from_secs(5));
        let acq = Arc::new(acquirer(service.clone()));
        let link = "https://drive.google.com/file/d/x/view";

        let first = {
            let acq = Arc::clone(&acq);
            tokio::spawn(async move { acq.acquire(&Identity::default(), link).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let second = acq.acquire(&Identity::default(), link).await.unwrap_err();
        assert!(matches!(
            second,
            Error::ValidationFailed(Validation::AlreadyInFlight(_))
        ));
        assert_eq!(acq.jobs().await[0].phase, AcquisitionPhase::Downloading);

        assert!(first.await.unwrap().is_ok());
        assert_eq!(service.submitted().len(), 1);
    }
}
