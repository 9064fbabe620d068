//! The backfill loop
//!
//! Drives select → skip → fetch → derive → persist sequentially: one record
//! is fully handled before the next begins. Every per-record failure is an
//! explicit [`RecordOutcome`] variant tallied and logged at the loop
//! boundary; only tunnel/store failures abort the run.

use std::time::Duration;

use coverfix_media::{probe_dimensions, DecodeError, FetchError, ImageDimensions, ResourceFetch};
use coverfix_store::{CandidateRecord, RecordGateway, StoreError};
use futures::TryStreamExt;
use mongodb::bson::Bson;
use tracing::Instrument;

use crate::error::RunError;
use crate::policy::{CoverDisposition, SkipPolicy};
use crate::report::{RunId, RunReport, RunState};

/// Explicit per-record result kind
///
/// Failure isolation is part of the type contract: no variant here can
/// abort the run.
#[derive(Debug)]
pub enum RecordOutcome {
    /// Dimensions derived and persisted
    Updated(ImageDimensions),
    /// Rule 1: no cover value, or not a URL
    SkippedMissingUrl,
    /// Rule 2: direct video reference
    SkippedVideo,
    /// HTTP or network failure while fetching the resource
    FetchFailed(FetchError),
    /// The payload was not a decodable image
    DecodeFailed(DecodeError),
    /// The record vanished between selection and update
    Vanished,
}

impl RecordOutcome {
    /// Whether a fetch was attempted for this record
    ///
    /// Pacing applies only to records that reached out to the resource
    /// host; skips move straight to the next record.
    fn attempted_fetch(&self) -> bool {
        !matches!(self, Self::SkippedMissingUrl | Self::SkippedVideo)
    }
}

/// Sequential backfill driver over an already-connected gateway
pub struct BackfillOrchestrator<G, F> {
    gateway: G,
    fetcher: F,
    policy: SkipPolicy,
    pacing: Duration,
    run_id: RunId,
    state: RunState,
}

impl<G, F> BackfillOrchestrator<G, F>
where
    G: RecordGateway,
    F: ResourceFetch,
{
    /// Create an orchestrator for one run
    #[must_use]
    pub fn new(gateway: G, fetcher: F, policy: SkipPolicy, pacing: Duration) -> Self {
        Self {
            gateway,
            fetcher,
            policy,
            pacing,
            run_id: RunId::new(),
            state: RunState::Idle,
        }
    }

    /// Current lifecycle state
    #[inline]
    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Identifier of this run
    #[inline]
    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Drive the run to a terminal state
    ///
    /// # Errors
    /// [`RunError`] on fatal store failure; per-record failures are
    /// reported through the returned [`RunReport`] instead.
    pub async fn run(&mut self) -> Result<RunReport, RunError> {
        let span = tracing::info_span!("backfill", run = %self.run_id);
        let result = async { self.drive().await }.instrument(span).await;
        match &result {
            Ok(_) => self.transition(RunState::Closed),
            Err(_) => self.transition(RunState::Aborted),
        }
        result
    }

    async fn drive(&mut self) -> Result<RunReport, RunError> {
        self.transition(RunState::Counting);
        let mut report = RunReport {
            candidates: self.gateway.count_candidates().await?,
            ..RunReport::default()
        };

        if report.candidates == 0 {
            tracing::info!("no records need repair");
            return Ok(report);
        }
        tracing::info!(candidates = report.candidates, "records need repair");

        self.transition(RunState::Iterating);
        let mut cursor = self.gateway.candidates().await?;
        while let Some(record) = cursor.try_next().await? {
            let outcome = self.process(&record).await?;
            tally(&record, &outcome, &mut report);
            if outcome.attempted_fetch() {
                tokio::time::sleep(self.pacing).await;
            }
        }

        self.transition(RunState::Draining);
        tracing::info!(
            updated = report.updated,
            skipped = report.skipped(),
            failed = report.failed(),
            "candidate cursor exhausted"
        );
        Ok(report)
    }

    async fn process(&self, record: &CandidateRecord) -> Result<RecordOutcome, RunError> {
        let Some(url) = record.cover() else {
            return Ok(RecordOutcome::SkippedMissingUrl);
        };
        match self.policy.classify(Some(url)) {
            CoverDisposition::MissingUrl => Ok(RecordOutcome::SkippedMissingUrl),
            CoverDisposition::DirectVideo => Ok(RecordOutcome::SkippedVideo),
            CoverDisposition::Fetch => self.repair(&record.id, url).await,
        }
    }

    /// Fetch, derive, persist, classifying every non-fatal failure
    async fn repair(&self, id: &Bson, url: &str) -> Result<RecordOutcome, RunError> {
        let payload = match self.fetcher.fetch(url).await {
            Ok(payload) => payload,
            Err(err) => return Ok(RecordOutcome::FetchFailed(err)),
        };

        let dimensions = match probe_dimensions(&payload) {
            Ok(dimensions) => dimensions,
            Err(err) => return Ok(RecordOutcome::DecodeFailed(err)),
        };

        match self
            .gateway
            .update_dimensions(id, dimensions.width, dimensions.height)
            .await
        {
            Ok(()) => Ok(RecordOutcome::Updated(dimensions)),
            Err(StoreError::NotFound { .. }) => Ok(RecordOutcome::Vanished),
            Err(err) => Err(err.into()),
        }
    }

    fn transition(&mut self, next: RunState) {
        tracing::debug!(run = %self.run_id, from = %self.state, to = %next, "state transition");
        self.state = next;
    }
}

/// Count the outcome and emit its per-record notice
fn tally(record: &CandidateRecord, outcome: &RecordOutcome, report: &mut RunReport) {
    match outcome {
        RecordOutcome::Updated(dimensions) => {
            report.updated += 1;
            tracing::info!(id = %record.id, %dimensions, "record updated");
        }
        RecordOutcome::SkippedMissingUrl => {
            report.skipped_no_url += 1;
            tracing::debug!(id = %record.id, "skipped: no usable cover url");
        }
        RecordOutcome::SkippedVideo => {
            report.skipped_video += 1;
            tracing::info!(id = %record.id, "skipped: video");
        }
        RecordOutcome::FetchFailed(err) => {
            report.fetch_failures += 1;
            tracing::warn!(id = %record.id, %err, "fetch failed");
        }
        RecordOutcome::DecodeFailed(err) => {
            report.decode_failures += 1;
            tracing::warn!(id = %record.id, %err, "decode failed");
        }
        RecordOutcome::Vanished => {
            report.vanished += 1;
            tracing::warn!(id = %record.id, "record vanished before update");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use coverfix_store::StoreError;
    use futures::stream::{self, BoxStream, StreamExt};
    use image::{DynamicImage, ImageFormat, RgbImage};
    use mockall::mock;
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    mock! {
        Gateway {}

        #[async_trait::async_trait]
        impl RecordGateway for Gateway {
            async fn count_candidates(&self) -> Result<u64, StoreError>;
            async fn candidates(
                &self,
            ) -> Result<BoxStream<'static, Result<CandidateRecord, StoreError>>, StoreError>;
            async fn update_dimensions(
                &self,
                id: &Bson,
                width: u32,
                height: u32,
            ) -> Result<(), StoreError>;
        }
    }

    mock! {
        Fetcher {}

        #[async_trait::async_trait]
        impl ResourceFetch for Fetcher {
            async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
        }
    }

    fn record(id: i32, cover: Option<&str>) -> CandidateRecord {
        CandidateRecord {
            id: Bson::Int32(id),
            cover: cover.map(str::to_string),
        }
    }

    fn candidate_stream(
        records: Vec<Result<CandidateRecord, StoreError>>,
    ) -> BoxStream<'static, Result<CandidateRecord, StoreError>> {
        stream::iter(records).boxed()
    }

    fn jpeg_bytes(width: u32, height: u32) -> Bytes {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut out, ImageFormat::Jpeg)
            .unwrap();
        Bytes::from(out.into_inner())
    }

    fn query_error() -> StoreError {
        StoreError::Query(std::io::Error::other("connection reset").into())
    }

    fn orchestrator(
        gateway: MockGateway,
        fetcher: MockFetcher,
    ) -> BackfillOrchestrator<MockGateway, MockFetcher> {
        BackfillOrchestrator::new(gateway, fetcher, SkipPolicy::default(), Duration::ZERO)
    }

    #[tokio::test]
    async fn zero_candidates_terminates_without_iterating() {
        let mut gateway = MockGateway::new();
        gateway.expect_count_candidates().returning(|| Ok(0));
        gateway.expect_candidates().times(0);

        let mut orchestrator = orchestrator(gateway, MockFetcher::new());
        let report = orchestrator.run().await.unwrap();

        assert_eq!(report.candidates, 0);
        assert_eq!(report.to_string(), "no records needed repair");
        assert_eq!(orchestrator.state(), RunState::Closed);
    }

    #[tokio::test]
    async fn mixed_candidates_resolve_skip_and_update() {
        // One decodable image, one plain video, one empty cover.
        let mut gateway = MockGateway::new();
        gateway.expect_count_candidates().returning(|| Ok(3));
        gateway.expect_candidates().returning(|| {
            Ok(candidate_stream(vec![
                Ok(record(1, Some("https://img.example.com/a.jpg"))),
                Ok(record(2, Some("https://cdn.example.com/clip.mp4"))),
                Ok(record(3, Some(""))),
            ]))
        });
        gateway
            .expect_update_dimensions()
            .with(eq(Bson::Int32(1)), eq(32), eq(20))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch()
            .with(eq("https://img.example.com/a.jpg"))
            .times(1)
            .returning(|_| Ok(jpeg_bytes(32, 20)));

        let mut orchestrator = orchestrator(gateway, fetcher);
        let report = orchestrator.run().await.unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(report.skipped_video, 1);
        assert_eq!(report.skipped_no_url, 1);
        assert_eq!(report.failed(), 0);
        assert_eq!(orchestrator.state(), RunState::Closed);
    }

    #[tokio::test]
    async fn http_failure_leaves_record_untouched_and_continues() {
        let mut gateway = MockGateway::new();
        gateway.expect_count_candidates().returning(|| Ok(2));
        gateway.expect_candidates().returning(|| {
            Ok(candidate_stream(vec![
                Ok(record(1, Some("https://img.example.com/missing.jpg"))),
                Ok(record(2, Some("https://img.example.com/present.jpg"))),
            ]))
        });
        // Only the second record may be written.
        gateway
            .expect_update_dimensions()
            .with(eq(Bson::Int32(2)), eq(8), eq(8))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch()
            .with(eq("https://img.example.com/missing.jpg"))
            .returning(|_| {
                Err(FetchError::Download {
                    status: reqwest::StatusCode::NOT_FOUND,
                })
            });
        fetcher
            .expect_fetch()
            .with(eq("https://img.example.com/present.jpg"))
            .returning(|_| Ok(jpeg_bytes(8, 8)));

        let mut orchestrator = orchestrator(gateway, fetcher);
        let report = orchestrator.run().await.unwrap();

        assert_eq!(report.fetch_failures, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(orchestrator.state(), RunState::Closed);
    }

    #[tokio::test]
    async fn undecodable_payload_is_isolated() {
        let mut gateway = MockGateway::new();
        gateway.expect_count_candidates().returning(|| Ok(1));
        gateway.expect_candidates().returning(|| {
            Ok(candidate_stream(vec![Ok(record(
                1,
                Some("https://img.example.com/broken.jpg"),
            ))]))
        });
        gateway.expect_update_dimensions().times(0);

        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|_| Ok(Bytes::from_static(b"<html>not an image</html>")));

        let mut orchestrator = orchestrator(gateway, fetcher);
        let report = orchestrator.run().await.unwrap();

        assert_eq!(report.decode_failures, 1);
        assert_eq!(report.updated, 0);
        assert_eq!(orchestrator.state(), RunState::Closed);
    }

    #[tokio::test]
    async fn vanished_record_is_logged_and_skipped() {
        let mut gateway = MockGateway::new();
        gateway.expect_count_candidates().returning(|| Ok(1));
        gateway.expect_candidates().returning(|| {
            Ok(candidate_stream(vec![Ok(record(
                1,
                Some("https://img.example.com/a.jpg"),
            ))]))
        });
        gateway.expect_update_dimensions().returning(|id, _, _| {
            Err(StoreError::NotFound { id: id.clone() })
        });

        let mut fetcher = MockFetcher::new();
        fetcher.expect_fetch().returning(|_| Ok(jpeg_bytes(4, 4)));

        let mut orchestrator = orchestrator(gateway, fetcher);
        let report = orchestrator.run().await.unwrap();

        assert_eq!(report.vanished, 1);
        assert_eq!(report.updated, 0);
        assert_eq!(orchestrator.state(), RunState::Closed);
    }

    #[tokio::test]
    async fn video_with_processing_marker_is_repaired() {
        let url = "https://cdn.example.com/clip.mp4?x-oss-process=image/resize";
        let mut gateway = MockGateway::new();
        gateway.expect_count_candidates().returning(|| Ok(1));
        gateway.expect_candidates().returning(move || {
            Ok(candidate_stream(vec![Ok(record(1, Some(url)))]))
        });
        gateway
            .expect_update_dimensions()
            .with(eq(Bson::Int32(1)), eq(16), eq(9))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch()
            .with(eq(url))
            .returning(|_| Ok(jpeg_bytes(16, 9)));

        let mut orchestrator = orchestrator(gateway, fetcher);
        let report = orchestrator.run().await.unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(report.skipped_video, 0);
    }

    #[tokio::test]
    async fn count_failure_aborts_before_iteration() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_count_candidates()
            .returning(|| Err(query_error()));
        gateway.expect_candidates().times(0);
        gateway.expect_update_dimensions().times(0);

        let mut orchestrator = orchestrator(gateway, MockFetcher::new());
        let err = orchestrator.run().await.unwrap_err();

        assert!(matches!(err, RunError::Store(_)));
        assert_eq!(orchestrator.state(), RunState::Aborted);
    }

    #[tokio::test]
    async fn cursor_failure_mid_run_aborts() {
        let mut gateway = MockGateway::new();
        gateway.expect_count_candidates().returning(|| Ok(2));
        gateway.expect_candidates().returning(|| {
            Ok(candidate_stream(vec![
                Ok(record(1, Some("https://cdn.example.com/clip.mp4"))),
                Err(query_error()),
            ]))
        });
        gateway.expect_update_dimensions().times(0);

        let mut orchestrator = orchestrator(gateway, MockFetcher::new());
        let err = orchestrator.run().await.unwrap_err();

        assert!(matches!(err, RunError::Store(_)));
        assert_eq!(orchestrator.state(), RunState::Aborted);
    }
}
