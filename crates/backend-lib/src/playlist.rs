// ============================
// livecast-backend-lib/src/playlist.rs
// ============================
//! Regenerates a stream's HLS playlist from the segments on disk once a
//! publish ends.
//!
//! The ingester writes a rolling live playlist; after the stream stops we
//! replace it with one listing every segment, so the recording stays
//! playable from the start.
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use metrics::counter;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::PlaylistSettings;
use crate::error::AppError;
use crate::metrics::{REBUILD_COMPLETED, REBUILD_FAILED, REBUILD_SUPERSEDED};
use crate::storage::Storage;
use crate::streams::StreamRegistry;

/// What a scheduled rebuild ended up doing
#[derive(Debug)]
pub enum RebuildOutcome {
    /// Playlist written at this path
    Written(PathBuf),
    /// The stream was published again before the grace period ran out
    Superseded,
    /// Logged and given up; no retry
    Failed(AppError),
}

/// Leading integer of a segment file name; 0 when there is none.
///
/// Values past `u64::MAX` saturate so they still sort last.
pub fn segment_ordinal(file_name: &str) -> u64 {
    file_name
        .bytes()
        .take_while(u8::is_ascii_digit)
        .try_fold(0u64, |acc, digit| {
            acc.checked_mul(10)?.checked_add(u64::from(digit - b'0'))
        })
        .unwrap_or(u64::MAX)
}

/// Numeric order, ties broken by name so the result never depends on
/// directory iteration order.
pub fn sort_segments(segments: &mut [String]) {
    segments.sort_by(|a, b| {
        segment_ordinal(a)
            .cmp(&segment_ordinal(b))
            .then_with(|| a.cmp(b))
    });
}

#[derive(Clone)]
pub struct PlaylistRebuilder {
    storage: Arc<dyn Storage>,
    settings: PlaylistSettings,
}

impl PlaylistRebuilder {
    pub fn new(storage: Arc<dyn Storage>, settings: PlaylistSettings) -> Self {
        Self { storage, settings }
    }

    pub fn settings(&self) -> &PlaylistSettings {
        &self.settings
    }

    /// Playlist text for segments already in playback order
    pub fn render(&self, segments: &[String]) -> String {
        let duration = self.settings.target_duration_secs;
        let mut out = String::with_capacity(96 + segments.len() * 24);
        out.push_str("#EXTM3U\n");
        out.push_str("#EXT-X-VERSION:3\n");
        out.push_str("#EXT-X-MEDIA-SEQUENCE:0\n");
        let _ = writeln!(out, "#EXT-X-TARGETDURATION:{duration}");
        for segment in segments {
            let _ = writeln!(out, "#EXTINF:{duration},");
            out.push_str(segment);
            out.push('\n');
        }
        out
    }

    /// Rebuild the playlist for `name` right now.
    pub async fn rebuild(&self, name: &str) -> Result<PathBuf, AppError> {
        let mut segments = self
            .storage
            .list_segments(name, &self.settings.segment_extension)
            .await?;
        sort_segments(&mut segments);

        let contents = self.render(&segments);
        let path = self
            .storage
            .write_playlist(name, &self.settings.file_name, &contents)
            .await?;
        info!(stream = %name, segments = segments.len(), path = %path.display(), "playlist rebuilt");
        Ok(path)
    }

    /// Rebuild after the grace period unless `name` was re-published first.
    ///
    /// `epoch` is the stream's publish epoch at the time it stopped.
    pub fn schedule(
        &self,
        name: String,
        epoch: u64,
        streams: Arc<StreamRegistry>,
    ) -> JoinHandle<RebuildOutcome> {
        let rebuilder = self.clone();
        let grace = self.settings.grace_period();

        tokio::spawn(async move {
            tokio::time::sleep(grace).await;

            if streams.publish_epoch(&name) != Some(epoch) {
                info!(stream = %name, "stream re-published, skipping playlist rebuild");
                counter!(REBUILD_SUPERSEDED).increment(1);
                return RebuildOutcome::Superseded;
            }

            match rebuilder.rebuild(&name).await {
                Ok(path) => {
                    counter!(REBUILD_COMPLETED).increment(1);
                    RebuildOutcome::Written(path)
                },
                Err(e) => {
                    error!(stream = %name, error = %e, "playlist rebuild failed");
                    counter!(REBUILD_FAILED).increment(1);
                    RebuildOutcome::Failed(e)
                },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FlatFileStorage;
    use std::time::Duration;
    use tempfile::TempDir;

    fn rebuilder(temp: &TempDir, grace_period_secs: u64) -> PlaylistRebuilder {
        let storage: Arc<dyn Storage> = Arc::new(FlatFileStorage::new(temp.path()));
        PlaylistRebuilder::new(
            storage,
            PlaylistSettings {
                grace_period_secs,
                ..PlaylistSettings::default()
            },
        )
    }

    fn touch_segments(temp: &TempDir, stream: &str, names: &[&str]) -> PathBuf {
        let dir = temp.path().join(stream);
        std::fs::create_dir_all(&dir).unwrap();
        for name in names {
            std::fs::write(dir.join(name), b"seg").unwrap();
        }
        dir
    }

    #[test]
    fn test_segment_ordinal() {
        assert_eq!(segment_ordinal("10.ts"), 10);
        assert_eq!(segment_ordinal("007.ts"), 7);
        assert_eq!(segment_ordinal("12-extra.ts"), 12);
        assert_eq!(segment_ordinal("intro.ts"), 0);
        assert_eq!(segment_ordinal("99999999999999999999999.ts"), u64::MAX);
    }

    #[test]
    fn test_oversized_ordinal_sorts_last() {
        let mut segments = vec![
            "99999999999999999999999.ts".to_string(),
            "3.ts".to_string(),
            "intro.ts".to_string(),
        ];
        sort_segments(&mut segments);
        assert_eq!(segments, vec!["intro.ts", "3.ts", "99999999999999999999999.ts"]);
    }

    #[test]
    fn test_numeric_not_lexicographic() {
        let mut segments = vec!["2.ts".to_string(), "10.ts".to_string(), "1.ts".to_string()];
        sort_segments(&mut segments);
        assert_eq!(segments, vec!["1.ts", "2.ts", "10.ts"]);
    }

    #[test]
    fn test_render_format() {
        let temp = TempDir::new().unwrap();
        let text = rebuilder(&temp, 0).render(&["1.ts".to_string(), "2.ts".to_string()]);
        assert_eq!(
            text,
            "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-MEDIA-SEQUENCE:0\n#EXT-X-TARGETDURATION:10\n\
             #EXTINF:10,\n1.ts\n#EXTINF:10,\n2.ts\n"
        );
    }

    #[tokio::test]
    async fn test_rebuild_lists_only_segments_in_order() {
        let temp = TempDir::new().unwrap();
        let dir = touch_segments(&temp, "alpha", &["2.ts", "10.ts", "1.ts", "index.m3u8", "x.txt"]);

        let path = rebuilder(&temp, 0).rebuild("alpha").await.unwrap();
        assert_eq!(path, dir.join("index.m3u8"));

        let text = std::fs::read_to_string(path).unwrap();
        let listed: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(listed, vec!["1.ts", "2.ts", "10.ts"]);
    }

    #[tokio::test]
    async fn test_rebuild_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let dir = touch_segments(&temp, "alpha", &["3.ts", "1.ts", "20.ts", "2.ts"]);
        let rebuilder = rebuilder(&temp, 0);

        rebuilder.rebuild("alpha").await.unwrap();
        let first = std::fs::read(dir.join("index.m3u8")).unwrap();
        rebuilder.rebuild("alpha").await.unwrap();
        let second = std::fs::read(dir.join("index.m3u8")).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_rebuild_missing_dir_fails() {
        let temp = TempDir::new().unwrap();
        let err = rebuilder(&temp, 0).rebuild("ghost").await.unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_waits_for_grace_period() {
        let temp = TempDir::new().unwrap();
        let dir = touch_segments(&temp, "alpha", &["1.ts"]);
        let streams = Arc::new(StreamRegistry::new());
        let epoch = streams.start_publish("alpha");
        streams.stop_publish("alpha");

        let handle = rebuilder(&temp, 30).schedule("alpha".to_string(), epoch, streams);

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(!dir.join("index.m3u8").exists());

        let outcome = handle.await.unwrap();
        assert!(matches!(outcome, RebuildOutcome::Written(_)));
        assert!(dir.join("index.m3u8").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_superseded_by_republish() {
        let temp = TempDir::new().unwrap();
        let dir = touch_segments(&temp, "alpha", &["1.ts"]);
        let streams = Arc::new(StreamRegistry::new());
        let epoch = streams.start_publish("alpha");
        streams.stop_publish("alpha");

        let handle = rebuilder(&temp, 30).schedule("alpha".to_string(), epoch, Arc::clone(&streams));
        streams.start_publish("alpha");

        let outcome = handle.await.unwrap();
        assert!(matches!(outcome, RebuildOutcome::Superseded));
        assert!(!dir.join("index.m3u8").exists());
    }

    #[tokio::test]
    async fn test_schedule_failure_is_reported_not_raised() {
        let temp = TempDir::new().unwrap();
        let streams = Arc::new(StreamRegistry::new());
        let epoch = streams.start_publish("ghost");

        let outcome = rebuilder(&temp, 0)
            .schedule("ghost".to_string(), epoch, streams)
            .await
            .unwrap();
        assert!(matches!(outcome, RebuildOutcome::Failed(AppError::Storage(_))));
    }
}
