use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{error::ParseError, strategy::StrategyKind};

/// Author of a post.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorInfo {
    pub nickname: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub sec_uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Engagement counters as reported by the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordStats {
    pub digg_count: u64,
    pub comment_count: u64,
    pub collect_count: u64,
    pub share_count: u64,
}

/// Normalized output of a successful extraction, independent of which
/// strategy produced it. This is what gets cached, printed and downloaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoRecord {
    pub aweme_id: String,
    pub title: String,
    pub author: AuthorInfo,
    /// Playable video URL, watermark-free when derivable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub music_url: Option<String>,
    /// Image-post galleries; empty for regular videos.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub stats: RecordStats,
    /// Which strategy produced this record.
    pub source: StrategyKind,
    pub fetched_at: DateTime<Utc>,
}

impl VideoRecord {
    pub fn new(aweme_id: impl Into<String>, source: StrategyKind) -> Self {
        Self {
            aweme_id: aweme_id.into(),
            title: String::new(),
            author: AuthorInfo::default(),
            video_url: None,
            cover_url: None,
            music_url: None,
            images: Vec::new(),
            duration_ms: 0,
            stats: RecordStats::default(),
            source,
            fetched_at: Utc::now(),
        }
    }

    pub fn is_image_post(&self) -> bool {
        !self.images.is_empty()
    }

    /// A record is only accepted if it identifies the right post, names the
    /// content, and carries at least one fetchable media source.
    pub fn validate(&self, expected_id: &str) -> Result<(), ParseError> {
        if self.aweme_id.is_empty() {
            return Err(ParseError::InvalidRecord("empty aweme_id".into()));
        }
        if !expected_id.is_empty() && self.aweme_id != expected_id {
            return Err(ParseError::InvalidRecord(format!(
                "aweme_id mismatch: got {}, wanted {}",
                self.aweme_id, expected_id
            )));
        }
        if self.title.trim().is_empty() {
            return Err(ParseError::InvalidRecord("empty title".into()));
        }
        if self.author.nickname.trim().is_empty() {
            return Err(ParseError::InvalidRecord("empty author".into()));
        }
        let has_video = self.video_url.as_deref().is_some_and(|u| !u.is_empty());
        if !has_video && self.images.is_empty() {
            return Err(ParseError::InvalidRecord("no media source".into()));
        }
        for url in self
            .video_url
            .iter()
            .chain(self.cover_url.iter())
            .chain(self.music_url.iter())
            .chain(self.images.iter())
        {
            if !is_http_url(url) {
                return Err(ParseError::InvalidRecord(format!("non-http url: {url}")));
            }
        }
        Ok(())
    }
}

/// Rewrites watermarked play URLs (`.../playwm/...`) to the clean variant.
pub fn strip_watermark(url: &str) -> String {
    url.replace("playwm", "play")
}

pub(crate) fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_record() -> VideoRecord {
        let mut record = VideoRecord::new("7345678901234567890", StrategyKind::Api);
        record.title = "海边日落".to_string();
        record.author.nickname = "旅行者".to_string();
        record.video_url = Some("https://example.com/play/video.mp4".to_string());
        record
    }

    #[test]
    fn validate_accepts_complete_record() {
        assert!(valid_record().validate("7345678901234567890").is_ok());
    }

    #[test]
    fn validate_rejects_id_mismatch() {
        let record = valid_record();
        let err = record.validate("1111111111111111111").unwrap_err();
        assert!(matches!(err, ParseError::InvalidRecord(_)));
    }

    #[test]
    fn validate_rejects_missing_media() {
        let mut record = valid_record();
        record.video_url = None;
        assert!(record.validate("7345678901234567890").is_err());

        // an image post without a video url is fine
        record.images = vec!["https://example.com/image_01.jpg".to_string()];
        assert!(record.validate("7345678901234567890").is_ok());
    }

    #[test]
    fn validate_rejects_non_http_urls() {
        let mut record = valid_record();
        record.cover_url = Some("ftp://example.com/cover.jpg".to_string());
        assert!(record.validate("7345678901234567890").is_err());
    }

    #[test]
    fn validate_rejects_empty_title_or_author() {
        let mut record = valid_record();
        record.title = "  ".to_string();
        assert!(record.validate("7345678901234567890").is_err());

        let mut record = valid_record();
        record.author.nickname = String::new();
        assert!(record.validate("7345678901234567890").is_err());
    }

    #[test]
    fn strip_watermark_rewrites_play_path() {
        assert_eq!(
            strip_watermark("https://aweme.snssdk.com/aweme/v1/playwm/?video_id=v0d00"),
            "https://aweme.snssdk.com/aweme/v1/play/?video_id=v0d00"
        );
        // untouched when no watermark marker present
        assert_eq!(
            strip_watermark("https://example.com/play/x.mp4"),
            "https://example.com/play/x.mp4"
        );
    }

    #[test]
    fn record_serializes_roundtrip() {
        let record = valid_record();
        let json = serde_json::to_string(&record).unwrap();
        let back: VideoRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.aweme_id, record.aweme_id);
        assert_eq!(back.source, StrategyKind::Api);
    }
}
