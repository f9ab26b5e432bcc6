//! Wire models for the detail endpoints. Only the fields the record needs
//! are declared; everything else in the payloads is ignored.

use serde::Deserialize;

use crate::{
    record::{AuthorInfo, RecordStats, VideoRecord, strip_watermark},
    strategy::StrategyKind,
};

/// `www.douyin.com/aweme/v1/web/aweme/detail/` and the snssdk variant.
#[derive(Deserialize, Debug, Default)]
pub(crate) struct DetailResponse {
    #[serde(default)]
    pub status_code: i64,
    pub aweme_detail: Option<AwemeDetail>,
}

/// `www.iesdouyin.com/web/api/v2/aweme/iteminfo/`.
#[derive(Deserialize, Debug, Default)]
pub(crate) struct ItemInfoResponse {
    #[serde(default)]
    pub status_code: i64,
    #[serde(default)]
    pub item_list: Vec<AwemeDetail>,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct AwemeDetail {
    #[serde(default)]
    pub aweme_id: String,
    #[serde(default)]
    pub desc: String,
    pub author: Option<AwemeAuthor>,
    pub video: Option<AwemeVideo>,
    pub music: Option<AwemeMusic>,
    pub images: Option<Vec<AwemeImage>>,
    pub statistics: Option<AwemeStatistics>,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct AwemeAuthor {
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub sec_uid: String,
    pub avatar_thumb: Option<UrlHolder>,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct AwemeVideo {
    pub play_addr: Option<UrlHolder>,
    pub download_addr: Option<UrlHolder>,
    pub cover: Option<UrlHolder>,
    pub origin_cover: Option<UrlHolder>,
    /// Milliseconds on the web endpoints.
    #[serde(default)]
    pub duration: u64,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct AwemeMusic {
    pub play_url: Option<UrlHolder>,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct AwemeImage {
    #[serde(default)]
    pub url_list: Vec<String>,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct AwemeStatistics {
    #[serde(default)]
    pub digg_count: u64,
    #[serde(default)]
    pub comment_count: u64,
    #[serde(default)]
    pub collect_count: u64,
    #[serde(default)]
    pub share_count: u64,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct UrlHolder {
    #[serde(default)]
    pub url_list: Vec<String>,
}

impl UrlHolder {
    fn first(&self) -> Option<String> {
        self.url_list.iter().find(|u| !u.is_empty()).cloned()
    }
}

impl AwemeDetail {
    pub(crate) fn into_record(self, source: StrategyKind) -> VideoRecord {
        let mut record = VideoRecord::new(self.aweme_id, source);
        record.title = self.desc;

        if let Some(author) = self.author {
            record.author = AuthorInfo {
                nickname: author.nickname,
                uid: author.uid,
                sec_uid: author.sec_uid,
                avatar_url: author.avatar_thumb.as_ref().and_then(UrlHolder::first),
            };
        }

        if let Some(video) = self.video {
            record.video_url = video
                .play_addr
                .as_ref()
                .and_then(UrlHolder::first)
                .or_else(|| video.download_addr.as_ref().and_then(UrlHolder::first))
                .map(|u| strip_watermark(&u));
            record.cover_url = video
                .origin_cover
                .as_ref()
                .and_then(UrlHolder::first)
                .or_else(|| video.cover.as_ref().and_then(UrlHolder::first));
            record.duration_ms = video.duration;
        }

        if let Some(music) = self.music {
            record.music_url = music.play_url.as_ref().and_then(UrlHolder::first);
        }

        if let Some(images) = self.images {
            record.images = images
                .into_iter()
                .filter_map(|image| image.url_list.into_iter().find(|u| !u.is_empty()))
                .collect();
        }

        if let Some(stats) = self.statistics {
            record.stats = RecordStats {
                digg_count: stats.digg_count,
                comment_count: stats.comment_count,
                collect_count: stats.collect_count,
                share_count: stats.share_count,
            };
        }

        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAIL_JSON: &str = r#"{
        "status_code": 0,
        "aweme_detail": {
            "aweme_id": "7345678901234567890",
            "desc": "街头随拍",
            "author": {
                "nickname": "摄影师小王",
                "uid": "100200300",
                "sec_uid": "MS4wLjABAAAAtest",
                "avatar_thumb": { "url_list": ["https://p3.douyinpic.com/avatar.jpeg"] }
            },
            "video": {
                "play_addr": { "url_list": ["https://v26.douyinvod.com/playwm/abc.mp4"], "uri": "v0d00" },
                "cover": { "url_list": ["https://p3.douyinpic.com/cover.jpeg"] },
                "duration": 15300
            },
            "music": { "play_url": { "url_list": ["https://sf3.douyinstatic.com/music.mp3"] } },
            "statistics": { "digg_count": 1200, "comment_count": 30, "collect_count": 45, "share_count": 7 }
        }
    }"#;

    #[test]
    fn detail_response_converts_to_record() {
        let response: DetailResponse = serde_json::from_str(DETAIL_JSON).unwrap();
        let detail = response.aweme_detail.unwrap();
        let record = detail.into_record(StrategyKind::Api);

        assert_eq!(record.aweme_id, "7345678901234567890");
        assert_eq!(record.title, "街头随拍");
        assert_eq!(record.author.nickname, "摄影师小王");
        // watermark rewritten on the way in
        assert_eq!(
            record.video_url.as_deref(),
            Some("https://v26.douyinvod.com/play/abc.mp4")
        );
        assert_eq!(record.duration_ms, 15300);
        assert_eq!(record.stats.digg_count, 1200);
        assert!(record.validate("7345678901234567890").is_ok());
    }

    #[test]
    fn item_info_response_parses_image_post() {
        let json = r#"{
            "status_code": 0,
            "item_list": [{
                "aweme_id": "7300000000000000001",
                "desc": "九宫格",
                "author": { "nickname": "图集作者" },
                "images": [
                    { "url_list": ["https://p3.douyinpic.com/1.jpeg"] },
                    { "url_list": ["", "https://p3.douyinpic.com/2.jpeg"] },
                    { "url_list": [] }
                ]
            }]
        }"#;
        let response: ItemInfoResponse = serde_json::from_str(json).unwrap();
        let record = response
            .item_list
            .into_iter()
            .next()
            .unwrap()
            .into_record(StrategyKind::Api);

        assert!(record.is_image_post());
        assert_eq!(record.images.len(), 2);
        assert_eq!(record.images[1], "https://p3.douyinpic.com/2.jpeg");
        assert!(record.video_url.is_none());
    }

    #[test]
    fn missing_sections_default_cleanly() {
        let response: DetailResponse =
            serde_json::from_str(r#"{"aweme_detail": {"aweme_id": "1"}}"#).unwrap();
        let record = response
            .aweme_detail
            .unwrap()
            .into_record(StrategyKind::Html);
        assert_eq!(record.aweme_id, "1");
        assert!(record.video_url.is_none());
        assert_eq!(record.stats, Default::default());
    }
}
