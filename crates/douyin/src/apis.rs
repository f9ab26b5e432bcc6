pub const BASE_URL: &str = "https://www.douyin.com";

/// Hosts that only ever serve redirect stubs for shared links.
pub const SHORT_LINK_HOSTS: &[&str] = &["v.douyin.com", "v.ies.douyin.com"];

/// Web detail API used by the desktop site itself.
pub const WEB_DETAIL_URL: &str = "https://www.douyin.com/aweme/v1/web/aweme/detail/";
/// Legacy share-page API, no signature required, sometimes rate limited.
pub const ITEM_INFO_URL: &str = "https://www.iesdouyin.com/web/api/v2/aweme/iteminfo/";
/// App-facing detail endpoint, last resort.
pub const SNSSDK_DETAIL_URL: &str = "https://aweme.snssdk.com/aweme/v1/aweme/detail/";

/// Path fragment that identifies the detail call when sniffing browser traffic.
pub const WEB_DETAIL_PATH: &str = "/aweme/v1/web/aweme/detail/";

pub(crate) const UNION_REGISTER_URL: &str = "https://ttwid.bytedance.com/ttwid/union/register/";
