// src/constants.rs

pub const UI_WIDTH: usize = 88;
pub const NAME_TRUNCATE_LENGTH: usize = 60;
pub const MAX_FILENAME_BYTES: usize = 200;
pub const CONFIG_DIR_NAME: &str = "hackintoshify";
pub const CONFIG_DIR_ENV: &str = "HACKINTOSHIFY_CONFIG_DIR";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const TASKS_FILE_NAME: &str = "tasks.json";
pub const CATALOG_CACHE_FILE_NAME: &str = "recovery_cache.json";
pub const LOG_FILE_NAME: &str = "app.log";
pub const LOG_FALLBACK_FILE_NAME: &str = "fallback.log";
pub const DEFAULT_SAVE_DIR: &str = "downloads";
pub const PART_EXTENSION: &str = "part";

/// 目录与元数据请求使用的 UA，部分旧目录端点会据此返回不同内容
pub const CATALOG_USER_AGENT: &str = "SoftwareUpdate/6 (Macintosh; Mac OS X 15.0)";
/// 镜像文件传输使用的 UA
pub const DOWNLOAD_USER_AGENT: &str = "InternetRecovery/1.0";

pub const CHUNK_SIZE: usize = 8 * 1024;
pub const DEFAULT_RESOLVER_WORKERS: usize = 10;
pub const MIN_RESOLVER_WORKERS: usize = 5;
pub const MAX_RESOLVER_WORKERS: usize = 20;

pub mod catalog {
    pub const BASE_URL: &str = "https://swscan.apple.com/content/catalogs/others/index-";
    pub const LEGACY_SUFFIX: &str = "-10.16-10.15-10.14-10.13-10.12-10.11-10.10-10.9-mountainlion-lion-snowleopard-leopard.merged-1.sucatalog";
    pub const NEWEST_MAJOR: u32 = 26;
    pub const OLDEST_MAJOR: u32 = 11;
    pub const SEED_TYPES: [&str; 4] = ["seed", "beta", "customerseed", ""];
    pub const LEGACY_CATALOGS: [&str; 3] = [
        "10.15-10.14-10.13-10.12-10.11-10.10-10.9-mountainlion-lion-snowleopard-leopard.merged-1.sucatalog",
        "10.14-10.13-10.12-10.11-10.10-10.9-mountainlion-lion-snowleopard-leopard.merged-1.sucatalog",
        "10.13-10.12-10.11-10.10-10.9-mountainlion-lion-snowleopard-leopard.merged-1.sucatalog",
    ];

    /// 目录和 CDN 主机，默认只对这些主机放宽证书校验
    pub const LEGACY_TLS_HOSTS: [&str; 4] = [
        "swscan.apple.com",
        "swdist.apple.com",
        "swcdn.apple.com",
        "oscdn.apple.com",
    ];

    pub mod keys {
        pub const PRODUCTS: &str = "Products";
        pub const PACKAGES: &str = "Packages";
        pub const URL: &str = "URL";
        pub const POST_DATE: &str = "PostDate";
        pub const DISTRIBUTIONS: &str = "Distributions";
        pub const SERVER_METADATA_URL: &str = "ServerMetadataURL";
        pub const LOCALIZATION: &str = "localization";
        pub const TITLE: &str = "title";
    }

    /// 分发文档中尚未本地化的标题占位符
    pub const TITLE_PLACEHOLDER: &str = "SU_TITLE";
}
