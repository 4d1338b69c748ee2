//! # Ingestion Constants
//!
//! Shared constants for invocation status codes, payload keys, and the
//! default timing values used by the resumable jobs.

/// Invocation status codes returned to the hosting platform
pub mod status_codes {
    /// Work sequence exhausted
    pub const COMPLETED: u16 = 200;
    /// Chain handed off to a continuation invocation
    pub const CONTINUED: u16 = 202;
    /// Unrecoverable failure for this invocation
    pub const FAILED: u16 = 500;
}

/// Recognized trigger payload keys
pub mod payload_keys {
    pub const RESUME_INDEX: &str = "resumeIndex";
    pub const CURSOR: &str = "cursor";
    pub const SOURCE_KEY: &str = "sourceKey";
    pub const SOURCE_CONTAINER: &str = "sourceContainer";
}

/// Timing defaults
pub mod timing {
    /// Hard execution ceiling of the hosting platform
    pub const PLATFORM_TIMEOUT_SECONDS: u64 = 900;
    /// Elapsed time after which a job checkpoints and hands off
    pub const DEFAULT_TIME_BUDGET_SECONDS: u64 = 840;
    /// Budget used by the paginated call-log fetch, which downloads audio per item
    pub const CALL_LOG_TIME_BUDGET_SECONDS: u64 = 500;
    /// Fixed wait before each recording download to respect upstream rate limits
    pub const RECORDING_RATE_LIMIT_DELAY_MS: u64 = 6_000;
    /// Interval between warehouse statement status polls
    pub const WAREHOUSE_POLL_INTERVAL_MS: u64 = 2_000;
    /// Upper bound on status polls for one statement
    pub const WAREHOUSE_MAX_POLL_ATTEMPTS: u32 = 300;
    /// Ceiling on establishing one upstream connection
    pub const HTTP_CONNECT_TIMEOUT_SECONDS: u64 = 10;
}

/// Storage defaults
pub mod storage {
    pub const JSON_CONTENT_TYPE: &str = "application/json";
    pub const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";
    pub const CSV_CONTENT_TYPE: &str = "text/csv";
    pub const OCTET_STREAM_CONTENT_TYPE: &str = "application/octet-stream";
    /// Objects returned per list call
    pub const LIST_PAGE_SIZE: usize = 1_000;
    /// Default retention for the storage sweep
    pub const DEFAULT_RETENTION_DAYS: u32 = 30;
    /// Rows per chunk when splitting large CSV exports
    pub const DEFAULT_ROWS_PER_FILE: usize = 2_000;
}

/// Telephony API defaults
pub mod telephony {
    pub const DEFAULT_PAGE_SIZE: u32 = 100;
    pub const RINGCENTRAL_BASE_URL: &str = "https://platform.ringcentral.com";
    pub const RINGCENTRAL_TOKEN_PATH: &str = "/restapi/oauth/token";
    pub const RINGCENTRAL_CALL_LOG_PATH: &str = "/restapi/v1.0/account/~/call-log";
    pub const RINGCENTRAL_JWT_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
    pub const RINGCENTRAL_DATE_FROM: &str = "1970-01-01T00:00:00Z";
    /// Token lifetime assumed when the token response omits `expires_in`
    pub const RINGCENTRAL_TOKEN_LIFETIME_SECONDS: u64 = 3_600;
    /// Tokens this close to expiry are refreshed before use
    pub const RINGCENTRAL_TOKEN_REFRESH_MARGIN_SECONDS: u64 = 60;
    pub const CALLRAIL_BASE_URL: &str = "https://api.callrail.com";
    pub const CALLRAIL_FIELDS: &str = "agent_email,call_type,lead_status,note,source,total_calls,speaker_percent,keywords,campaign,milestones,timeline_url,person_id,transcription,keywords_spotted,call_highlights,zip_code";
}
