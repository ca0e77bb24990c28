use http::header::{CACHE_CONTROL, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, StatusCode};

use super::{ResourceResponse, ResponseSource};

const OFFLINE_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Offline</title>
<style>
body { font-family: system-ui, sans-serif; display: flex; align-items: center; justify-content: center; min-height: 100vh; margin: 0; color: #333; }
main { text-align: center; padding: 1rem; }
</style>
</head>
<body>
<main>
<h1>You are offline</h1>
<p>This page is not available offline. Entries you record are kept on this device and will sync when you reconnect.</p>
</main>
</body>
</html>
"#;

/// The last-resort response. It depends on nothing, so it cannot fail.
pub fn offline_page() -> ResourceResponse {
    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));

    ResourceResponse {
        status: StatusCode::SERVICE_UNAVAILABLE,
        headers,
        body: OFFLINE_PAGE.as_bytes().to_vec(),
        source: ResponseSource::Offline,
    }
}
