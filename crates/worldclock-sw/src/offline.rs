//! The offline fallback document.

use crate::request::{Response, ResponseSource};

const OFFLINE_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>World Clock - Offline</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
            display: flex;
            align-items: center;
            justify-content: center;
            min-height: 100vh;
            margin: 0;
            background: linear-gradient(135deg, #1e3c72 0%, #2a5298 100%);
            color: #fff;
            text-align: center;
        }
        .offline-card {
            max-width: 420px;
            padding: 2.5rem;
            border-radius: 16px;
            background: rgba(255, 255, 255, 0.1);
        }
        h1 { margin: 0 0 1rem; font-size: 2rem; }
        p { opacity: 0.85; line-height: 1.5; }
        button {
            margin-top: 1.5rem;
            padding: 0.75rem 2rem;
            border: none;
            border-radius: 8px;
            background: #fff;
            color: #1e3c72;
            font-size: 1rem;
            cursor: pointer;
        }
    </style>
</head>
<body>
    <div class="offline-card">
        <h1>You're Offline</h1>
        <p>The World Clock can't reach the network right now. Clocks you have
        already loaded keep ticking; reconnect to refresh city data.</p>
        <button onclick="window.location.reload()">Try Again</button>
    </div>
</body>
</html>
"#;

/// Content type of the offline page.
pub const OFFLINE_CONTENT_TYPE: &str = "text/html";

/// The offline page as a fresh 200 response.
pub fn offline_response() -> Response {
    Response::ok_with(OFFLINE_CONTENT_TYPE, OFFLINE_HTML).with_source(ResponseSource::Worker)
}
