//! Content client integration test — real API call.
//!
//! Skipped when `GEMINI_API_KEY` is not set.
//! Run with: `cargo test -p kasipedia-content --test integration`

use kasipedia_content::ContentClient;
use kasipedia_core::config::Config;

fn gemini_key() -> Option<String> {
    std::env::var("GEMINI_API_KEY")
        .ok()
        .filter(|k| !k.is_empty())
}

#[tokio::test]
async fn test_fetch_homepage_live() {
    if gemini_key().is_none() {
        eprintln!("Skipping: GEMINI_API_KEY not set");
        return;
    }

    let client = ContentClient::default();
    let data = client
        .fetch_homepage(&Config::default())
        .await
        .expect("homepage fetch failed");

    assert!(!data.featured_article.title.is_empty());
    assert!(!data.in_the_news.is_empty());
    assert!(!data.did_you_know.is_empty());
    assert!(!data.on_this_day.is_empty());
}
