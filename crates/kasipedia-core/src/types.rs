//! Homepage data model, mirroring the structured response schema.

use serde::{Deserialize, Serialize};

/// Everything the homepage needs, generated in one call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomepageData {
    pub featured_article: FeaturedArticle,
    pub in_the_news: Vec<NewsItem>,
    pub did_you_know: Vec<FactItem>,
    pub on_this_day: Vec<HistoryItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturedArticle {
    pub title: String,
    pub summary: String,
    /// Single keyword the UI uses to derive a placeholder illustration.
    pub image_seed: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub headline: String,
    pub context: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactItem {
    pub fact: String,
    pub topic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryItem {
    pub year: String,
    pub event: String,
}
