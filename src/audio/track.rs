use std::time::Duration;

/// A resolved, playable item. Immutable once built by a resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    source_query: String,
    resolved_url: String,
    title: String,
    duration_seconds: Option<u64>,
    thumbnail_url: Option<String>,
}

impl Track {
    pub fn new(
        source_query: impl Into<String>,
        resolved_url: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        let title = title.into();
        Self {
            source_query: source_query.into(),
            resolved_url: resolved_url.into(),
            title: if title.trim().is_empty() {
                "Untitled".to_string()
            } else {
                title
            },
            duration_seconds: None,
            thumbnail_url: None,
        }
    }

    pub fn with_duration_seconds(mut self, seconds: u64) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }

    pub fn with_thumbnail(mut self, thumbnail_url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(thumbnail_url.into());
        self
    }

    // Getters
    pub fn source_query(&self) -> &str {
        &self.source_query
    }
    /// Opaque to the player; only the voice transport interprets it.
    pub fn resolved_url(&self) -> &str {
        &self.resolved_url
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn duration(&self) -> Option<Duration> {
        self.duration_seconds.map(Duration::from_secs)
    }
    pub fn thumbnail_url(&self) -> Option<&str> {
        self.thumbnail_url.as_deref()
    }
}

/// `m:ss` or `h:mm:ss`.
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
