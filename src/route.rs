//! Route link inspection
//!
//! Links from a few well-known route planners carry the route's distance and
//! estimated duration on the page itself. The wizard uses them to skip the
//! distance and duration steps.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use thiserror::Error;

static DISTANCE_KM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*(?:km|kilometers|kilometres)\b")
        .expect("invalid distance pattern")
});

static DURATION_HM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\s*h(?:ours?|rs?)?\s*(?:(\d{1,2})\s*m(?:in)?)?\b")
        .expect("invalid duration pattern")
});

static DURATION_CLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2}):(\d{2})(?::\d{2})?\b").expect("invalid clock pattern"));

static META_DESCRIPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+(?:property|name)="(?:og:description|description|twitter:description)"[^>]+content="([^"]*)""#)
        .expect("invalid meta pattern")
});

static JSON_DISTANCE_M_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""distance"\s*:\s*(\d+(?:\.\d+)?)"#).expect("invalid json distance pattern")
});

static JSON_DURATION_S_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:duration|moving_time|estimated_time)"\s*:\s*(\d+(?:\.\d+)?)"#)
        .expect("invalid json duration pattern")
});

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("Route page request failed: {0}")]
    Request(String),
    #[error("Route page returned status {0}")]
    Status(u16),
    #[error("Route inspection timed out")]
    Timeout,
}

/// Data derived from a route page
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RouteInfo {
    pub distance_km: Option<f64>,
    pub duration_min: Option<u32>,
}

impl RouteInfo {
    pub fn is_empty(&self) -> bool {
        self.distance_km.is_none() && self.duration_min.is_none()
    }
}

/// Route planners whose pages we know how to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteProvider {
    Strava,
    RideWithGps,
    Komoot,
    Garmin,
}

impl RouteProvider {
    pub fn detect(url: &str) -> Option<Self> {
        let host = url
            .split("://")
            .nth(1)?
            .split(['/', '?', '#'])
            .next()?
            .to_lowercase();
        let matches = |domain: &str| host == domain || host.ends_with(&format!(".{domain}"));

        if matches("strava.com") {
            Some(Self::Strava)
        } else if matches("ridewithgps.com") {
            Some(Self::RideWithGps)
        } else if matches("komoot.com") || matches("komoot.de") {
            Some(Self::Komoot)
        } else if matches("connect.garmin.com") {
            Some(Self::Garmin)
        } else {
            None
        }
    }

    /// Structured page data reports meters and seconds for these providers
    fn uses_metric_json(self) -> bool {
        matches!(self, Self::Strava | Self::RideWithGps | Self::Komoot)
    }
}

pub fn is_recognized_provider(url: &str) -> bool {
    RouteProvider::detect(url).is_some()
}

/// Derives distance and duration from a route link
#[async_trait]
pub trait RouteInspector: Send + Sync {
    /// `Ok(None)` when the link is not from a recognised provider or its
    /// page carries no usable data
    async fn inspect(&self, url: &str) -> Result<Option<RouteInfo>, RouteError>;
}

#[async_trait]
impl<T: RouteInspector + ?Sized> RouteInspector for Arc<T> {
    async fn inspect(&self, url: &str) -> Result<Option<RouteInfo>, RouteError> {
        (**self).inspect(url).await
    }
}

/// Fetches the route page over HTTP and scrapes it
pub struct HttpRouteInspector {
    client: Client,
}

impl HttpRouteInspector {
    pub fn new(timeout: Duration) -> Result<Self, RouteError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ridebot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RouteError::Request(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RouteInspector for HttpRouteInspector {
    async fn inspect(&self, url: &str) -> Result<Option<RouteInfo>, RouteError> {
        let Some(provider) = RouteProvider::detect(url) else {
            return Ok(None);
        };

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                RouteError::Timeout
            } else {
                RouteError::Request(e.to_string())
            }
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(RouteError::Status(status.as_u16()));
        }
        let body = response
            .text()
            .await
            .map_err(|e| RouteError::Request(e.to_string()))?;

        let info = scrape_route_info(provider, &body);
        tracing::debug!(?provider, ?info, url, "Inspected route page");
        Ok(Some(info).filter(|i| !i.is_empty()))
    }
}

/// Pull distance and duration out of a route page.
///
/// The page description is tried first, then structured JSON embedded in
/// the page.
pub fn scrape_route_info(provider: RouteProvider, html: &str) -> RouteInfo {
    let mut info = META_DESCRIPTION_RE
        .captures(html)
        .map(|caps| scrape_text(&caps[1]))
        .unwrap_or_default();

    if provider.uses_metric_json() {
        if info.distance_km.is_none() {
            info.distance_km = JSON_DISTANCE_M_RE
                .captures(html)
                .and_then(|caps| caps[1].parse::<f64>().ok())
                .filter(|m| *m > 0.0)
                .map(|m| (m / 100.0).round() / 10.0);
        }
        if info.duration_min.is_none() {
            info.duration_min = JSON_DURATION_S_RE
                .captures(html)
                .and_then(|caps| caps[1].parse::<f64>().ok())
                .filter(|s| *s >= 60.0)
                .and_then(seconds_to_minutes);
        }
    }
    info
}

fn scrape_text(text: &str) -> RouteInfo {
    let distance_km = DISTANCE_KM_RE
        .captures(text)
        .and_then(|caps| caps[1].replace(',', ".").parse::<f64>().ok())
        .filter(|km| *km > 0.0);

    let duration_min = DURATION_HM_RE
        .captures(text)
        .and_then(|caps| {
            let hours: u32 = caps[1].parse().ok()?;
            let minutes: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
            Some(hours * 60 + minutes)
        })
        .or_else(|| {
            DURATION_CLOCK_RE.captures(text).and_then(|caps| {
                let hours: u32 = caps[1].parse().ok()?;
                let minutes: u32 = caps[2].parse().ok()?;
                Some(hours * 60 + minutes)
            })
        })
        .filter(|m| *m > 0);

    RouteInfo {
        distance_km,
        duration_min,
    }
}

fn seconds_to_minutes(seconds: f64) -> Option<u32> {
    let minutes = (seconds / 60.0).round();
    if minutes > f64::from(u32::MAX) {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let minutes = minutes as u32;
    Some(minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_providers() {
        assert_eq!(
            RouteProvider::detect("https://www.strava.com/routes/123"),
            Some(RouteProvider::Strava)
        );
        assert_eq!(
            RouteProvider::detect("https://ridewithgps.com/routes/42"),
            Some(RouteProvider::RideWithGps)
        );
        assert_eq!(
            RouteProvider::detect("https://www.komoot.com/tour/99?ref=x"),
            Some(RouteProvider::Komoot)
        );
        assert_eq!(
            RouteProvider::detect("https://connect.garmin.com/modern/course/1"),
            Some(RouteProvider::Garmin)
        );
        assert_eq!(RouteProvider::detect("https://notstrava.com/routes/1"), None);
        assert!(!is_recognized_provider("https://example.com/route.gpx"));
    }

    #[test]
    fn test_scrape_meta_description() {
        let html = r#"<html><head>
            <meta property="og:description" content="Gravel loop · 64,5 km · 3h 15m · 820 m up">
            </head></html>"#;
        let info = scrape_route_info(RouteProvider::Komoot, html);
        assert_eq!(info.distance_km, Some(64.5));
        assert_eq!(info.duration_min, Some(195));
    }

    #[test]
    fn test_scrape_falls_back_to_embedded_json() {
        let html = r#"<script>window.data = {"distance": 42195.0, "estimated_time": 5400}</script>"#;
        let info = scrape_route_info(RouteProvider::Strava, html);
        assert_eq!(info.distance_km, Some(42.2));
        assert_eq!(info.duration_min, Some(90));
    }

    #[test]
    fn test_scrape_distance_only() {
        let html = r#"<meta name="description" content="Route of 110 km by Sam">"#;
        let info = scrape_route_info(RouteProvider::Garmin, html);
        assert_eq!(info.distance_km, Some(110.0));
        assert_eq!(info.duration_min, None);
        assert!(!info.is_empty());
    }

    #[test]
    fn test_scrape_empty_page() {
        assert!(scrape_route_info(RouteProvider::Garmin, "<html></html>").is_empty());
    }

    #[tokio::test]
    async fn test_unrecognized_link_is_not_fetched() {
        let inspector = HttpRouteInspector::new(Duration::from_millis(10)).unwrap();
        let info = inspector.inspect("https://example.com/my.gpx").await.unwrap();
        assert_eq!(info, None);
    }
}
