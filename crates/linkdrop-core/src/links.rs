//! Link recognition inside free-form chat text.

use std::{collections::HashSet, sync::OnceLock};

use regex::Regex;

use crate::domain::Platform;

/// A platform link found in a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link {
    pub platform: Platform,
    pub url: String,
}

fn instagram_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"https?://(?:www\.)?instagram\.com/(?:p|reel)/[A-Za-z0-9_-]+/?")
            .expect("instagram link regex")
    })
}

fn tiktok_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"https?://(?:(?:www|vm|vt|m)\.)?tiktok\.com/(?:@[A-Za-z0-9_.-]+/video/\d+|t/[A-Za-z0-9_-]+|v/\d+|[A-Za-z0-9_-]+)/?",
        )
        .expect("tiktok link regex")
    })
}

impl Platform {
    fn link_regex(self) -> &'static Regex {
        match self {
            Platform::Instagram => instagram_re(),
            Platform::TikTok => tiktok_re(),
        }
    }

    /// Which platform a URL belongs to, judged by the same patterns as extraction.
    pub fn detect(url: &str) -> Option<Platform> {
        [Platform::Instagram, Platform::TikTok]
            .into_iter()
            .find(|p| p.link_regex().is_match(url))
    }
}

/// All supported links in `text`, in first-seen order, without duplicates.
pub fn extract_links(text: &str) -> Vec<Link> {
    let mut found: Vec<(usize, Link)> = Vec::new();
    for platform in [Platform::Instagram, Platform::TikTok] {
        for m in platform.link_regex().find_iter(text) {
            found.push((
                m.start(),
                Link {
                    platform,
                    url: m.as_str().to_string(),
                },
            ));
        }
    }
    found.sort_by_key(|(start, _)| *start);

    let mut seen = HashSet::new();
    found
        .into_iter()
        .map(|(_, link)| link)
        .filter(|link| seen.insert(link.url.clone()))
        .collect()
}

pub fn extract_instagram_links(text: &str) -> Vec<String> {
    extract_for(Platform::Instagram, text)
}

pub fn extract_tiktok_links(text: &str) -> Vec<String> {
    extract_for(Platform::TikTok, text)
}

fn extract_for(platform: Platform, text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    platform
        .link_regex()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(links: Vec<Link>) -> Vec<String> {
        links.into_iter().map(|l| l.url).collect()
    }

    #[test]
    fn duplicates_collapse_to_first_occurrence() {
        let text = "see https://instagram.com/p/ABC/ and https://instagram.com/p/ABC/";
        assert_eq!(
            urls(extract_links(text)),
            vec!["https://instagram.com/p/ABC/".to_string()]
        );
    }

    #[test]
    fn preserves_order_across_platforms() {
        let text = "first https://vm.tiktok.com/ZMabc123/ then \
                    https://www.instagram.com/reel/XYZ789/ and \
                    https://www.tiktok.com/@some.user/video/7234567890123456789?lang=en";
        let links = extract_links(text);
        assert_eq!(
            links
                .iter()
                .map(|l| (l.platform, l.url.as_str()))
                .collect::<Vec<_>>(),
            vec![
                (Platform::TikTok, "https://vm.tiktok.com/ZMabc123/"),
                (Platform::Instagram, "https://www.instagram.com/reel/XYZ789/"),
                (
                    Platform::TikTok,
                    "https://www.tiktok.com/@some.user/video/7234567890123456789"
                ),
            ]
        );
    }

    #[test]
    fn no_links_yields_empty() {
        assert!(extract_links("hello there, nothing to see").is_empty());
        assert!(extract_links("https://example.com/p/ABC/").is_empty());
        assert!(extract_instagram_links("https://instagram.com/stories/foo/").is_empty());
    }

    #[test]
    fn accepts_short_tiktok_forms() {
        let text = "https://vt.tiktok.com/ZSabc/ https://m.tiktok.com/v/123 https://www.tiktok.com/t/ZT8abc/";
        assert_eq!(
            extract_tiktok_links(text),
            vec![
                "https://vt.tiktok.com/ZSabc/".to_string(),
                "https://m.tiktok.com/v/123".to_string(),
                "https://www.tiktok.com/t/ZT8abc/".to_string(),
            ]
        );
    }

    #[test]
    fn detects_platform() {
        assert_eq!(
            Platform::detect("https://instagram.com/p/ABC/"),
            Some(Platform::Instagram)
        );
        assert_eq!(
            Platform::detect("https://vm.tiktok.com/ZMabc/"),
            Some(Platform::TikTok)
        );
        assert_eq!(Platform::detect("https://example.com/"), None);
    }
}
