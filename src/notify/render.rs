// src/notify/render.rs
//! Plain-text chat rendering of a single review.

use std::fmt::Write as _;

use crate::model::Item;

/// Render a review as one text block.
///
/// `with_timestamp` switches the header to the long form carrying build number
/// and review time; feeds without trustworthy timestamps pass `false`.
pub fn render_review(item: &Item, target_name: &str, with_timestamp: bool) -> String {
    let mut out = String::new();
    let version = item.app_version.as_deref().unwrap_or_default();

    match item.posted_at.filter(|_| with_timestamp) {
        Some(at) => {
            let _ = writeln!(
                out,
                "{} {} ({}) at {}",
                target_name,
                version,
                item.build_number.unwrap_or_default(),
                at.format("%Y-%m-%d %H:%M")
            );
        }
        None => {
            let _ = writeln!(out, "{} {}", target_name, version);
        }
    }

    if !item.author.is_empty() {
        out.push_str(&item.author);
        out.push('\n');
    }

    let device = item.device.as_deref().filter(|d| !d.is_empty());
    if let Some(d) = device {
        out.push_str("Device: ");
        out.push_str(d);
    }
    if let Some(level) = item.os_level.filter(|l| *l > 0) {
        out.push_str(" on Android ");
        out.push_str(&android_release(level));
    }
    if device.is_some() || item.os_level.is_some_and(|l| l > 0) {
        out.push('\n');
    }

    let heart = if item.rating > 3 { "❤️" } else { "💔" };
    for _ in 0..item.rating {
        out.push_str(heart);
    }

    let body = item.body.trim();
    if !body.is_empty() {
        out.push('\n');
        out.push_str(body);
    }

    out
}

/// Android release name for an API level.
pub fn android_release(level: u32) -> String {
    let name = match level {
        35 => "15",
        34 => "14",
        33 => "13",
        32 => "12L",
        31 => "12",
        30 => "11",
        29 => "10",
        28 => "9",
        27 => "8.1",
        26 => "8.0",
        25 => "7.1",
        24 => "7.0",
        23 => "6",
        22 => "5.1",
        21 => "5.0",
        20 => "4.4W",
        19 => "4.4",
        18 => "4.3",
        17 => "4.2",
        16 => "4.1",
        15 => "4.0.4",
        14 => "4.0",
        other => return format!("Unknown ({other})"),
    };
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn item() -> Item {
        Item {
            id: "r1".into(),
            author: "Jane".into(),
            body: "  Works great \n".into(),
            rating: 5,
            posted_at: Some(Utc.with_ymd_and_hms(2024, 3, 1, 9, 5, 0).unwrap()),
            app_version: Some("2.4.0".into()),
            build_number: Some(240),
            device: Some("Pixel 8".into()),
            os_level: Some(34),
        }
    }

    #[test]
    fn long_header_with_device_line() {
        let out = render_review(&item(), "Example", true);
        assert_eq!(
            out,
            "Example 2.4.0 (240) at 2024-03-01 09:05\nJane\nDevice: Pixel 8 on Android 14\n❤️❤️❤️❤️❤️\nWorks great"
        );
    }

    #[test]
    fn short_header_without_timestamp_flag() {
        let mut it = item();
        it.device = None;
        it.os_level = None;
        it.rating = 2;
        let out = render_review(&it, "Example", false);
        assert_eq!(out, "Example 2.4.0\nJane\n💔💔\nWorks great");
    }

    #[test]
    fn unknown_api_level() {
        assert_eq!(android_release(99), "Unknown (99)");
        assert_eq!(android_release(32), "12L");
    }
}
