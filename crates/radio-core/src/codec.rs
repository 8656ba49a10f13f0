//! Line-oriented station list format.
//!
//! ```text
//! StationName,Url,Logo,Category
//! BBC Radio 1,https://stream.example/bbc1,bbc-radio1.svg,Pop
//! ```
//!
//! Fields are split on bare commas with no quoting or escaping, so a comma
//! inside a field cannot be represented.  Decoding fails open: anything it
//! cannot use is dropped and the result may simply be empty.

use crate::station::{new_station_id, StationRecord, DEFAULT_CATEGORY};

pub const HEADER: &str = "StationName,Url,Logo,Category";

/// Filename offered when the catalog is exported.
pub const EXPORT_FILENAME: &str = "stations.csv";

pub const DEFAULT_LOGO_PATH: &str = "/images/logos/default-logo.svg";
pub const LOGO_DIR: &str = "/images/logos";

pub fn decode(text: &str) -> Vec<StationRecord> {
    let mut lines = text.trim().lines();
    // Header content is not checked.
    if lines.next().is_none() {
        return Vec::new();
    }

    lines
        .filter_map(|line| {
            let mut fields = line.split(',').map(str::trim);
            let name = fields.next().filter(|s| !s.is_empty())?;
            let url = fields.next().filter(|s| !s.is_empty())?;
            let logo = fields.next().unwrap_or("");
            let category = fields
                .next()
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_CATEGORY);

            Some(StationRecord {
                id: new_station_id(),
                display_name: name.to_string(),
                stream_url: url.to_string(),
                logo_ref: logo.to_string(),
                category: category.to_string(),
            })
        })
        .collect()
}

pub fn encode(stations: &[StationRecord]) -> String {
    let mut out = String::from(HEADER);
    for s in stations {
        out.push('\n');
        out.push_str(&format!(
            "{},{},{},{}",
            s.display_name, s.stream_url, s.logo_ref, s.category
        ));
    }
    out
}

/// Resolve a logo reference to something a renderer can load.
pub fn logo_path(logo_ref: &str) -> String {
    if logo_ref.is_empty() {
        DEFAULT_LOGO_PATH.to_string()
    } else if logo_ref.starts_with("http") {
        logo_ref.to_string()
    } else {
        format!("{}/{}", LOGO_DIR, logo_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, url: &str, logo: &str, category: &str) -> StationRecord {
        StationRecord {
            id: new_station_id(),
            display_name: name.into(),
            stream_url: url.into(),
            logo_ref: logo.into(),
            category: category.into(),
        }
    }

    #[test]
    fn test_decode_skips_header_and_applies_defaults() {
        let text = "name,url\n\
                    Alpha, http://a.example/live , alpha.svg , Jazz\n\
                    Beta,http://b.example/live\n\
                    Gamma,http://c.example/live,,\r\n";
        let stations = decode(text);
        assert_eq!(stations.len(), 3);

        assert_eq!(stations[0].display_name, "Alpha");
        assert_eq!(stations[0].stream_url, "http://a.example/live");
        assert_eq!(stations[0].logo_ref, "alpha.svg");
        assert_eq!(stations[0].category, "Jazz");

        assert_eq!(stations[1].logo_ref, "");
        assert_eq!(stations[1].category, DEFAULT_CATEGORY);
        assert_eq!(stations[2].category, DEFAULT_CATEGORY);
    }

    #[test]
    fn test_decode_drops_lines_without_name_or_url() {
        let text = "h\n,http://x.example\nNoUrl\nNoUrl2,\n\nOk,http://ok.example";
        let stations = decode(text);
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].display_name, "Ok");
    }

    #[test]
    fn test_decode_fails_open() {
        assert!(decode("").is_empty());
        assert!(decode("   \n  ").is_empty());
        assert!(decode("StationName,Url,Logo,Category").is_empty());
        assert!(decode("garbage without commas\nmore garbage").is_empty());
    }

    #[test]
    fn test_decode_assigns_distinct_ids() {
        let stations = decode("h\nA,http://a\nB,http://b");
        assert_ne!(stations[0].id, stations[1].id);
    }

    #[test]
    fn test_encode_decode_preserves_fields() {
        let original = vec![
            record("One", "https://one.example/s", "one.png", "Rock"),
            record("Two", "http://two.example/s", "", "News"),
            record("Three", "http://3.example/s", "https://cdn.example/3.png", "Other"),
        ];
        let text = encode(&original);
        assert!(text.starts_with(HEADER));

        let decoded = decode(&text);
        assert_eq!(decoded.len(), original.len());
        for (a, b) in original.iter().zip(&decoded) {
            assert_eq!(a.display_name, b.display_name);
            assert_eq!(a.stream_url, b.stream_url);
            assert_eq!(a.logo_ref, b.logo_ref);
            assert_eq!(a.category, b.category);
        }
    }

    #[test]
    fn test_encode_empty_is_header_only() {
        assert_eq!(encode(&[]), HEADER);
    }

    #[test]
    fn test_comma_in_field_is_not_preserved() {
        let text = encode(&[record("Rock, Classic", "http://r.example", "", "Rock")]);
        let decoded = decode(&text);
        // "Rock" becomes the name and " Classic" the url.
        assert_eq!(decoded[0].display_name, "Rock");
        assert_eq!(decoded[0].stream_url, "Classic");
    }

    #[test]
    fn test_logo_path() {
        assert_eq!(logo_path(""), DEFAULT_LOGO_PATH);
        assert_eq!(
            logo_path("https://cdn.example/x.png"),
            "https://cdn.example/x.png"
        );
        assert_eq!(logo_path("bbc.svg"), "/images/logos/bbc.svg");
    }
}
